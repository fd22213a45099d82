//! Sources and collections
//!
//! Both live inside a parent (an organization or a user) and their mnemonic
//! is only unique within that parent. The shared identity fields sit in
//! [`SubResourceFields`]; the descriptive fields they also share sit in
//! [`ContainerDetails`].

use serde::{Deserialize, Serialize};

use super::base::{BaseFields, Record};
use super::resource::{PublicAccess, ResourceRef, ResourceType};

/// Identity of a sub-resource: mnemonic, owning user and polymorphic parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResourceFields {
    pub mnemonic: String,
    /// Id of the user who created it
    pub owner_id: String,
    pub parent: ResourceRef,
}

/// Descriptive fields common to sources and collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub name: String,
    pub full_name: Option<String>,
    pub public_access: PublicAccess,
    pub default_locale: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

/// Read access shared by sources and collections.
pub trait SubResource: Record {
    fn id(&self) -> &str;

    fn sub(&self) -> &SubResourceFields;

    fn details(&self) -> &ContainerDetails;

    fn resource_type(&self) -> ResourceType;

    fn mnemonic(&self) -> &str {
        &self.sub().mnemonic
    }

    fn parent(&self) -> &ResourceRef {
        &self.sub().parent
    }

    fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.resource_type(), self.id().to_string())
    }

    /// URL segment naming this kind below its parent
    fn path_segment(&self) -> &'static str {
        match self.resource_type() {
            ResourceType::Collection => "collections",
            _ => "sources",
        }
    }

    /// Path below the parent's URL
    fn url_under(&self, parent_url: &str) -> String {
        format!("{}/{}/{}", parent_url, self.path_segment(), self.mnemonic())
    }
}

/// A terminology source (a dictionary of concepts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(flatten)]
    pub sub: SubResourceFields,
    #[serde(flatten)]
    pub details: ContainerDetails,
    pub source_type: Option<String>,
    #[serde(flatten)]
    pub base: BaseFields,
}

impl Source {
    pub fn new(mnemonic: String, name: String, owner_id: String, parent: ResourceRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sub: SubResourceFields {
                mnemonic,
                owner_id,
                parent,
            },
            details: ContainerDetails {
                name,
                ..ContainerDetails::default()
            },
            source_type: None,
            base: BaseFields::new(),
        }
    }
}

impl Record for Source {
    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl SubResource for Source {
    fn id(&self) -> &str {
        &self.id
    }

    fn sub(&self) -> &SubResourceFields {
        &self.sub
    }

    fn details(&self) -> &ContainerDetails {
        &self.details
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Source
    }
}

/// A curated collection of references into sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    #[serde(flatten)]
    pub sub: SubResourceFields,
    #[serde(flatten)]
    pub details: ContainerDetails,
    pub collection_type: Option<String>,
    #[serde(flatten)]
    pub base: BaseFields,
}

impl Collection {
    pub fn new(mnemonic: String, name: String, owner_id: String, parent: ResourceRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sub: SubResourceFields {
                mnemonic,
                owner_id,
                parent,
            },
            details: ContainerDetails {
                name,
                ..ContainerDetails::default()
            },
            collection_type: None,
            base: BaseFields::new(),
        }
    }
}

impl Record for Collection {
    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

impl SubResource for Collection {
    fn id(&self) -> &str {
        &self.id
    }

    fn sub(&self) -> &SubResourceFields {
        &self.sub
    }

    fn details(&self) -> &ContainerDetails {
        &self.details
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Collection
    }
}
