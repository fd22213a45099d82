//! Organization model
//!
//! Organizations are top-level resources: the mnemonic is unique across all
//! organizations. They group member users and own sources and collections.

use serde::{Deserialize, Serialize};

use super::base::{BaseFields, Record};
use super::resource::{ResourceRef, ResourceType};
use super::API_BASE;

/// An organization record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier (UUID string)
    pub id: String,
    /// Short identifier used in URLs
    pub mnemonic: String,
    pub name: String,
    pub company: Option<String>,
    pub website: Option<String>,
    #[serde(flatten)]
    pub base: BaseFields,
}

impl Organization {
    /// Build a new, unsaved organization
    pub fn new(mnemonic: String, name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mnemonic,
            name,
            company: None,
            website: None,
            base: BaseFields::new(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::Organization
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::organization(self.id.clone())
    }

    /// Path of the organization's detail endpoint
    pub fn url(&self) -> String {
        format!("{}/orgs/{}", API_BASE, self.mnemonic)
    }
}

impl Record for Organization {
    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

/// Aggregates shown on the organization detail view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCounts {
    pub members: i64,
    pub public_collections: i64,
    pub public_sources: i64,
}
