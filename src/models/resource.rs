//! Resource kinds and typed polymorphic references
//!
//! Sub-resources point at their parent, and versions at the object they
//! version, through a [`ResourceRef`]: a tagged `(type, id)` pair stored as
//! two columns. Resolving a reference into a concrete entity is the job of
//! `services::resolver`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of resource the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Organization,
    User,
    Source,
    Collection,
    Version,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Organization => "Organization",
            ResourceType::User => "User",
            ResourceType::Source => "Source",
            ResourceType::Collection => "Collection",
            ResourceType::Version => "Version",
        }
    }

    /// Whether resources of this kind can be versioned
    pub fn is_versioned(&self) -> bool {
        matches!(self, ResourceType::Source | ResourceType::Collection)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Organization" => Ok(ResourceType::Organization),
            "User" => Ok(ResourceType::User),
            "Source" => Ok(ResourceType::Source),
            "Collection" => Ok(ResourceType::Collection),
            "Version" => Ok(ResourceType::Version),
            _ => Err(anyhow::anyhow!("Unknown resource type: {}", s)),
        }
    }
}

/// Typed pointer at another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Organization, id)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ResourceType::User, id)
    }

    pub fn source(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Source, id)
    }

    pub fn collection(id: impl Into<String>) -> Self {
        Self::new(ResourceType::Collection, id)
    }

    /// Rebuild a reference from its two stored columns
    pub fn from_columns(resource_type: &str, id: String) -> anyhow::Result<Self> {
        Ok(Self::new(resource_type.parse()?, id))
    }
}

/// Who may see or edit a source or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublicAccess {
    #[default]
    View,
    Edit,
    None,
}

impl PublicAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccess::View => "View",
            PublicAccess::Edit => "Edit",
            PublicAccess::None => "None",
        }
    }
}

impl fmt::Display for PublicAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicAccess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "View" => Ok(PublicAccess::View),
            "Edit" => Ok(PublicAccess::Edit),
            "None" => Ok(PublicAccess::None),
            _ => Err(anyhow::anyhow!("Invalid public access value: {}", s)),
        }
    }
}
