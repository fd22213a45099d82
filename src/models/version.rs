//! Resource version model
//!
//! A version is a named snapshot of a source or collection. Versions of the
//! same object form a history through two self-references: the version
//! that came before (`previous_version_id`) and the version this one was
//! derived from (`parent_version_id`).

use serde::{Deserialize, Serialize};

use super::base::{BaseFields, Record};
use super::resource::{ResourceRef, ResourceType};
use super::validation::{validate_mnemonic, FieldErrors};

/// Field that carries lineage errors
pub const PARENT_VERSION_FIELD: &str = "parent_version";

/// Path segments next to a version's own URL; a version cannot take them
pub const RESERVED_VERSION_MNEMONICS: [&str; 2] = ["versions", "latest"];

/// A version of a versioned object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub id: String,
    /// Unique among versions of the same object
    pub mnemonic: String,
    pub versioned_object: ResourceRef,
    pub released: bool,
    pub description: Option<String>,
    pub previous_version_id: Option<String>,
    pub parent_version_id: Option<String>,
    #[serde(flatten)]
    pub base: BaseFields,
}

impl ResourceVersion {
    /// Build a new, unsaved version
    pub fn new(mnemonic: String, versioned_object: ResourceRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mnemonic,
            versioned_object,
            released: false,
            description: None,
            previous_version_id: None,
            parent_version_id: None,
            base: BaseFields::new(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::Version
    }

    /// Model-level validation run before every save.
    ///
    /// Checks the mnemonic pattern and that the version is not its own
    /// parent. Any other parent passes here.
    pub fn clean(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_mnemonic(&mut errors, "mnemonic", &self.mnemonic);
        if RESERVED_VERSION_MNEMONICS.contains(&self.mnemonic.as_str()) {
            errors.add("mnemonic", format!("{} is a reserved name", self.mnemonic));
        }
        if self.parent_version_id.as_deref() == Some(self.id.as_str()) {
            errors.add(PARENT_VERSION_FIELD, "version cannot be its own parent");
        }
        if !self.versioned_object.resource_type.is_versioned() {
            errors.add(
                "versioned_object",
                format!(
                    "{} resources cannot be versioned",
                    self.versioned_object.resource_type
                ),
            );
        }
        errors.into_result()
    }

    /// Path below the versioned object's URL
    pub fn url_under(&self, object_url: &str) -> String {
        format!("{}/{}", object_url, self.mnemonic)
    }
}

impl Record for ResourceVersion {
    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}
