//! Services layer - Business logic
//!
//! Services own the rules that span more than one record: uniqueness
//! checks, membership, version lineage and token provisioning. They work
//! against repository traits only.

pub mod collection;
pub mod organization;
pub mod password;
pub mod resolver;
pub mod source;
pub mod user;
pub mod version;

pub use collection::{CollectionService, CreateCollectionInput};
pub use organization::{CreateOrganizationInput, OrganizationService, UpdateOrganizationInput};
pub use password::{hash_password, verify_password};
pub use resolver::{ParentResource, RepositoryResolver, ResourceResolver, VersionedResource};
pub use source::{CreateSourceInput, SourceService, UpdateSourceInput};
pub use user::{CreateUserInput, UpdateUserInput, UserService, UserServiceError};
pub use version::{CreateVersionInput, UpdateVersionInput, VersionService};

use crate::db::repositories::is_unique_violation;
use crate::models::FieldErrors;

/// Error type shared by the organization, source, collection and version
/// services
#[derive(Debug, thiserror::Error)]
pub enum ResourceServiceError {
    /// Field-level validation failure
    #[error("Validation failed: {0}")]
    Validation(#[from] FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller may not write under this parent
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Map a failed insert to a field error when the storage layer rejected a
/// duplicate that slipped past the pre-check.
pub(crate) fn duplicate_or_internal(
    err: anyhow::Error,
    field: &str,
    message: String,
) -> ResourceServiceError {
    if is_unique_violation(&err) {
        tracing::debug!("Unique constraint rejected {}: {}", field, message);
        ResourceServiceError::Validation(FieldErrors::single(field, message))
    } else {
        ResourceServiceError::InternalError(err)
    }
}

/// Replace `target` when a new value was supplied
pub(crate) fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}
