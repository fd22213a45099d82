//! Data models
//!
//! Plain data structures for every persisted entity plus the invariants
//! that can be checked without touching storage.

mod auth_token;
mod base;
mod organization;
mod resource;
mod sub_resource;
mod user;
mod validation;
mod version;

pub use auth_token::AuthToken;
pub use base::{extras_from_json, extras_to_json, BaseFields, Extras, Record};
pub use organization::{Organization, OrganizationCounts};
pub use resource::{PublicAccess, ResourceRef, ResourceType};
pub use sub_resource::{Collection, ContainerDetails, Source, SubResource, SubResourceFields};
pub use user::User;
pub use validation::{
    check_mnemonic, require_text, validate_mnemonic, FieldErrors, MNEMONIC_MAX_LENGTH,
    NAMESPACE_REGEX,
};
pub use version::{ResourceVersion, PARENT_VERSION_FIELD};

use serde::{Deserialize, Serialize};

/// Mount point of the HTTP API; every `url` field starts with it
pub const API_BASE: &str = "/api/v1";

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        ((self.total.max(0) as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Convert every item, keeping the paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}
