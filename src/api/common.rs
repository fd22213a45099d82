//! Common API utilities and shared types
//!
//! Pagination query parsing, the list envelope shared by every list
//! endpoint, and the owner kinds sources and collections are mounted under.

use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::config::ApiConfig;
use crate::models::{ListParams, PagedResult};
use crate::services::ParentResource;

/// Which kind of owner a route prefix names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    Organization,
    User,
}

impl ParentKind {
    /// Route prefix capturing the owner's mnemonic
    pub fn prefix(self) -> &'static str {
        match self {
            ParentKind::Organization => "/orgs/{org}",
            ParentKind::User => "/users/{user}",
        }
    }

    /// Load the active owner named in the path
    pub async fn load(self, state: &AppState, mnemonic: &str) -> Result<ParentResource, ApiError> {
        Ok(match self {
            ParentKind::Organization => {
                ParentResource::Organization(state.organization_service.get(mnemonic).await?)
            }
            ParentKind::User => {
                ParentResource::User(state.user_service.get_by_username(mnemonic).await?)
            }
        })
    }
}

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Pagination query parameters
///
/// A missing `per_page` uses the configured default; larger values are
/// clamped to the configured maximum.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    pub fn to_params(&self, config: &ApiConfig) -> ListParams {
        ListParams::new(self.page, config.effective_page_size(self.per_page))
    }
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
}

impl<T> From<PagedResult<T>> for PaginatedResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        let has_next = result.has_next();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
            has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamp() {
        let config = ApiConfig::default();
        let query = PaginationQuery {
            page: 0,
            per_page: None,
        };
        let params = query.to_params(&config);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, config.page_size);

        let query = PaginationQuery {
            page: 2,
            per_page: Some(10_000),
        };
        assert_eq!(query.to_params(&config).per_page, config.max_page_size);
    }

    #[test]
    fn test_paginated_response_from_result() {
        let params = ListParams::new(1, 2);
        let response: PaginatedResponse<u8> = PagedResult::new(vec![1, 2], 5, &params).into();
        assert_eq!(response.total_pages, 3);
        assert!(response.has_next);
        assert_eq!(response.items, vec![1, 2]);
    }
}
