//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and service error mapping
//! - Token authentication

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::db::repositories::{
    SqlxAuthTokenRepository, SqlxCollectionRepository, SqlxOrganizationRepository,
    SqlxSourceRepository, SqlxUserRepository, SqlxVersionRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{FieldErrors, User};
use crate::services::{
    CollectionService, OrganizationService, RepositoryResolver, ResourceResolver,
    ResourceServiceError, SourceService, UserService, UserServiceError, VersionService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub api_config: Arc<ApiConfig>,
    pub user_service: Arc<UserService>,
    pub organization_service: Arc<OrganizationService>,
    pub source_service: Arc<SourceService>,
    pub collection_service: Arc<CollectionService>,
    pub version_service: Arc<VersionService>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, api_config: ApiConfig) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let org_repo = SqlxOrganizationRepository::boxed(pool.clone());
        let source_repo = SqlxSourceRepository::boxed(pool.clone());
        let collection_repo = SqlxCollectionRepository::boxed(pool.clone());

        let resolver: Arc<dyn ResourceResolver> = Arc::new(RepositoryResolver::new(
            org_repo.clone(),
            user_repo.clone(),
        ));

        Self {
            api_config: Arc::new(api_config),
            user_service: Arc::new(UserService::new(
                user_repo.clone(),
                SqlxAuthTokenRepository::boxed(pool.clone()),
            )),
            organization_service: Arc::new(OrganizationService::new(org_repo, user_repo)),
            source_service: Arc::new(SourceService::new(source_repo, resolver.clone())),
            collection_service: Arc::new(CollectionService::new(
                collection_repo,
                resolver.clone(),
            )),
            version_service: Arc::new(VersionService::new(
                SqlxVersionRepository::boxed(pool),
                resolver,
            )),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    /// 400 with `{field: [messages]}` in `details`
    pub fn validation(errors: &FieldErrors) -> Self {
        Self::with_details("VALIDATION_ERROR", errors.to_string(), errors.to_json())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ResourceServiceError> for ApiError {
    fn from(err: ResourceServiceError) -> Self {
        match err {
            ResourceServiceError::Validation(errors) => ApiError::validation(&errors),
            ResourceServiceError::NotFound(what) => {
                ApiError::not_found(format!("Not found: {}", what))
            }
            ResourceServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ResourceServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Validation(errors) => ApiError::validation(&errors),
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::NotFound(username) => {
                ApiError::not_found(format!("User not found: {}", username))
            }
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

/// Extract the API token from `Authorization: Token <key>` or `Bearer <key>`
fn extract_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;

    let user = state.user_service.authenticate(&token).await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
