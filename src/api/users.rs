//! User API endpoints
//!
//! - POST /api/v1/users - Create a user and its API token
//! - POST /api/v1/users/login - Exchange credentials for the token
//! - GET /api/v1/users - List users
//! - GET /api/v1/users/{user} - User detail
//! - GET/PUT /api/v1/user - The authenticated user, or update its profile

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{PaginatedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Extras, User};
use crate::services::{CreateUserInput, UpdateUserInput};

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response carrying an API token
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Compact user representation for lists
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl From<User> for UserListResponse {
    fn from(user: User) -> Self {
        let url = user.url();
        Self {
            id: user.username,
            name: user.name,
            url,
        }
    }
}

/// Full user representation. `email` is only shown to the user itself.
#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub uuid: String,
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub url: String,
    pub extras: Extras,
    pub sources_url: String,
}

impl UserDetailResponse {
    /// Representation for the account owner, including the email address
    pub fn private(user: User) -> Self {
        let email = user.email.clone();
        Self {
            email: Some(email),
            ..user.into()
        }
    }
}

impl From<User> for UserDetailResponse {
    fn from(user: User) -> Self {
        let url = user.url();
        Self {
            resource_type: user.resource_type().to_string(),
            uuid: user.id,
            id: user.username.clone(),
            username: user.username,
            name: user.name,
            email: None,
            company: user.company,
            location: user.location,
            created_on: user.base.created_at,
            updated_on: user.base.updated_at,
            sources_url: format!("{}/sources", url),
            url,
            extras: user.base.extras,
        }
    }
}

/// Response for user creation: the user plus its token
#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    #[serde(flatten)]
    pub user: UserDetailResponse,
    pub token: String,
}

/// Routes that need no authentication
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/login", post(login))
        .route("/users/{user}", get(get_user))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/user", get(get_current_user).put(update_current_user))
}

/// POST /api/v1/users
async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state.user_service.create_user(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user: UserDetailResponse::private(user),
            token: token.key,
        }),
    ))
}

/// POST /api/v1/users/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .user_service
        .login(&body.username, &body.password)
        .await?;
    Ok(Json(TokenResponse { token: token.key }))
}

/// GET /api/v1/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<UserListResponse>>, ApiError> {
    let params = query.to_params(&state.api_config);
    let result = state.user_service.list(&params).await?;
    Ok(Json(result.map(UserListResponse::from).into()))
}

/// GET /api/v1/users/{user}
async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = state.user_service.get_by_username(&username).await?;
    Ok(Json(user.into()))
}

/// GET /api/v1/user
async fn get_current_user(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<UserDetailResponse> {
    Json(UserDetailResponse::private(user))
}

/// PUT /api/v1/user
async fn update_current_user(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = state.user_service.update_profile(user, input).await?;
    Ok(Json(UserDetailResponse::private(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_only_in_private_view() {
        let user = User::new(
            "jdoe".into(),
            "jdoe@example.com".into(),
            "John".into(),
            "hash".into(),
        );

        let public = serde_json::to_value(UserDetailResponse::from(user.clone())).unwrap();
        assert!(public.get("email").is_none());
        assert_eq!(public["sources_url"], "/api/v1/users/jdoe/sources");

        let private = serde_json::to_value(UserDetailResponse::private(user)).unwrap();
        assert_eq!(private["email"], "jdoe@example.com");
        assert_eq!(private["url"], "/api/v1/users/jdoe");
    }
}
