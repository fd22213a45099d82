//! Organization API endpoints
//!
//! - GET /api/v1/orgs - List organizations
//! - POST /api/v1/orgs - Create an organization
//! - GET/PUT/DELETE /api/v1/orgs/{org} - Detail, partial update, soft delete
//! - POST /api/v1/orgs/{org}/undelete - Restore a soft-deleted organization
//! - GET /api/v1/orgs/{org}/members - List members
//! - PUT/DELETE /api/v1/orgs/{org}/members/{user} - Add or remove a member

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::common::{PaginatedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::users::UserListResponse;
use crate::models::{Extras, Organization, OrganizationCounts};
use crate::services::{CreateOrganizationInput, UpdateOrganizationInput};

/// List representation: mnemonic, name and link only
#[derive(Debug, Serialize)]
pub struct OrganizationListResponse {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl From<Organization> for OrganizationListResponse {
    fn from(org: Organization) -> Self {
        let url = org.url();
        Self {
            id: org.mnemonic,
            name: org.name,
            url,
        }
    }
}

/// Detail representation with membership and public content counts
#[derive(Debug, Serialize)]
pub struct OrganizationDetailResponse {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub uuid: String,
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub website: Option<String>,
    pub members: i64,
    pub public_collections: i64,
    pub public_sources: i64,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub url: String,
    pub extras: Extras,
    pub members_url: String,
    pub sources_url: String,
    pub collections_url: String,
}

impl OrganizationDetailResponse {
    pub fn new(org: Organization, counts: OrganizationCounts) -> Self {
        let url = org.url();
        Self {
            resource_type: org.resource_type().to_string(),
            uuid: org.id,
            id: org.mnemonic,
            name: org.name,
            company: org.company,
            website: org.website,
            members: counts.members,
            public_collections: counts.public_collections,
            public_sources: counts.public_sources,
            created_on: org.base.created_at,
            updated_on: org.base.updated_at,
            members_url: format!("{}/members", url),
            sources_url: format!("{}/sources", url),
            collections_url: format!("{}/collections", url),
            extras: org.base.extras,
            url,
        }
    }
}

/// Routes that need no authentication
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/orgs", get(list_organizations))
        .route("/orgs/{org}", get(get_organization))
        .route("/orgs/{org}/members", get(list_members))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/orgs", post(create_organization))
        .route(
            "/orgs/{org}",
            put(update_organization).delete(delete_organization),
        )
        .route("/orgs/{org}/undelete", post(undelete_organization))
        .route(
            "/orgs/{org}/members/{user}",
            put(add_member).delete(remove_member),
        )
}

async fn detail(
    state: &AppState,
    org: Organization,
) -> Result<OrganizationDetailResponse, ApiError> {
    let counts = state.organization_service.counts(&org).await?;
    Ok(OrganizationDetailResponse::new(org, counts))
}

/// GET /api/v1/orgs
async fn list_organizations(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<OrganizationListResponse>>, ApiError> {
    let params = query.to_params(&state.api_config);
    let result = state.organization_service.list(&params).await?;
    Ok(Json(result.map(OrganizationListResponse::from).into()))
}

/// POST /api/v1/orgs
async fn create_organization(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(input): Json<CreateOrganizationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state.organization_service.create(input, &user).await?;
    Ok((StatusCode::CREATED, Json(detail(&state, org).await?)))
}

/// GET /api/v1/orgs/{org}
async fn get_organization(
    State(state): State<AppState>,
    Path(mnemonic): Path<String>,
) -> Result<Json<OrganizationDetailResponse>, ApiError> {
    let org = state.organization_service.get(&mnemonic).await?;
    Ok(Json(detail(&state, org).await?))
}

/// PUT /api/v1/orgs/{org}
async fn update_organization(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(mnemonic): Path<String>,
    Json(input): Json<UpdateOrganizationInput>,
) -> Result<Json<OrganizationDetailResponse>, ApiError> {
    let org = state
        .organization_service
        .update(&mnemonic, input, &user)
        .await?;
    Ok(Json(detail(&state, org).await?))
}

/// DELETE /api/v1/orgs/{org}
async fn delete_organization(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(mnemonic): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .organization_service
        .soft_delete(&mnemonic, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/orgs/{org}/undelete
async fn undelete_organization(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(mnemonic): Path<String>,
) -> Result<Json<OrganizationDetailResponse>, ApiError> {
    let org = state
        .organization_service
        .undelete(&mnemonic, &user)
        .await?;
    Ok(Json(detail(&state, org).await?))
}

/// GET /api/v1/orgs/{org}/members
async fn list_members(
    State(state): State<AppState>,
    Path(mnemonic): Path<String>,
) -> Result<Json<Vec<UserListResponse>>, ApiError> {
    let org = state.organization_service.get(&mnemonic).await?;
    let members = state.organization_service.members(&org).await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

/// PUT /api/v1/orgs/{org}/members/{user}
async fn add_member(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((mnemonic, username)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .organization_service
        .add_member(&mnemonic, &username, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/orgs/{org}/members/{user}
async fn remove_member(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((mnemonic, username)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .organization_service
        .remove_member(&mnemonic, &username, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_uses_mnemonic_as_id() {
        let org = Organization::new("OCL".into(), "Open Concept Lab".into());
        let json = serde_json::to_value(OrganizationListResponse::from(org)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "OCL", "name": "Open Concept Lab", "url": "/api/v1/orgs/OCL"})
        );
    }

    #[test]
    fn test_detail_response_fields() {
        let mut org = Organization::new("OCL".into(), "Open Concept Lab".into());
        org.company = Some("Regenstrief".into());
        let uuid = org.id.clone();
        let counts = OrganizationCounts {
            members: 2,
            public_collections: 1,
            public_sources: 3,
        };

        let json = serde_json::to_value(OrganizationDetailResponse::new(org, counts)).unwrap();
        assert_eq!(json["type"], "Organization");
        assert_eq!(json["uuid"], uuid.as_str());
        assert_eq!(json["id"], "OCL");
        assert_eq!(json["company"], "Regenstrief");
        assert_eq!(json["website"], serde_json::Value::Null);
        assert_eq!(json["members"], 2);
        assert_eq!(json["public_sources"], 3);
        assert_eq!(json["public_collections"], 1);
        assert_eq!(json["members_url"], "/api/v1/orgs/OCL/members");
        assert_eq!(json["sources_url"], "/api/v1/orgs/OCL/sources");
        assert_eq!(json["collections_url"], "/api/v1/orgs/OCL/collections");
        assert_eq!(json["extras"], serde_json::json!({}));
        assert!(json.get("created_on").is_some());
        assert!(json.get("updated_on").is_some());
    }
}
