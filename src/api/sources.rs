//! Source API endpoints
//!
//! Mounted under both owner kinds (`/orgs/{org}` and `/users/{user}`):
//! - GET/POST {owner}/sources - List or create sources
//! - GET/PUT/DELETE {owner}/sources/{source} - Detail, update, soft delete

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::common::{PaginatedResponse, PaginationQuery, ParentKind};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Extras, PublicAccess, Record, Source, SubResource, User};
use crate::services::{CreateSourceInput, ParentResource, UpdateSourceInput};

/// List representation shared by sources and collections
#[derive(Debug, Serialize)]
pub struct ContainerListResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub owner: String,
    pub owner_type: String,
}

impl ContainerListResponse {
    pub fn new(resource: &dyn SubResource, parent: &ParentResource) -> Self {
        Self {
            id: resource.mnemonic().to_string(),
            name: resource.details().name.clone(),
            url: resource.url_under(&parent.url()),
            owner: parent.mnemonic().to_string(),
            owner_type: parent.resource_type().to_string(),
        }
    }
}

/// Detail fields shared by sources and collections
#[derive(Debug, Serialize)]
pub struct ContainerResponse {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub uuid: String,
    pub id: String,
    pub name: String,
    pub full_name: Option<String>,
    pub public_access: PublicAccess,
    pub default_locale: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub owner_url: Option<String>,
    pub parent_resource: String,
    pub parent_resource_type: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub url: String,
    pub versions_url: String,
    pub extras: Extras,
}

impl ContainerResponse {
    /// `owner` is the creating user, when it still exists
    pub fn new(resource: &dyn SubResource, parent: &ParentResource, owner: Option<&User>) -> Self {
        let details = resource.details();
        let base = resource.base();
        let url = resource.url_under(&parent.url());
        Self {
            resource_type: resource.resource_type().to_string(),
            uuid: resource.id().to_string(),
            id: resource.mnemonic().to_string(),
            name: details.name.clone(),
            full_name: details.full_name.clone(),
            public_access: details.public_access,
            default_locale: details.default_locale.clone(),
            website: details.website.clone(),
            description: details.description.clone(),
            owner: owner.map(|user| user.username.clone()),
            owner_url: owner.map(User::url),
            parent_resource: parent.mnemonic().to_string(),
            parent_resource_type: parent.resource_type().to_string(),
            created_on: base.created_at,
            updated_on: base.updated_at,
            versions_url: format!("{}/versions", url),
            url,
            extras: base.extras.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceDetailResponse {
    #[serde(flatten)]
    pub common: ContainerResponse,
    pub source_type: Option<String>,
}

impl SourceDetailResponse {
    pub fn new(source: &Source, parent: &ParentResource, owner: Option<&User>) -> Self {
        Self {
            common: ContainerResponse::new(source, parent, owner),
            source_type: source.source_type.clone(),
        }
    }
}

/// Routes that need no authentication
pub fn public_router() -> Router<AppState> {
    [ParentKind::Organization, ParentKind::User]
        .into_iter()
        .fold(Router::new(), |router, kind| {
            let prefix = kind.prefix();
            router.merge(
                Router::new()
                    .route(&format!("{}/sources", prefix), get(list_sources))
                    .route(&format!("{}/sources/{{source}}", prefix), get(get_source))
                    .layer(Extension(kind)),
            )
        })
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    [ParentKind::Organization, ParentKind::User]
        .into_iter()
        .fold(Router::new(), |router, kind| {
            let prefix = kind.prefix();
            router.merge(
                Router::new()
                    .route(&format!("{}/sources", prefix), post(create_source))
                    .route(
                        &format!("{}/sources/{{source}}", prefix),
                        put(update_source).delete(delete_source),
                    )
                    .layer(Extension(kind)),
            )
        })
}

async fn detail(
    state: &AppState,
    source: &Source,
    parent: &ParentResource,
) -> Result<SourceDetailResponse, ApiError> {
    let owner = state.user_service.get_by_id(&source.sub.owner_id).await?;
    Ok(SourceDetailResponse::new(source, parent, owner.as_ref()))
}

/// GET {owner}/sources
async fn list_sources(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Path(owner): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<ContainerListResponse>>, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let params = query.to_params(&state.api_config);
    let result = state.source_service.list(&parent, &params).await?;
    Ok(Json(
        result
            .map(|source| ContainerListResponse::new(&source, &parent))
            .into(),
    ))
}

/// POST {owner}/sources
async fn create_source(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(owner): Path<String>,
    Json(input): Json<CreateSourceInput>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let source = state.source_service.create(&parent, input, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(SourceDetailResponse::new(&source, &parent, Some(&user))),
    ))
}

/// GET {owner}/sources/{source}
async fn get_source(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Path((owner, mnemonic)): Path<(String, String)>,
) -> Result<Json<SourceDetailResponse>, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let source = state.source_service.get(&parent, &mnemonic).await?;
    Ok(Json(detail(&state, &source, &parent).await?))
}

/// PUT {owner}/sources/{source}
async fn update_source(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((owner, mnemonic)): Path<(String, String)>,
    Json(input): Json<UpdateSourceInput>,
) -> Result<Json<SourceDetailResponse>, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let source = state
        .source_service
        .update(&parent, &mnemonic, input, &user)
        .await?;
    Ok(Json(detail(&state, &source, &parent).await?))
}

/// DELETE {owner}/sources/{source}
async fn delete_source(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((owner, mnemonic)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    state
        .source_service
        .soft_delete(&parent, &mnemonic, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Organization, ResourceRef};

    #[test]
    fn test_source_detail_links() {
        let org = Organization::new("OCL".into(), "OCL".into());
        let owner = User::new("jdoe".into(), "j@example.com".into(), "J".into(), "h".into());
        let mut source = Source::new(
            "CIEL".into(),
            "CIEL".into(),
            owner.id.clone(),
            ResourceRef::organization(org.id.clone()),
        );
        source.source_type = Some("Dictionary".into());
        let parent = ParentResource::Organization(org);

        let json =
            serde_json::to_value(SourceDetailResponse::new(&source, &parent, Some(&owner)))
                .unwrap();
        assert_eq!(json["type"], "Source");
        assert_eq!(json["id"], "CIEL");
        assert_eq!(json["url"], "/api/v1/orgs/OCL/sources/CIEL");
        assert_eq!(json["versions_url"], "/api/v1/orgs/OCL/sources/CIEL/versions");
        assert_eq!(json["owner_url"], "/api/v1/users/jdoe");
        assert_eq!(json["parent_resource"], "OCL");
        assert_eq!(json["parent_resource_type"], "Organization");
        assert_eq!(json["public_access"], "View");
        assert_eq!(json["source_type"], "Dictionary");
    }

    #[test]
    fn test_list_entry_under_user() {
        let owner = User::new("jdoe".into(), "j@example.com".into(), "J".into(), "h".into());
        let source = Source::new(
            "mine".into(),
            "Mine".into(),
            owner.id.clone(),
            ResourceRef::user(owner.id.clone()),
        );
        let entry = ContainerListResponse::new(&source, &ParentResource::User(owner));
        assert_eq!(entry.url, "/api/v1/users/jdoe/sources/mine");
        assert_eq!(entry.owner_type, "User");
    }
}
