//! Version API endpoints
//!
//! Mounted below every source and collection, for both owner kinds:
//! - GET/POST {object}/versions - List or create versions
//! - GET {object}/latest - Latest active version
//! - GET/PUT/DELETE {object}/versions/{version} - Detail, update, soft delete
//! - GET {object}/{version} - Detail at the version's canonical URL

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
use crate::models::{Extras, ResourceVersion};
use crate::services::{CreateVersionInput, ParentResource, UpdateVersionInput, VersionedResource};

/// Which kind of versioned object a route names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Source,
    Collection,
}

impl ObjectKind {
    fn path(self) -> &'static str {
        match self {
            ObjectKind::Source => "sources/{source}",
            ObjectKind::Collection => "collections/{collection}",
        }
    }

    async fn load(
        self,
        state: &AppState,
        parent: &ParentResource,
        mnemonic: &str,
    ) -> Result<VersionedResource, ApiError> {
        Ok(match self {
            ObjectKind::Source => state.source_service.get(parent, mnemonic).await?.into(),
            ObjectKind::Collection => state.collection_service.get(parent, mnemonic).await?.into(),
        })
    }
}

/// Owner kind and object kind of a mounted route set
#[derive(Debug, Clone, Copy)]
struct Scope {
    parent: ParentKind,
    object: ObjectKind,
}

impl Scope {
    fn all() -> impl Iterator<Item = Scope> {
        [ParentKind::Organization, ParentKind::User]
            .into_iter()
            .flat_map(|parent| {
                [ObjectKind::Source, ObjectKind::Collection]
                    .into_iter()
                    .map(move |object| Scope { parent, object })
            })
    }

    fn prefix(self) -> String {
        format!("{}/{}", self.parent.prefix(), self.object.path())
    }

    async fn load(
        self,
        state: &AppState,
        owner: &str,
        object: &str,
    ) -> Result<(ParentResource, VersionedResource), ApiError> {
        let parent = self.parent.load(state, owner).await?;
        let object = self.object.load(state, &parent, object).await?;
        Ok((parent, object))
    }
}

/// Compact representation for lists
#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub id: String,
    pub released: bool,
    pub description: Option<String>,
    pub url: String,
}

impl VersionListResponse {
    pub fn new(version: ResourceVersion, object_url: &str) -> Self {
        Self {
            url: version.url_under(object_url),
            id: version.mnemonic,
            released: version.released,
            description: version.description,
        }
    }
}

/// Full version representation
#[derive(Debug, Serialize)]
pub struct VersionDetailResponse {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub uuid: String,
    pub id: String,
    pub released: bool,
    pub description: Option<String>,
    pub versioned_object: String,
    pub versioned_object_type: String,
    pub versioned_object_url: String,
    pub parent_resource: String,
    pub parent_resource_type: String,
    pub previous_version_mnemonic: Option<String>,
    pub parent_version_mnemonic: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub url: String,
    pub extras: Extras,
}

impl VersionDetailResponse {
    /// Lineage pointers arrive already resolved to mnemonics
    pub fn new(
        version: ResourceVersion,
        object: &VersionedResource,
        parent: &ParentResource,
        previous_version_mnemonic: Option<String>,
        parent_version_mnemonic: Option<String>,
    ) -> Self {
        let object_url = object.url_under(&parent.url());
        Self {
            resource_type: version.resource_type().to_string(),
            url: version.url_under(&object_url),
            uuid: version.id,
            id: version.mnemonic,
            released: version.released,
            description: version.description,
            versioned_object: object.mnemonic().to_string(),
            versioned_object_type: object.resource_type().to_string(),
            versioned_object_url: object_url,
            parent_resource: parent.mnemonic().to_string(),
            parent_resource_type: parent.resource_type().to_string(),
            previous_version_mnemonic,
            parent_version_mnemonic,
            created_on: version.base.created_at,
            updated_on: version.base.updated_at,
            extras: version.base.extras,
        }
    }
}

/// Routes that need no authentication
pub fn public_router() -> Router<AppState> {
    Scope::all().fold(Router::new(), |router, scope| {
        let prefix = scope.prefix();
        router.merge(
            Router::new()
                .route(&format!("{}/versions", prefix), get(list_versions))
                .route(&format!("{}/latest", prefix), get(get_latest_version))
                .route(&format!("{}/versions/{{version}}", prefix), get(get_version))
                .route(&format!("{}/{{version}}", prefix), get(get_version))
                .layer(Extension(scope)),
        )
    })
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Scope::all().fold(Router::new(), |router, scope| {
        let prefix = scope.prefix();
        router.merge(
            Router::new()
                .route(&format!("{}/versions", prefix), post(create_version))
                .route(
                    &format!("{}/versions/{{version}}", prefix),
                    put(update_version).delete(delete_version),
                )
                .layer(Extension(scope)),
        )
    })
}

async fn detail(
    state: &AppState,
    version: ResourceVersion,
    object: &VersionedResource,
    parent: &ParentResource,
) -> Result<VersionDetailResponse, ApiError> {
    let previous = state
        .version_service
        .mnemonic_of(version.previous_version_id.as_deref())
        .await?;
    let parent_version = state
        .version_service
        .mnemonic_of(version.parent_version_id.as_deref())
        .await?;
    Ok(VersionDetailResponse::new(
        version,
        object,
        parent,
        previous,
        parent_version,
    ))
}

/// GET {object}/versions
async fn list_versions(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Path((owner, object)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<VersionListResponse>>, ApiError> {
    let (parent, object) = scope.load(&state, &owner, &object).await?;
    let params = query.to_params(&state.api_config);
    let result = state.version_service.list(&object, &params).await?;

    let object_url = object.url_under(&parent.url());
    Ok(Json(
        result
            .map(|version| VersionListResponse::new(version, &object_url))
            .into(),
    ))
}

/// POST {object}/versions
async fn create_version(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((owner, object)): Path<(String, String)>,
    Json(input): Json<CreateVersionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent, object) = scope.load(&state, &owner, &object).await?;
    let version = state.version_service.create(&object, input, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(detail(&state, version, &object, &parent).await?),
    ))
}

/// GET {object}/latest
async fn get_latest_version(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Path((owner, object)): Path<(String, String)>,
) -> Result<Json<VersionDetailResponse>, ApiError> {
    let (parent, object) = scope.load(&state, &owner, &object).await?;
    let version = state
        .version_service
        .latest_version_of(&object)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("{} has no active versions", object.mnemonic()))
        })?;
    Ok(Json(detail(&state, version, &object, &parent).await?))
}

/// GET {object}/versions/{version}
async fn get_version(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Path((owner, object, mnemonic)): Path<(String, String, String)>,
) -> Result<Json<VersionDetailResponse>, ApiError> {
    let (parent, object) = scope.load(&state, &owner, &object).await?;
    let version = state.version_service.get(&object, &mnemonic).await?;
    Ok(Json(detail(&state, version, &object, &parent).await?))
}

/// PUT {object}/versions/{version}
async fn update_version(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((owner, object, mnemonic)): Path<(String, String, String)>,
    Json(input): Json<UpdateVersionInput>,
) -> Result<Json<VersionDetailResponse>, ApiError> {
    let (parent, object) = scope.load(&state, &owner, &object).await?;
    let version = state
        .version_service
        .update(&object, &mnemonic, input, &user)
        .await?;
    Ok(Json(detail(&state, version, &object, &parent).await?))
}

/// DELETE {object}/versions/{version}
async fn delete_version(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((owner, object, mnemonic)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let (_, object) = scope.load(&state, &owner, &object).await?;
    state
        .version_service
        .soft_delete(&object, &mnemonic, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Organization, ResourceRef, Source};

    #[test]
    fn test_scope_prefixes() {
        let prefixes: Vec<String> = Scope::all().map(Scope::prefix).collect();
        assert_eq!(
            prefixes,
            vec![
                "/orgs/{org}/sources/{source}",
                "/orgs/{org}/collections/{collection}",
                "/users/{user}/sources/{source}",
                "/users/{user}/collections/{collection}",
            ]
        );
    }

    #[test]
    fn test_version_detail_lineage_and_links() {
        let org = Organization::new("OCL".into(), "OCL".into());
        let source = Source::new(
            "CIEL".into(),
            "CIEL".into(),
            "user-1".into(),
            ResourceRef::organization(org.id.clone()),
        );
        let object = VersionedResource::Source(source);
        let version = ResourceVersion::new("v2".into(), object.resource_ref());

        let json = serde_json::to_value(VersionDetailResponse::new(
            version,
            &object,
            &ParentResource::Organization(org),
            Some("v1".into()),
            None,
        ))
        .unwrap();
        assert_eq!(json["type"], "Version");
        assert_eq!(json["id"], "v2");
        assert_eq!(json["url"], "/api/v1/orgs/OCL/sources/CIEL/v2");
        assert_eq!(json["versioned_object"], "CIEL");
        assert_eq!(json["versioned_object_type"], "Source");
        assert_eq!(json["parent_resource"], "OCL");
        assert_eq!(json["previous_version_mnemonic"], "v1");
        assert_eq!(json["parent_version_mnemonic"], serde_json::Value::Null);
        assert_eq!(json["released"], false);
    }
}
