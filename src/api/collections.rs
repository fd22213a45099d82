//! Collection API endpoints
//!
//! Mounted under both owner kinds:
//! - GET/POST {owner}/collections - List or create collections
//! - GET {owner}/collections/{collection} - Detail

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::api::common::{PaginatedResponse, PaginationQuery, ParentKind};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::sources::{ContainerListResponse, ContainerResponse};
use crate::models::{Collection, User};
use crate::services::{CreateCollectionInput, ParentResource};

#[derive(Debug, Serialize)]
pub struct CollectionDetailResponse {
    #[serde(flatten)]
    pub common: ContainerResponse,
    pub collection_type: Option<String>,
}

impl CollectionDetailResponse {
    pub fn new(collection: &Collection, parent: &ParentResource, owner: Option<&User>) -> Self {
        Self {
            common: ContainerResponse::new(collection, parent, owner),
            collection_type: collection.collection_type.clone(),
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
                    .route(&format!("{}/collections", prefix), get(list_collections))
                    .route(
                        &format!("{}/collections/{{collection}}", prefix),
                        get(get_collection),
                    )
                    .layer(Extension(kind)),
            )
        })
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    [ParentKind::Organization, ParentKind::User]
        .into_iter()
        .fold(Router::new(), |router, kind| {
            router.merge(
                Router::new()
                    .route(
                        &format!("{}/collections", kind.prefix()),
                        post(create_collection),
                    )
                    .layer(Extension(kind)),
            )
        })
}

async fn detail(
    state: &AppState,
    collection: &Collection,
    parent: &ParentResource,
) -> Result<CollectionDetailResponse, ApiError> {
    let owner = state.user_service.get_by_id(&collection.sub.owner_id).await?;
    Ok(CollectionDetailResponse::new(collection, parent, owner.as_ref()))
}

/// GET {owner}/collections
async fn list_collections(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Path(owner): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PaginatedResponse<ContainerListResponse>>, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let params = query.to_params(&state.api_config);
    let result = state.collection_service.list(&parent, &params).await?;
    Ok(Json(
        result
            .map(|collection| ContainerListResponse::new(&collection, &parent))
            .into(),
    ))
}

/// POST {owner}/collections
async fn create_collection(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(owner): Path<String>,
    Json(input): Json<CreateCollectionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let collection = state
        .collection_service
        .create(&parent, input, &user)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CollectionDetailResponse::new(
            &collection,
            &parent,
            Some(&user),
        )),
    ))
}

/// GET {owner}/collections/{collection}
async fn get_collection(
    State(state): State<AppState>,
    Extension(kind): Extension<ParentKind>,
    Path((owner, mnemonic)): Path<(String, String)>,
) -> Result<Json<CollectionDetailResponse>, ApiError> {
    let parent = kind.load(&state, &owner).await?;
    let collection = state.collection_service.get(&parent, &mnemonic).await?;
    Ok(Json(detail(&state, &collection, &parent).await?))
}
