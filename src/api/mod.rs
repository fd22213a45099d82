//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`. Reads are public; writes go through
//! token authentication.

pub mod collections;
pub mod common;
pub mod middleware;
pub mod organizations;
pub mod sources;
pub mod users;
pub mod versions;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::models::API_BASE;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Writes and the current-user endpoint need a valid token
    let protected_routes = Router::new()
        .merge(users::protected_router())
        .merge(organizations::protected_router())
        .merge(sources::protected_router())
        .merge(collections::protected_router())
        .merge(versions::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .merge(users::public_router())
        .merge(organizations::public_router())
        .merge(sources::public_router())
        .merge(collections::public_router())
        .merge(versions::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    let cors = match cors_origin {
        "*" => cors.allow_origin(Any),
        origin => match origin.parse::<HeaderValue>() {
            Ok(origin) => cors.allow_origin(origin),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                cors
            }
        },
    };

    Router::new()
        .nest(API_BASE, build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
