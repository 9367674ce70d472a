use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Places
        .route("/places", get(handlers::list_places))
        .route("/places/directory", get(handlers::place_directory))
        .route("/places/compare", get(handlers::compare_places))
        .route("/places/:id", get(handlers::get_place))
        .route("/places/:id/similar", get(handlers::similar_places))
        .route("/places/:id/summary", get(handlers::place_summary))
        // Contributors
        .route("/contributors", get(handlers::list_contributors))
        .route("/contributors/:id", get(handlers::get_contributor))
        .route("/contributors/:id/similar", get(handlers::similar_contributors))
        .route("/contributors/:id/summary", get(handlers::contributor_summary))
        // Users
        .route("/users/:id", get(handlers::get_user))
        .route(
            "/users/:id/follows/:contributor_id",
            post(handlers::follow).delete(handlers::unfollow),
        )
        // Cache
        .route("/cache/invalidate", post(handlers::invalidate_cache))
}
