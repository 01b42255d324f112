use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes and layers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// Session routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions/:session_id/content-set",
            post(handlers::create_content_set)
                .get(handlers::get_content_set)
                .delete(handlers::cleanup_content_set),
        )
        .route(
            "/sessions/:session_id/content-set/refresh",
            post(handlers::refresh_content_set),
        )
        .route(
            "/sessions/:session_id/content-set/status",
            get(handlers::get_content_set_status),
        )
        .route(
            "/sessions/:session_id/content-set/expiry",
            post(handlers::schedule_expiry),
        )
        .route("/sessions/:session_id/advance", post(handlers::advance))
        .route(
            "/sessions/:session_id/participants/:participant_id/decisions",
            post(handlers::record_decision),
        )
        .route(
            "/sessions/:session_id/participants/:participant_id/next",
            get(handlers::next_for_participant),
        )
}
