//! Router assembly: routes, body limits, CORS, request tracing.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers::health::health;
use crate::http::handlers::result::workflow_result;
use crate::http::handlers::upload::{MAX_UPLOAD_BYTES, upload_image};
use crate::state::AppState;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload_image))
        .route("/api/result/{workflow_id}", get(workflow_result))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
