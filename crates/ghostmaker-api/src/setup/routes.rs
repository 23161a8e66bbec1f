//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn setup_routes(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/img/{*key}", get(handlers::transform::transform_image))
        .route(
            "/assets/{project_id}/{media_id}",
            get(handlers::assets::get_asset_status),
        )
        .route(
            "/assets/{project_id}/{media_id}/reprocess",
            post(handlers::assets::reprocess_asset),
        )
        .route(
            "/events/object-created",
            post(handlers::events::object_created),
        )
        .route(
            "/events/transcode-complete",
            post(handlers::events::transcode_complete),
        )
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
