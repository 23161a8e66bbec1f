use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use ghostmaker_core::models::AssetId;
use ghostmaker_worker::AssetStatusView;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ReprocessAccepted {
    pub version: u32,
}

pub async fn get_asset_status(
    State(state): State<Arc<AppState>>,
    Path((project_id, media_id)): Path<(String, String)>,
) -> Result<Json<AssetStatusView>, HttpAppError> {
    let view = state
        .orchestrator
        .get_asset_status(&AssetId::new(project_id, media_id))
        .await?;
    Ok(Json(view))
}

/// Re-run the pipeline under the next version. Answers once the run is queued.
pub async fn reprocess_asset(
    State(state): State<Arc<AppState>>,
    Path((project_id, media_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset_id = AssetId::new(project_id, media_id);
    let version = state.dispatch.reprocess(&asset_id).await?;
    Ok((StatusCode::ACCEPTED, Json(ReprocessAccepted { version })))
}
