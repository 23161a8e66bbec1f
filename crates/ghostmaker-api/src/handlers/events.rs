//! Storage and transcoder callbacks.

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use ghostmaker_worker::{JobStatusReport, TriggerOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

pub async fn object_created(
    State(state): State<Arc<AppState>>,
    ValidatedJson(event): ValidatedJson<ObjectCreatedEvent>,
) -> Result<impl IntoResponse, HttpAppError> {
    let outcome = state
        .dispatch
        .on_object_created(&event.bucket, &event.key, event.size)
        .await?;

    let version = match &outcome {
        TriggerOutcome::Accepted { version, .. } => Some(*version),
        TriggerOutcome::Ignored(_) => None,
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            outcome: outcome.label(),
            version,
        }),
    ))
}

pub async fn transcode_complete(
    State(state): State<Arc<AppState>>,
    ValidatedJson(report): ValidatedJson<JobStatusReport>,
) -> Result<impl IntoResponse, HttpAppError> {
    let outcome = state.orchestrator.on_transcode_complete(&report).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            outcome: outcome.as_str().to_string(),
            version: None,
        }),
    ))
}
