//! On-demand image transforms: `GET /img/{*key}?w=&q=&f=`

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName},
    response::IntoResponse,
};
use ghostmaker_storage::IMMUTABLE_CACHE_CONTROL;
use serde::Deserialize;
use std::sync::Arc;

/// Raw query values. Unparseable numbers fall back to the defaults like missing ones do.
#[derive(Debug, Default, Deserialize)]
pub struct TransformQuery {
    pub w: Option<String>,
    pub q: Option<String>,
    pub f: Option<String>,
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|v| v.trim().parse().ok())
}

#[tracing::instrument(skip(state, query), fields(key = %key))]
pub async fn transform_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<TransformQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let output = state
        .transforms
        .resolve(
            &key,
            parse_number(query.w.as_deref()),
            parse_number(query.q.as_deref()),
            query.f.as_deref(),
        )
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, output.content_type),
            (header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL),
            (HeaderName::from_static("x-cache"), output.cache_status.as_str()),
        ],
        output.data,
    ))
}
