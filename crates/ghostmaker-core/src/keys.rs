//! Object key layout
//!
//! Originals: `projects/{projectId}/media/{mediaId}/{filename}`.
//! Derivatives: `projects/{projectId}/media/{mediaId}/v{version}/...`.
//! On-demand transforms: `proxy-cache/...`.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::AssetId;

pub const CACHE_PREFIX: &str = "proxy-cache/";
pub const MANIFEST_FILE: &str = "manifest.json";

static DERIVATIVE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(thumb\.jpg|poster\.jpg|manifest\.json|blur_placeholder\.[a-z0-9]+|(320|640|960|1280|1920)w\.[a-z0-9]+)$",
    )
    .unwrap_or_else(|e| panic!("derivative filename pattern is invalid: {e}"))
});

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
}

/// Split an original key into its asset identity and filename.
///
/// Returns `None` for anything outside the `projects/{p}/media/{m}/{file}` structure.
pub fn parse_original_key(key: &str) -> Option<(AssetId, String)> {
    let segments: Vec<&str> = key.split('/').collect();
    match segments.as_slice() {
        ["projects", project, "media", media, filename]
            if [project, media, filename].iter().all(|s| is_safe_segment(s)) =>
        {
            Some((AssetId::new(*project, *media), filename.to_string()))
        }
        _ => None,
    }
}

/// True for keys the pipeline itself writes. Such keys must never re-trigger processing.
pub fn is_derivative_key(key: &str) -> bool {
    if key.starts_with(CACHE_PREFIX) {
        return true;
    }
    let segments: Vec<&str> = key.split('/').collect();
    if segments.len() > 5 && segments[0] == "projects" && segments[2] == "media" {
        return true;
    }
    if segments.iter().any(|s| *s == "hls" || *s == "downloads") {
        return true;
    }
    segments
        .last()
        .map(|name| DERIVATIVE_FILE.is_match(&name.to_ascii_lowercase()))
        .unwrap_or(false)
}

pub fn derivative_prefix(id: &AssetId, version: u32) -> String {
    format!("projects/{}/media/{}/v{}", id.project_id, id.media_id, version)
}

pub fn derivative_key(id: &AssetId, version: u32, name: &str) -> String {
    format!("{}/{}", derivative_prefix(id, version), name)
}

pub fn manifest_key(id: &AssetId, version: u32) -> String {
    derivative_key(id, version, MANIFEST_FILE)
}
