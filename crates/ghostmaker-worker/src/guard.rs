//! Entry guards for object-created triggers

use ghostmaker_core::keys;
use ghostmaker_core::models::{AssetId, MediaKind};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Why a trigger was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerRejection {
    /// The key is one of the pipeline's own outputs.
    Derivative,
    /// Not `projects/{projectId}/media/{mediaId}/{filename}`.
    MalformedKey,
    UnsupportedKind,
    /// A record for this asset is already processing or ready.
    Duplicate,
}

impl Display for TriggerRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TriggerRejection::Derivative => write!(f, "derivative"),
            TriggerRejection::MalformedKey => write!(f, "malformed_key"),
            TriggerRejection::UnsupportedKind => write!(f, "unsupported_kind"),
            TriggerRejection::Duplicate => write!(f, "duplicate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTrigger {
    pub asset_id: AssetId,
    pub filename: String,
    pub kind: MediaKind,
}

/// Classify a created key. The derivative check runs first so pipeline output never
/// re-enters the pipeline.
pub fn classify_trigger(key: &str) -> Result<AcceptedTrigger, TriggerRejection> {
    if keys::is_derivative_key(key) {
        return Err(TriggerRejection::Derivative);
    }
    let (asset_id, filename) =
        keys::parse_original_key(key).ok_or(TriggerRejection::MalformedKey)?;
    let kind = MediaKind::from_key(&filename).ok_or(TriggerRejection::UnsupportedKind)?;
    Ok(AcceptedTrigger {
        asset_id,
        filename,
        kind,
    })
}
