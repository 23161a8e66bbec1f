use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::job::ProcessingJob;
use super::manifest::Manifest;
use super::rendition::Rendition;

/// Composite identity of a media asset. An asset never moves between projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetId {
    pub project_id: String,
    pub media_id: String,
}

impl AssetId {
    pub fn new(project_id: impl Into<String>, media_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            media_id: media_id.into(),
        }
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.project_id, self.media_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "heic", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

impl MediaKind {
    /// Classify an object key by its file extension (case-insensitive).
    pub fn from_key(key: &str) -> Option<Self> {
        let name = key.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Lifecycle: `pending -> processing -> ready | failed`. Leaving `ready` or `failed`
/// requires an explicit reprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetStatus::Ready | AssetStatus::Failed)
    }
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::Pending => write!(f, "pending"),
            AssetStatus::Processing => write!(f, "processing"),
            AssetStatus::Ready => write!(f, "ready"),
            AssetStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AssetStatus::Pending),
            "processing" => Ok(AssetStatus::Processing),
            "ready" => Ok(AssetStatus::Ready),
            "failed" => Ok(AssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: AssetId,
    pub original_key: String,
    pub kind: MediaKind,
    pub status: AssetStatus,
    /// Derivative generation; derivatives of version `n` live under `v{n}/`.
    pub version: u32,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub visual_digest: Option<String>,
    pub content_digest: Option<String>,
    /// Non-empty only while `status == Ready`.
    pub renditions: Vec<Rendition>,
    pub manifest: Option<Manifest>,
    /// Present only while `status == Failed`.
    pub error: Option<String>,
    pub job: Option<ProcessingJob>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MediaAsset {
    /// A fresh `pending` record for a newly uploaded original.
    pub fn new_pending(id: AssetId, original_key: String, kind: MediaKind, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_key,
            kind,
            status: AssetStatus::Pending,
            version: 1,
            size_bytes,
            width: None,
            height: None,
            visual_digest: None,
            content_digest: None,
            renditions: Vec::new(),
            manifest: None,
            error: None,
            job: None,
            uploaded_at: now,
            processed_at: None,
            updated_at: now,
        }
    }
}
