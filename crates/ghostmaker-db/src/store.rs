//! Metadata store abstraction
//!
//! Records are keyed by `AssetId`. During a pipeline run the orchestrator is the only
//! writer of an asset's status and manifest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostmaker_core::models::{AssetId, AssetStatus, MediaAsset, Manifest, ProcessingJob};
use ghostmaker_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<MetadataError> for AppError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(id) => AppError::NotFound(format!("Asset {} not found", id)),
            MetadataError::Config(msg) => AppError::Config(msg),
            other => AppError::Metadata(other.to_string()),
        }
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Partial update of an asset record. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub status: Option<AssetStatus>,
    pub version: Option<u32>,
    pub width: Option<Option<u32>>,
    pub height: Option<Option<u32>>,
    pub visual_digest: Option<Option<String>>,
    pub content_digest: Option<Option<String>>,
    pub renditions: Option<Vec<ghostmaker_core::models::Rendition>>,
    pub manifest: Option<Option<Manifest>>,
    pub error: Option<Option<String>>,
    pub job: Option<Option<ProcessingJob>>,
    pub processed_at: Option<Option<DateTime<Utc>>>,
}

impl AssetUpdate {
    /// Enter `processing` for `version`, dropping any previous outcome.
    pub fn processing(version: u32) -> Self {
        Self {
            status: Some(AssetStatus::Processing),
            version: Some(version),
            renditions: Some(Vec::new()),
            manifest: Some(None),
            error: Some(None),
            job: Some(None),
            processed_at: Some(None),
            ..Default::default()
        }
    }

    /// Flip to `ready` together with the complete manifest in a single write.
    pub fn ready(manifest: Manifest) -> Self {
        Self {
            status: Some(AssetStatus::Ready),
            width: Some(manifest.width),
            height: Some(manifest.height),
            visual_digest: Some(manifest.visual_digest.clone()),
            content_digest: Some(manifest.content_digest.clone()),
            renditions: Some(manifest.renditions()),
            manifest: Some(Some(manifest)),
            error: Some(None),
            job: Some(None),
            processed_at: Some(Some(Utc::now())),
            ..Default::default()
        }
    }

    /// Flip to `failed`. No partial manifest survives.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(AssetStatus::Failed),
            renditions: Some(Vec::new()),
            manifest: Some(None),
            error: Some(Some(error.into())),
            job: Some(None),
            processed_at: Some(Some(Utc::now())),
            ..Default::default()
        }
    }

    /// Record source dimensions learned before the outcome is known.
    pub fn dimensions(width: u32, height: u32) -> Self {
        Self {
            width: Some(Some(width)),
            height: Some(Some(height)),
            ..Default::default()
        }
    }

    pub fn with_job(job: ProcessingJob) -> Self {
        Self {
            job: Some(Some(job)),
            ..Default::default()
        }
    }

    pub fn apply(self, asset: &mut MediaAsset) {
        if let Some(status) = self.status {
            asset.status = status;
        }
        if let Some(version) = self.version {
            asset.version = version;
        }
        if let Some(width) = self.width {
            asset.width = width;
        }
        if let Some(height) = self.height {
            asset.height = height;
        }
        if let Some(digest) = self.visual_digest {
            asset.visual_digest = digest;
        }
        if let Some(digest) = self.content_digest {
            asset.content_digest = digest;
        }
        if let Some(renditions) = self.renditions {
            asset.renditions = renditions;
        }
        if let Some(manifest) = self.manifest {
            asset.manifest = manifest;
        }
        if let Some(error) = self.error {
            asset.error = error;
        }
        if let Some(job) = self.job {
            asset.job = job;
        }
        if let Some(processed_at) = self.processed_at {
            asset.processed_at = processed_at;
        }
        asset.updated_at = Utc::now();
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: &AssetId) -> MetadataResult<Option<MediaAsset>>;

    /// Insert only when no record exists for the id. Returns `true` when inserted.
    async fn insert_if_absent(&self, asset: &MediaAsset) -> MetadataResult<bool>;

    /// Apply `update` to an existing record and return the result.
    async fn update(&self, id: &AssetId, update: AssetUpdate) -> MetadataResult<MediaAsset>;

    /// Apply `update` only if the current status is one of `expected`.
    /// Returns `None` without writing when the status did not match.
    async fn compare_and_update(
        &self,
        id: &AssetId,
        expected: &[AssetStatus],
        update: AssetUpdate,
    ) -> MetadataResult<Option<MediaAsset>>;

    async fn list_by_status(&self, status: AssetStatus) -> MetadataResult<Vec<MediaAsset>>;
}
