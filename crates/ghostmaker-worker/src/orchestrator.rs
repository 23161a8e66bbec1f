//! Pipeline orchestration
//!
//! One run per asset: guard the trigger, move the record into `processing`, generate, persist
//! the manifest, then flip to `ready` (or `failed`) and notify. The manifest blob and the
//! `ready` record update are always two separate, ordered writes.

use chrono::Utc;
use ghostmaker_core::config::{TranscodeMode, VideoConfig};
use ghostmaker_core::keys;
use ghostmaker_core::models::{
    AssetId, AssetStatus, JobStatus, Manifest, MediaAsset, MediaKind, ProcessingJob,
};
use ghostmaker_core::{AppError, ErrorMetadata, NotificationSink, PipelineOutcome};
use ghostmaker_db::{AssetUpdate, MetadataStore};
use ghostmaker_processing::{ImageDerivativeGenerator, VideoDerivativeGenerator};
use ghostmaker_storage::{BlobStore, CacheDirective};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::guard::{classify_trigger, TriggerRejection};
use crate::state::{sources_for, transition, PipelineEvent};
use crate::transcode::{JobStatusReport, TranscodeJobRequest, TranscodeJobService};

pub const JOB_TIMEOUT_MESSAGE: &str = "transcode job timed out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The record is now `processing` for `version`.
    Accepted { asset_id: AssetId, version: u32 },
    Ignored(TriggerRejection),
}

impl TriggerOutcome {
    pub fn label(&self) -> String {
        match self {
            TriggerOutcome::Accepted { .. } => "accepted".to_string(),
            TriggerOutcome::Ignored(reason) => format!("ignored:{}", reason),
        }
    }
}

/// Result of feeding a job report into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Ready,
    Failed,
    StillRunning,
    /// The report does not belong to the asset's current job.
    Stale,
}

impl CompletionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionOutcome::Ready => "ready",
            CompletionOutcome::Failed => "failed",
            CompletionOutcome::StillRunning => "running",
            CompletionOutcome::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusView {
    pub status: AssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<MediaAsset> for AssetStatusView {
    fn from(asset: MediaAsset) -> Self {
        Self {
            status: asset.status,
            manifest: asset.manifest.filter(|_| asset.status == AssetStatus::Ready),
            error: asset.error.filter(|_| asset.status == AssetStatus::Failed),
        }
    }
}

/// Collaborators the orchestrator is wired with at startup.
pub struct PipelineDeps {
    pub store: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub images: Arc<ImageDerivativeGenerator>,
    pub videos: Arc<VideoDerivativeGenerator>,
    /// Required when the video config selects remote transcoding.
    pub transcode: Option<Arc<dyn TranscodeJobService>>,
    pub notifier: Arc<dyn NotificationSink>,
}

pub struct PipelineOrchestrator {
    store: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    images: Arc<ImageDerivativeGenerator>,
    videos: Arc<VideoDerivativeGenerator>,
    transcode: Option<Arc<dyn TranscodeJobService>>,
    notifier: Arc<dyn NotificationSink>,
    mode: TranscodeMode,
    segment_seconds: u32,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps, video: &VideoConfig) -> Result<Self, AppError> {
        if video.transcode_mode == TranscodeMode::Remote && deps.transcode.is_none() {
            return Err(AppError::Config(
                "remote transcode mode requires a transcode job service".to_string(),
            ));
        }
        Ok(Self {
            store: deps.store,
            metadata: deps.metadata,
            images: deps.images,
            videos: deps.videos,
            transcode: deps.transcode,
            notifier: deps.notifier,
            mode: video.transcode_mode,
            segment_seconds: video.hls_segment_seconds,
        })
    }

    /// Trigger entrypoint: accept the object and run the pipeline to completion (or until an
    /// external job has been submitted). Safe to call more than once for the same key.
    pub async fn on_object_created(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<TriggerOutcome, AppError> {
        let outcome = self.accept_trigger(bucket, key, size).await?;
        if let TriggerOutcome::Accepted { asset_id, .. } = &outcome {
            self.process(asset_id).await;
        }
        Ok(outcome)
    }

    /// Guard the trigger and move the record into `processing`. Generation is left to
    /// `process`, so callers can hand it to a queue.
    #[tracing::instrument(skip(self), fields(bucket = %bucket, key = %key))]
    pub async fn accept_trigger(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<TriggerOutcome, AppError> {
        let trigger = match classify_trigger(key) {
            Ok(trigger) => trigger,
            Err(reason) => {
                tracing::info!(reason = %reason, "Trigger ignored");
                return Ok(TriggerOutcome::Ignored(reason));
            }
        };

        let record = MediaAsset::new_pending(
            trigger.asset_id.clone(),
            key.to_string(),
            trigger.kind,
            size,
        );
        let version = if self.metadata.insert_if_absent(&record).await? {
            record.version
        } else {
            self.metadata
                .get(&trigger.asset_id)
                .await?
                .map(|existing| existing.version)
                .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", trigger.asset_id)))?
        };

        let claimed = self
            .metadata
            .compare_and_update(
                &trigger.asset_id,
                &sources_for(PipelineEvent::Dispatch),
                AssetUpdate::processing(version),
            )
            .await?;

        match claimed {
            Some(asset) => {
                tracing::info!(
                    asset_id = %asset.id,
                    version = asset.version,
                    kind = %asset.kind,
                    size_bytes = size,
                    "Trigger accepted"
                );
                Ok(TriggerOutcome::Accepted {
                    asset_id: asset.id,
                    version: asset.version,
                })
            }
            None => {
                tracing::info!(
                    asset_id = %trigger.asset_id,
                    reason = %TriggerRejection::Duplicate,
                    "Trigger ignored"
                );
                Ok(TriggerOutcome::Ignored(TriggerRejection::Duplicate))
            }
        }
    }

    /// Run generation for an asset that is already `processing`. Failures end up on the
    /// record, never in the return value.
    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn process(&self, asset_id: &AssetId) {
        let asset = match self.metadata.get(asset_id).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                tracing::warn!("Asset disappeared before processing");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load asset for processing");
                return;
            }
        };
        if asset.status != AssetStatus::Processing {
            tracing::debug!(status = %asset.status, "Asset not processing, skipping");
            return;
        }

        let start = Instant::now();
        let result = match (asset.kind, self.mode) {
            (MediaKind::Image, _) => self.generate_image(&asset).await.map(Some),
            (MediaKind::Video, TranscodeMode::Local) => self.generate_video(&asset).await.map(Some),
            (MediaKind::Video, TranscodeMode::Remote) => self.submit_job(&asset).await.map(|_| None),
        };

        match result {
            Ok(Some(manifest)) => {
                self.complete(&asset, manifest).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e.detailed_message(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Derivative generation failed"
                );
                self.fail(&asset.id, e.client_message()).await;
            }
        }
    }

    async fn load_original(&self, asset: &MediaAsset) -> Result<bytes::Bytes, AppError> {
        self.store.get(&asset.original_key).await.map_err(|e| {
            if e.is_not_found() {
                AppError::SourceUnreadable(format!("original {} not found", asset.original_key))
            } else {
                AppError::from(e)
            }
        })
    }

    async fn generate_image(&self, asset: &MediaAsset) -> Result<Manifest, AppError> {
        let original = self.load_original(asset).await?;
        let derivatives = self
            .images
            .generate(&asset.id, asset.version, original)
            .await?;
        Ok(derivatives.into_manifest(asset.version))
    }

    async fn generate_video(&self, asset: &MediaAsset) -> Result<Manifest, AppError> {
        let original = self.load_original(asset).await?;
        let derivatives = self
            .videos
            .generate(&asset.id, asset.version, &asset.original_key, original)
            .await?;
        Ok(derivatives.into_manifest(asset.version))
    }

    async fn submit_job(&self, asset: &MediaAsset) -> Result<(), AppError> {
        let service = self
            .transcode
            .as_ref()
            .ok_or_else(|| AppError::Config("transcode job service not configured".to_string()))?;

        // Boxes are oriented and capped by the source, so its size has to be known up front.
        let original = self.load_original(asset).await?;
        let probe = self.videos.probe_source(&asset.original_key, &original).await?;
        let asset = self
            .metadata
            .update(&asset.id, AssetUpdate::dimensions(probe.width, probe.height))
            .await?;
        tracing::debug!(
            asset_id = %asset.id,
            width = probe.width,
            height = probe.height,
            duration_secs = probe.duration,
            "Source probed before job submission"
        );

        let request = TranscodeJobRequest::for_asset(&asset, Some(probe.duration), self.segment_seconds);
        let job_id = service.submit(&request).await?;
        let job = ProcessingJob {
            job_id: job_id.clone(),
            status: JobStatus::Submitted,
            asset_id: asset.id.clone(),
            version: asset.version,
            submitted_at: Utc::now(),
        };
        self.metadata
            .compare_and_update(
                &asset.id,
                &[AssetStatus::Processing],
                AssetUpdate::with_job(job),
            )
            .await?;

        tracing::info!(asset_id = %asset.id, job_id = %job_id, "Waiting on transcode job");
        Ok(())
    }

    /// Manifest blob first, then the `ready` flip carrying the same manifest.
    async fn complete(&self, asset: &MediaAsset, manifest: Manifest) -> CompletionOutcome {
        if let Err(e) = self.persist_manifest(&asset.id, &manifest).await {
            tracing::error!(asset_id = %asset.id, error = %e, "Failed to persist manifest");
            return self.fail(&asset.id, e.client_message()).await;
        }

        let rendition_count = manifest.renditions().len();
        let update = self
            .metadata
            .compare_and_update(
                &asset.id,
                &sources_for(PipelineEvent::Completed),
                AssetUpdate::ready(manifest),
            )
            .await;

        match update {
            Ok(Some(ready)) => {
                tracing::info!(
                    asset_id = %ready.id,
                    version = ready.version,
                    renditions = rendition_count,
                    "Asset ready"
                );
                self.notify(
                    ready.id.clone(),
                    PipelineOutcome::Ready {
                        version: ready.version,
                    },
                );
                CompletionOutcome::Ready
            }
            Ok(None) => {
                tracing::warn!(asset_id = %asset.id, "Asset left processing before completion, result dropped");
                CompletionOutcome::Stale
            }
            Err(e) => {
                tracing::error!(asset_id = %asset.id, error = %e, "Failed to mark asset ready");
                CompletionOutcome::Stale
            }
        }
    }

    async fn persist_manifest(&self, asset_id: &AssetId, manifest: &Manifest) -> Result<(), AppError> {
        let body = serde_json::to_vec(manifest)
            .map_err(|e| AppError::Internal(format!("Failed to serialize manifest: {}", e)))?;
        self.store
            .put(
                &keys::manifest_key(asset_id, manifest.version),
                body.into(),
                "application/json",
                CacheDirective::NoCache,
            )
            .await?;
        Ok(())
    }

    async fn fail(&self, asset_id: &AssetId, error: String) -> CompletionOutcome {
        let update = self
            .metadata
            .compare_and_update(
                asset_id,
                &sources_for(PipelineEvent::Failed),
                AssetUpdate::failed(error.clone()),
            )
            .await;

        match update {
            Ok(Some(_)) => {
                tracing::warn!(asset_id = %asset_id, error = %error, "Asset failed");
                self.notify(asset_id.clone(), PipelineOutcome::Failed { error });
                CompletionOutcome::Failed
            }
            Ok(None) => CompletionOutcome::Stale,
            Err(e) => {
                tracing::error!(asset_id = %asset_id, error = %e, "Failed to mark asset failed");
                CompletionOutcome::Stale
            }
        }
    }

    fn notify(&self, asset_id: AssetId, outcome: PipelineOutcome) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&asset_id, &outcome).await {
                tracing::warn!(asset_id = %asset_id, error = %e, "Notification delivery failed");
            }
        });
    }

    /// Completion signal from the external transcoder.
    pub async fn on_transcode_complete(
        &self,
        report: &JobStatusReport,
    ) -> Result<CompletionOutcome, AppError> {
        let meta = report
            .user_metadata
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("userMetadata is required".to_string()))?;
        let asset_id = AssetId::new(meta.project_id.clone(), meta.media_id.clone());
        self.apply_job_report(&asset_id, report).await
    }

    #[tracing::instrument(skip(self, report), fields(asset_id = %asset_id, job_id = %report.job_id, job_status = %report.status))]
    async fn apply_job_report(
        &self,
        asset_id: &AssetId,
        report: &JobStatusReport,
    ) -> Result<CompletionOutcome, AppError> {
        let asset = self
            .metadata
            .get(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;

        let job = match &asset.job {
            Some(job) if job.job_id == report.job_id && asset.status == AssetStatus::Processing => {
                job.clone()
            }
            _ => {
                tracing::info!("Job report does not match the current job, ignored");
                return Ok(CompletionOutcome::Stale);
            }
        };

        match report.status {
            JobStatus::Complete => {
                let source = asset.width.zip(asset.height);
                match self
                    .videos
                    .assemble_remote(asset_id, job.version, &asset.original_key, source)
                    .await
                {
                    Ok(derivatives) => Ok(self.complete(&asset, derivatives.into_manifest(job.version)).await),
                    Err(e) => {
                        let e = AppError::from(e);
                        tracing::warn!(error = %e.detailed_message(), "Assembling transcode outputs failed");
                        Ok(self.fail(asset_id, e.client_message()).await)
                    }
                }
            }
            JobStatus::Error | JobStatus::Canceled => {
                let message = report
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Job {}", report.status));
                Ok(self.fail(asset_id, message).await)
            }
            JobStatus::Submitted | JobStatus::Running => {
                if job.status != report.status {
                    let mut job = job;
                    job.status = report.status;
                    self.metadata
                        .compare_and_update(
                            asset_id,
                            &[AssetStatus::Processing],
                            AssetUpdate::with_job(job),
                        )
                        .await?;
                }
                Ok(CompletionOutcome::StillRunning)
            }
        }
    }

    /// Fallback signal for remote jobs: poll every outstanding job once, abandoning those
    /// older than `timeout`. Returns how many jobs reached a terminal outcome.
    pub async fn poll_outstanding_jobs(&self, timeout: Duration) -> Result<usize, AppError> {
        let Some(service) = self.transcode.as_ref() else {
            return Ok(0);
        };

        let mut settled = 0;
        for asset in self.metadata.list_by_status(AssetStatus::Processing).await? {
            let Some(job) = asset.job.clone() else {
                continue;
            };

            let age = (Utc::now() - job.submitted_at).to_std().unwrap_or_default();
            if age > timeout {
                tracing::warn!(
                    asset_id = %asset.id,
                    job_id = %job.job_id,
                    age_secs = age.as_secs(),
                    "Abandoning transcode job"
                );
                if self.fail(&asset.id, JOB_TIMEOUT_MESSAGE.to_string()).await == CompletionOutcome::Failed {
                    settled += 1;
                }
                continue;
            }

            match service.get_status(&job.job_id).await {
                Ok(report) => {
                    let outcome = self.apply_job_report(&asset.id, &report).await?;
                    if matches!(outcome, CompletionOutcome::Ready | CompletionOutcome::Failed) {
                        settled += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, job_id = %job.job_id, error = %e, "Polling transcode job failed");
                }
            }
        }
        Ok(settled)
    }

    /// Re-enter `processing` under the next version. Old derivative keys stay in place.
    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn reprocess(&self, asset_id: &AssetId) -> Result<u32, AppError> {
        let asset = self
            .metadata
            .get(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))?;

        if transition(asset.status, PipelineEvent::Reprocess).is_none() {
            return Err(AppError::Conflict(format!(
                "Asset {} is already processing",
                asset_id
            )));
        }

        let next = asset.version + 1;
        self.metadata
            .compare_and_update(asset_id, &[asset.status], AssetUpdate::processing(next))
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Asset {} changed concurrently", asset_id)))?;

        tracing::info!(version = next, "Reprocess accepted");
        Ok(next)
    }

    pub async fn get_asset_status(&self, asset_id: &AssetId) -> Result<AssetStatusView, AppError> {
        self.metadata
            .get(asset_id)
            .await?
            .map(AssetStatusView::from)
            .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", asset_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png, Harness, CORRUPT_VIDEO};
    use bytes::Bytes;
    use crate::transcode::JobUserMetadata;

    const PHOTO: &str = "projects/p/media/m/photo.png";
    const CLIP: &str = "projects/p/media/v/clip.mp4";

    fn report(job_id: &str, status: JobStatus, error: Option<&str>) -> JobStatusReport {
        JobStatusReport {
            job_id: job_id.to_string(),
            status,
            user_metadata: Some(JobUserMetadata {
                project_id: "p".to_string(),
                media_id: "v".to_string(),
            }),
            error_message: error.map(str::to_string),
            outputs: None,
        }
    }

    #[tokio::test]
    async fn test_image_trigger_reaches_ready_with_manifest() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(PHOTO, png(800, 600)).await;

        let outcome = h.orchestrator.on_object_created("media", PHOTO, 1234).await.unwrap();
        assert_eq!(
            outcome,
            TriggerOutcome::Accepted {
                asset_id: AssetId::new("p", "m"),
                version: 1
            }
        );

        let asset = h.asset("p", "m").await;
        assert_eq!(asset.status, AssetStatus::Ready);
        assert!(!asset.renditions.is_empty());
        assert_eq!((asset.width, asset.height), (Some(800), Some(600)));
        assert!(asset.visual_digest.is_some());
        assert!(asset.processed_at.is_some());

        let manifest = asset.manifest.unwrap();
        let labels: Vec<&str> = manifest.ladder.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["blur_placeholder", "320w", "640w", "960w", "1280w", "1920w"]);
        assert!(manifest.ladder.iter().all(|e| e.width <= 800));
        assert_eq!(manifest.cover.unwrap().label, "640w");

        let stored = h
            .store
            .get("projects/p/media/m/v1/manifest.json")
            .await
            .unwrap();
        let persisted: Manifest = serde_json::from_slice(&stored).unwrap();
        assert_eq!(persisted.ladder.len(), 6);

        let events = h.notifications(1).await;
        assert_eq!(events[0].1, PipelineOutcome::Ready { version: 1 });
    }

    #[tokio::test]
    async fn test_duplicate_and_derivative_triggers_are_ignored() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(PHOTO, png(64, 64)).await;

        h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();
        let puts = h.store.put_count();

        let again = h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();
        assert_eq!(again, TriggerOutcome::Ignored(TriggerRejection::Duplicate));
        assert_eq!(h.metadata.len().await, 1);

        let thumb = h
            .orchestrator
            .on_object_created("media", "projects/p/media/m/v1/thumb.jpg", 10)
            .await
            .unwrap();
        assert_eq!(thumb, TriggerOutcome::Ignored(TriggerRejection::Derivative));
        assert_eq!(h.store.put_count(), puts);
        assert_eq!(h.metadata.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_create_one_run() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(PHOTO, png(64, 64)).await;

        let (a, b) = tokio::join!(
            h.orchestrator.accept_trigger("media", PHOTO, 10),
            h.orchestrator.accept_trigger("media", PHOTO, 10)
        );
        let accepted = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, TriggerOutcome::Accepted { .. }))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(h.metadata.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_original_fails_asset() {
        let h = Harness::new(TranscodeMode::Local);
        h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();

        let asset = h.asset("p", "m").await;
        assert_eq!(asset.status, AssetStatus::Failed);
        assert!(asset.error.unwrap().contains("not found"));
        assert!(asset.manifest.is_none());
        assert!(asset.renditions.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_then_retry_succeeds() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(PHOTO, Bytes::from_static(b"definitely not a png")).await;
        h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();

        let view = h.orchestrator.get_asset_status(&AssetId::new("p", "m")).await.unwrap();
        assert_eq!(view.status, AssetStatus::Failed);
        assert!(view.manifest.is_none());
        assert!(!view.error.unwrap().is_empty());

        h.upload(PHOTO, png(64, 64)).await;
        let retry = h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();
        assert!(matches!(retry, TriggerOutcome::Accepted { version: 1, .. }));
        let asset = h.asset("p", "m").await;
        assert_eq!(asset.status, AssetStatus::Ready);
        assert!(asset.error.is_none());
    }

    #[tokio::test]
    async fn test_local_video_reaches_ready() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Ready);
        let manifest = asset.manifest.unwrap();
        let hls = manifest.hls.unwrap();
        assert_eq!(hls.renditions.len(), 3);
        assert!(hls.master.ends_with("v1/hls/master.m3u8"));
        assert!(manifest.poster.is_some());
        let downloads: Vec<&str> = manifest.downloads.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(downloads, vec!["1080p", "original"]);
    }

    #[tokio::test]
    async fn test_corrupt_video_fails_without_manifest() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(CLIP, Bytes::from_static(CORRUPT_VIDEO)).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Failed);
        assert!(!asset.error.unwrap_or_default().is_empty());
        assert!(asset.manifest.is_none());
        assert!(!h
            .store
            .exists("projects/p/media/v/v1/manifest.json")
            .await
            .unwrap());

        let events = h.notifications(1).await;
        assert!(matches!(events[0].1, PipelineOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_remote_job_stays_processing_until_reported() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Processing);
        let job = asset.job.unwrap();
        assert_eq!(job.job_id, "job-1");
        assert_eq!(job.status, JobStatus::Submitted);
        assert_eq!(h.jobs.submitted.lock().unwrap()[0].output_prefix, "projects/p/media/v/v1/");

        let running = h
            .orchestrator
            .on_transcode_complete(&report("job-1", JobStatus::Running, None))
            .await
            .unwrap();
        assert_eq!(running, CompletionOutcome::StillRunning);
        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Processing);
        assert_eq!(asset.job.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_remote_job_error_fails_with_job_message() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let stale = h
            .orchestrator
            .on_transcode_complete(&report("job-99", JobStatus::Complete, None))
            .await
            .unwrap();
        assert_eq!(stale, CompletionOutcome::Stale);

        let outcome = h
            .orchestrator
            .on_transcode_complete(&report("job-1", JobStatus::Error, Some("codec missing")))
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::Failed);
        let asset = h.asset("p", "v").await;
        assert_eq!(asset.error.as_deref(), Some("codec missing"));
        assert!(asset.job.is_none());
    }

    #[tokio::test]
    async fn test_remote_job_canceled_without_message() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        h.orchestrator
            .on_transcode_complete(&report("job-1", JobStatus::Canceled, None))
            .await
            .unwrap();
        assert_eq!(h.asset("p", "v").await.error.as_deref(), Some("Job CANCELED"));
    }

    #[tokio::test]
    async fn test_remote_submission_records_source_size() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Processing);
        assert_eq!((asset.width, asset.height), (Some(1920), Some(1080)));

        let submitted = h.jobs.submitted.lock().unwrap()[0].clone();
        let poster = &submitted.outputs[0];
        assert_eq!((poster.container.as_str(), poster.path.as_str()), ("frame", "poster.jpg"));
        assert_eq!(poster.frame_offset_ms, Some(1000));
        let sd = submitted.outputs.iter().find(|o| o.label == "480p").unwrap();
        assert_eq!((sd.max_width, sd.max_height), (640, 360));
    }

    #[tokio::test]
    async fn test_remote_corrupt_video_fails_before_submission() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(CORRUPT_VIDEO)).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Failed);
        assert!(asset.job.is_none());
        assert!(h.jobs.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_job_complete_assembles_outputs() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        for name in [
            "poster.jpg",
            "hls/480p/index.m3u8",
            "hls/720p/index.m3u8",
            "hls/1080p/index.m3u8",
            "downloads/1080p.mp4",
        ] {
            h.upload(&format!("projects/p/media/v/v1/{name}"), Bytes::from_static(b"x")).await;
        }

        let outcome = h
            .orchestrator
            .on_transcode_complete(&report("job-1", JobStatus::Complete, None))
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::Ready);

        let asset = h.asset("p", "v").await;
        assert_eq!((asset.width, asset.height), (Some(1920), Some(1080)));
        let manifest = asset.manifest.unwrap();

        let poster = manifest.poster.clone().unwrap();
        assert_eq!(poster.key, "projects/p/media/v/v1/poster.jpg");
        assert_eq!((poster.width, poster.height), (1280, 720));

        let hls = manifest.hls.clone().unwrap();
        let sizes: Vec<(u32, u32)> = hls.renditions.iter().map(|r| (r.width, r.height)).collect();
        assert_eq!(sizes, vec![(640, 360), (1280, 720), (1920, 1080)]);
        assert!(manifest
            .renditions()
            .iter()
            .all(|r| r.width <= 1920 && r.height <= 1080));

        let master = h.store.get("projects/p/media/v/v1/hls/master.m3u8").await.unwrap();
        let text = String::from_utf8(master.to_vec()).unwrap();
        assert!(text.contains("RESOLUTION=640x360"));
        assert!(text.contains("RESOLUTION=1280x720"));
        assert!(!text.contains("RESOLUTION=360x640"));
        assert!(h.store.exists("projects/p/media/v/v1/manifest.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_poll_abandons_timed_out_jobs() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let settled = h.orchestrator.poll_outstanding_jobs(Duration::ZERO).await.unwrap();
        assert_eq!(settled, 1);
        let asset = h.asset("p", "v").await;
        assert_eq!(asset.status, AssetStatus::Failed);
        assert_eq!(asset.error.as_deref(), Some(JOB_TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_poll_applies_terminal_report() {
        let h = Harness::new(TranscodeMode::Remote);
        h.upload(CLIP, Bytes::from_static(b"mp4 bytes")).await;
        h.orchestrator.on_object_created("media", CLIP, 9).await.unwrap();

        let timeout = Duration::from_secs(3600);
        assert_eq!(h.orchestrator.poll_outstanding_jobs(timeout).await.unwrap(), 0);

        h.jobs.set_report(report("job-1", JobStatus::Error, Some("input corrupt")));
        assert_eq!(h.orchestrator.poll_outstanding_jobs(timeout).await.unwrap(), 1);
        assert_eq!(h.asset("p", "v").await.error.as_deref(), Some("input corrupt"));
    }

    #[tokio::test]
    async fn test_reprocess_bumps_version_and_keeps_old_keys() {
        let h = Harness::new(TranscodeMode::Local);
        h.upload(PHOTO, png(64, 64)).await;
        h.orchestrator.on_object_created("media", PHOTO, 10).await.unwrap();
        let id = AssetId::new("p", "m");

        let version = h.orchestrator.reprocess(&id).await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(h.asset("p", "m").await.status, AssetStatus::Processing);

        let err = h.orchestrator.reprocess(&id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        h.orchestrator.process(&id).await;
        let asset = h.asset("p", "m").await;
        assert_eq!(asset.status, AssetStatus::Ready);
        assert_eq!(asset.manifest.unwrap().version, 2);
        assert!(h.store.exists("projects/p/media/m/v1/thumb.jpg").await.unwrap());
        assert!(h.store.exists("projects/p/media/m/v2/thumb.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_asset_status_is_not_found() {
        let h = Harness::new(TranscodeMode::Local);
        let err = h
            .orchestrator
            .get_asset_status(&AssetId::new("p", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
