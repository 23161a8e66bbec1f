//! External transcode job service
//!
//! In remote mode the orchestrator hands videos to a managed transcoder. The job writes its
//! outputs under the asset's version prefix in the layout `VideoDerivativeGenerator::assemble_remote`
//! reads back, and reports completion by event or by being polled.

use async_trait::async_trait;
use ghostmaker_core::keys;
use ghostmaker_core::models::{JobStatus, MediaAsset};
use ghostmaker_core::AppError;
use ghostmaker_processing::{remote_outputs, RemoteContainer};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("transcode request failed: {0}")]
    Request(String),

    #[error("transcode service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid transcode service response: {0}")]
    Decode(String),
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        AppError::ExternalJobFailure(err.to_string())
    }
}

impl From<reqwest::Error> for TranscodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TranscodeError::Decode(err.to_string())
        } else {
            TranscodeError::Request(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUserMetadata {
    pub project_id: String,
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutputRequest {
    /// `frame`, `hls` or `mp4`.
    pub container: String,
    /// Relative to `outputPrefix`.
    pub path: String,
    pub label: String,
    pub max_width: u32,
    pub max_height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
    /// Capture position for `frame` outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_offset_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJobRequest {
    pub input_key: String,
    pub output_prefix: String,
    pub segment_seconds: u32,
    pub outputs: Vec<JobOutputRequest>,
    pub user_metadata: JobUserMetadata,
}

impl TranscodeJobRequest {
    /// `duration` comes from probing the source and places the poster frame.
    pub fn for_asset(asset: &MediaAsset, duration: Option<f64>, segment_seconds: u32) -> Self {
        let source = asset.width.zip(asset.height);
        let outputs = remote_outputs(source, duration)
            .into_iter()
            .map(|o| JobOutputRequest {
                container: match o.container {
                    RemoteContainer::FrameCapture => "frame".to_string(),
                    RemoteContainer::Hls => "hls".to_string(),
                    RemoteContainer::Mp4 => "mp4".to_string(),
                },
                path: o.path,
                label: o.target.label,
                max_width: o.target.width,
                max_height: o.target.height,
                video_kbps: o.target.video_kbps,
                audio_kbps: o.target.audio_kbps,
                frame_offset_ms: o.frame_offset_ms,
            })
            .collect();

        Self {
            input_key: asset.original_key.clone(),
            output_prefix: format!("{}/", keys::derivative_prefix(&asset.id, asset.version)),
            segment_seconds,
            outputs,
            user_metadata: JobUserMetadata {
                project_id: asset.id.project_id.clone(),
                media_id: asset.id.media_id.clone(),
            },
        }
    }
}

/// Job state as reported by the service, either polled or pushed as a completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub user_metadata: Option<JobUserMetadata>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

#[async_trait]
pub trait TranscodeJobService: Send + Sync {
    /// Submit a job and return its id.
    async fn submit(&self, request: &TranscodeJobRequest) -> Result<String, TranscodeError>;

    async fn get_status(&self, job_id: &str) -> Result<JobStatusReport, TranscodeError>;
}

/// JSON-over-HTTP client: `POST {base}/jobs`, `GET {base}/jobs/{id}`.
pub struct HttpTranscodeService {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTranscodeService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TranscodeError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscodeError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TranscodeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TranscodeError::Status {
            status: status.as_u16(),
            body: body.chars().take(512).collect(),
        })
    }
}

#[async_trait]
impl TranscodeJobService for HttpTranscodeService {
    #[tracing::instrument(skip(self, request), fields(input_key = %request.input_key))]
    async fn submit(&self, request: &TranscodeJobRequest) -> Result<String, TranscodeError> {
        let response = self
            .http_client
            .post(format!("{}/jobs", self.base_url))
            .json(request)
            .send()
            .await?;
        let submitted: SubmitResponse = Self::check(response).await?.json().await?;
        tracing::info!(job_id = %submitted.job_id, "Transcode job submitted");
        Ok(submitted.job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatusReport, TranscodeError> {
        let response = self
            .http_client
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghostmaker_core::models::{AssetId, MediaKind};

    fn video_asset() -> MediaAsset {
        let mut asset = MediaAsset::new_pending(
            AssetId::new("p1", "m1"),
            "projects/p1/media/m1/clip.mp4".to_string(),
            MediaKind::Video,
            1024,
        );
        asset.version = 3;
        asset.width = Some(1920);
        asset.height = Some(1080);
        asset
    }

    #[test]
    fn test_request_layout() {
        let request = TranscodeJobRequest::for_asset(&video_asset(), Some(12.0), 4);
        assert_eq!(request.input_key, "projects/p1/media/m1/clip.mp4");
        assert_eq!(request.output_prefix, "projects/p1/media/m1/v3/");
        assert_eq!(request.outputs.len(), 5);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["userMetadata"]["projectId"], "p1");
        assert_eq!(json["outputs"][0]["container"], "frame");
        assert_eq!(json["outputs"][0]["path"], "poster.jpg");
        assert_eq!(json["outputs"][0]["frameOffsetMs"], 1000);
        assert_eq!(json["outputs"][1]["container"], "hls");
        assert_eq!(json["outputs"][1]["path"], "hls/480p");
        assert!(json["outputs"][1].get("frameOffsetMs").is_none());
        assert_eq!(json["outputs"][4]["container"], "mp4");
        assert_eq!(json["outputs"][4]["videoKbps"], 5000);
    }

    #[test]
    fn test_request_boxes_follow_source_orientation() {
        let request = TranscodeJobRequest::for_asset(&video_asset(), Some(12.0), 4);
        let sd = &request.outputs[1];
        assert_eq!(sd.label, "480p");
        assert_eq!((sd.max_width, sd.max_height), (640, 360));

        let mut portrait = video_asset();
        portrait.width = Some(1080);
        portrait.height = Some(1920);
        let request = TranscodeJobRequest::for_asset(&portrait, Some(12.0), 4);
        assert_eq!((request.outputs[1].max_width, request.outputs[1].max_height), (360, 640));
    }

    #[test]
    fn test_status_report_parses_completion_event() {
        let report: JobStatusReport = serde_json::from_str(
            r#"{"jobId":"j-1","status":"ERROR","userMetadata":{"projectId":"p","mediaId":"m"},"errorMessage":"codec missing"}"#,
        )
        .unwrap();
        assert_eq!(report.status, JobStatus::Error);
        assert_eq!(report.error_message.as_deref(), Some("codec missing"));
        assert_eq!(report.user_metadata.unwrap().media_id, "m");

        let polled: JobStatusReport =
            serde_json::from_str(r#"{"jobId":"j-2","status":"RUNNING"}"#).unwrap();
        assert!(polled.user_metadata.is_none());
        assert!(!polled.status.is_terminal());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_request_error() {
        let service = HttpTranscodeService::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let err = service.get_status("j-1").await.unwrap_err();
        assert!(matches!(err, TranscodeError::Request(_)));
    }
}
