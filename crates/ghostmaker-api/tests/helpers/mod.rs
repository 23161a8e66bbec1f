#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;
use ghostmaker_api::setup::routes::setup_routes;
use ghostmaker_api::setup::services::{assemble_services, ServiceBackends};
use ghostmaker_core::models::{AssetId, JobStatus, MediaAsset};
use ghostmaker_core::{Config, NoOpNotifier};
use ghostmaker_db::{InMemoryMetadataStore, MetadataStore};
use ghostmaker_processing::video::VideoProbe;
use ghostmaker_processing::{
    CodecEncoder, ProcessingError, ProcessingResult, VideoTarget, VideoTranscoder,
};
use ghostmaker_storage::{BlobStore, CacheDirective, MemoryStorage};
use ghostmaker_worker::{JobStatusReport, TranscodeError, TranscodeJobRequest, TranscodeJobService};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Stands in for a host without ffmpeg.
pub struct UnavailableTranscoder;

#[async_trait]
impl VideoTranscoder for UnavailableTranscoder {
    async fn probe(&self, _input: &Path) -> ProcessingResult<VideoProbe> {
        Err(ProcessingError::SourceUnreadable("ffprobe unavailable".to_string()))
    }

    async fn capture_frame(&self, _input: &Path, _output: &Path, _ts: f64, _w: u32, _h: u32) -> ProcessingResult<()> {
        Err(ProcessingError::Transcode("ffmpeg unavailable".to_string()))
    }

    async fn encode_hls(&self, _input: &Path, _output_dir: &Path, _target: &VideoTarget) -> ProcessingResult<()> {
        Err(ProcessingError::Transcode("ffmpeg unavailable".to_string()))
    }

    async fn encode_mp4(&self, _input: &Path, _output: &Path, _target: &VideoTarget) -> ProcessingResult<()> {
        Err(ProcessingError::Transcode("ffmpeg unavailable".to_string()))
    }
}

/// Reads a 1920x1080, 10 second source but cannot encode. Remote mode only reads source metadata.
pub struct MetadataOnlyTranscoder;

#[async_trait]
impl VideoTranscoder for MetadataOnlyTranscoder {
    async fn probe(&self, _input: &Path) -> ProcessingResult<VideoProbe> {
        Ok(VideoProbe {
            duration: 10.0,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            bitrate: None,
            framerate: Some(30.0),
        })
    }

    async fn capture_frame(&self, input: &Path, output: &Path, ts: f64, w: u32, h: u32) -> ProcessingResult<()> {
        UnavailableTranscoder.capture_frame(input, output, ts, w, h).await
    }

    async fn encode_hls(&self, input: &Path, output_dir: &Path, target: &VideoTarget) -> ProcessingResult<()> {
        UnavailableTranscoder.encode_hls(input, output_dir, target).await
    }

    async fn encode_mp4(&self, input: &Path, output: &Path, target: &VideoTarget) -> ProcessingResult<()> {
        UnavailableTranscoder.encode_mp4(input, output, target).await
    }
}

/// Hands out sequential job ids and reports every job as running.
#[derive(Default)]
pub struct FakeJobService {
    pub submitted: Mutex<Vec<TranscodeJobRequest>>,
}

#[async_trait]
impl TranscodeJobService for FakeJobService {
    async fn submit(&self, request: &TranscodeJobRequest) -> Result<String, TranscodeError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("job-{}", submitted.len()))
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatusReport, TranscodeError> {
        Ok(JobStatusReport {
            job_id: job_id.to_string(),
            status: JobStatus::Running,
            user_metadata: None,
            error_message: None,
            outputs: None,
        })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStorage>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub jobs: Arc<FakeJobService>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub async fn upload(&self, key: &str, data: Bytes) {
        self.store
            .put(key, data, "application/octet-stream", CacheDirective::NoCache)
            .await
            .unwrap();
    }

    pub async fn asset(&self, project: &str, media: &str) -> Option<MediaAsset> {
        self.metadata.get(&AssetId::new(project, media)).await.unwrap()
    }

    /// Poll the status endpoint until `status` is reported.
    pub async fn wait_for_status(&self, project: &str, media: &str, status: &str) -> serde_json::Value {
        let path = format!("/assets/{}/{}", project, media);
        for _ in 0..3000 {
            let response = self.server.get(&path).await;
            if response.status_code() == 200 {
                let body: serde_json::Value = response.json();
                if body["status"] == status {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{}/{} never reached {}", project, media, status);
    }

    pub async fn wait_for_job(&self, project: &str, media: &str) {
        for _ in 0..3000 {
            if let Some(asset) = self.asset(project, media).await {
                if asset.job.is_some() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{}/{} never got a transcode job", project, media);
    }
}

fn config(remote: bool) -> Config {
    let mut vars: HashMap<&str, &str> = HashMap::from([
        ("STORAGE_BACKEND", "memory"),
        ("METADATA_BACKEND", "memory"),
        ("WORKER_CONCURRENCY", "2"),
        ("TRANSFORM_MAX_WIDTH", "2048"),
    ]);
    if remote {
        vars.insert("TRANSCODE_MODE", "remote");
        vars.insert("TRANSCODE_SERVICE_URL", "http://transcoder.test");
    }
    Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).expect("valid test config")
}

async fn build(remote: bool) -> TestApp {
    let config = config(remote);
    let store = Arc::new(MemoryStorage::new("https://cdn.test"));
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let jobs = Arc::new(FakeJobService::default());
    let transcoder: Arc<dyn VideoTranscoder> = if remote {
        Arc::new(MetadataOnlyTranscoder)
    } else {
        Arc::new(UnavailableTranscoder)
    };

    let services = assemble_services(
        &config,
        ServiceBackends {
            store: store.clone(),
            metadata: metadata.clone(),
            encoder: Arc::new(CodecEncoder),
            transcoder,
            transcode_service: Some(jobs.clone()),
            notifier: Some(Arc::new(NoOpNotifier)),
        },
    )
    .await
    .expect("services assemble");

    let router = setup_routes(services.state.clone(), config.server().max_event_body_bytes);
    TestApp {
        server: TestServer::new(router).expect("test server"),
        store,
        metadata,
        jobs,
    }
}

/// Local transcode mode with an ffmpeg-less transcoder.
pub async fn setup_test_app() -> TestApp {
    build(false).await
}

/// Remote transcode mode against `FakeJobService`.
pub async fn setup_remote_test_app() -> TestApp {
    build(true).await
}

pub fn png(width: u32, height: u32) -> Bytes {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90, 255])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}
