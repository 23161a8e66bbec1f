//! Fakes and a wired-up harness for orchestrator tests.

use async_trait::async_trait;
use bytes::Bytes;
use ghostmaker_core::config::{ImageConfig, TranscodeMode, VideoConfig};
use ghostmaker_core::models::{AssetId, ImageFormat, JobStatus, MediaAsset};
use ghostmaker_core::{NotificationSink, PipelineOutcome};
use ghostmaker_db::{InMemoryMetadataStore, MetadataStore};
use ghostmaker_processing::video::VideoProbe;
use ghostmaker_processing::{
    CodecCapabilities, ImageDerivativeGenerator, ImageEncoder, ProcessingError,
    ProcessingResult, VideoDerivativeGenerator, VideoTarget, VideoTranscoder,
};
use ghostmaker_storage::{BlobStore, CacheDirective, MemoryStorage};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::orchestrator::{PipelineDeps, PipelineOrchestrator};
use crate::transcode::{JobStatusReport, TranscodeError, TranscodeJobRequest, TranscodeJobService};

pub const CORRUPT_VIDEO: &[u8] = b"corrupt video bytes";

/// Encodes nothing; returns a tag naming the format and size.
pub struct StubEncoder;

impl ImageEncoder for StubEncoder {
    fn encode(&self, img: &DynamicImage, format: ImageFormat, _quality: u8) -> ProcessingResult<Bytes> {
        let (w, h) = img.dimensions();
        Ok(Bytes::from(format!("{}:{}x{}", format, w, h)))
    }
}

/// Writes placeholder files where ffmpeg would write real output.
#[derive(Default)]
pub struct FakeTranscoder;

#[async_trait]
impl VideoTranscoder for FakeTranscoder {
    async fn probe(&self, input: &Path) -> ProcessingResult<VideoProbe> {
        let data = tokio::fs::read(input).await?;
        if data == CORRUPT_VIDEO {
            return Err(ProcessingError::SourceUnreadable(
                "ffprobe failed: invalid data found when processing input".to_string(),
            ));
        }
        Ok(VideoProbe {
            duration: 10.0,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            bitrate: Some(4_000_000),
            framerate: Some(30.0),
        })
    }

    async fn capture_frame(&self, _input: &Path, output: &Path, _ts: f64, _w: u32, _h: u32) -> ProcessingResult<()> {
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }

    async fn encode_hls(&self, _input: &Path, output_dir: &Path, _target: &VideoTarget) -> ProcessingResult<()> {
        tokio::fs::create_dir_all(output_dir).await?;
        tokio::fs::write(output_dir.join("segment_000.ts"), b"ts").await?;
        tokio::fs::write(output_dir.join("index.m3u8"), b"#EXTM3U\n").await?;
        Ok(())
    }

    async fn encode_mp4(&self, _input: &Path, output: &Path, _target: &VideoTarget) -> ProcessingResult<()> {
        tokio::fs::write(output, b"mp4").await?;
        Ok(())
    }
}

/// Records submissions and answers status queries from a table.
#[derive(Default)]
pub struct FakeJobService {
    pub submitted: Mutex<Vec<TranscodeJobRequest>>,
    pub reports: Mutex<HashMap<String, JobStatusReport>>,
    counter: AtomicUsize,
}

impl FakeJobService {
    pub fn set_report(&self, report: JobStatusReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(report.job_id.clone(), report);
    }
}

#[async_trait]
impl TranscodeJobService for FakeJobService {
    async fn submit(&self, request: &TranscodeJobRequest) -> Result<String, TranscodeError> {
        self.submitted.lock().unwrap().push(request.clone());
        Ok(format!("job-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatusReport, TranscodeError> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or(JobStatusReport {
                job_id: job_id.to_string(),
                status: JobStatus::Running,
                user_metadata: None,
                error_message: None,
                outputs: None,
            }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(AssetId, PipelineOutcome)>>,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<(), String> {
        self.events
            .lock()
            .unwrap()
            .push((asset_id.clone(), outcome.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStorage>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub jobs: Arc<FakeJobService>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl Harness {
    pub fn new(mode: TranscodeMode) -> Self {
        let store = Arc::new(MemoryStorage::new("https://cdn.test"));
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let jobs = Arc::new(FakeJobService::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let video_config = VideoConfig {
            transcode_mode: mode,
            ..VideoConfig::default()
        };

        let images = Arc::new(ImageDerivativeGenerator::new(
            store.clone(),
            Arc::new(StubEncoder),
            Arc::new(CodecCapabilities::with_available(&[ImageFormat::WebP])),
            ImageConfig::default(),
        ));
        let videos = Arc::new(VideoDerivativeGenerator::new(
            store.clone(),
            Arc::new(FakeTranscoder),
            video_config.clone(),
        ));

        let orchestrator = PipelineOrchestrator::new(
            PipelineDeps {
                store: store.clone(),
                metadata: metadata.clone(),
                images,
                videos,
                transcode: Some(jobs.clone()),
                notifier: notifier.clone(),
            },
            &video_config,
        )
        .unwrap();

        Self {
            store,
            metadata,
            jobs,
            notifier,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub async fn upload(&self, key: &str, data: impl Into<Bytes>) {
        self.store
            .put(key, data.into(), "application/octet-stream", CacheDirective::NoCache)
            .await
            .unwrap();
    }

    pub async fn asset(&self, project: &str, media: &str) -> MediaAsset {
        self.metadata
            .get(&AssetId::new(project, media))
            .await
            .unwrap()
            .expect("asset record exists")
    }

    /// Wait for spawned notifications to land.
    pub async fn notifications(&self, expected: usize) -> Vec<(AssetId, PipelineOutcome)> {
        for _ in 0..200 {
            let events = self.notifier.events.lock().unwrap().clone();
            if events.len() >= expected {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.notifier.events.lock().unwrap().clone()
    }
}

pub fn png(width: u32, height: u32) -> Bytes {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}
