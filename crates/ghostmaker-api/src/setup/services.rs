//! Pipeline wiring: stores, generators, notifiers, orchestrator and background workers.

use anyhow::{Context, Result};
use ghostmaker_core::{Config, NotificationSink, TranscodeMode};
use ghostmaker_db::{create_metadata_store, MetadataStore};
use ghostmaker_infra::{CompositeNotifier, LogNotifier, WebhookNotifier, WebhookNotifierConfig};
use ghostmaker_processing::{
    CodecCapabilities, CodecEncoder, FfmpegTranscoder, ImageDerivativeGenerator, ImageEncoder,
    TransformCache, VideoDerivativeGenerator, VideoTranscoder,
};
use ghostmaker_storage::{create_storage, BlobStore};
use ghostmaker_worker::{
    DispatchQueue, HttpTranscodeService, JobPoller, PipelineDeps, PipelineOrchestrator,
    TranscodeJobService,
};
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

const TRANSCODE_SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Collaborators that can be swapped for in-process fakes.
pub struct ServiceBackends {
    pub store: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub encoder: Arc<dyn ImageEncoder>,
    pub transcoder: Arc<dyn VideoTranscoder>,
    pub transcode_service: Option<Arc<dyn TranscodeJobService>>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

pub struct Services {
    pub state: Arc<AppState>,
    pub queue: Arc<DispatchQueue>,
    pub poller: Option<JobPoller>,
}

impl Services {
    /// Stop background workers. In-flight asset runs are not awaited.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
        if let Some(poller) = self.poller {
            poller.shutdown().await;
        }
        tracing::info!("Background workers stopped");
    }
}

/// Build the production backends from configuration.
pub async fn initialize_services(config: &Config) -> Result<Services> {
    let store = create_storage(config.storage())
        .await
        .context("Failed to initialize blob storage")?;
    tracing::info!(backend = %store.backend_type(), "Blob storage ready");

    let metadata = create_metadata_store(config.metadata())
        .await
        .context("Failed to initialize metadata store")?;

    let video = config.video();
    let transcoder = FfmpegTranscoder::new(
        video.ffmpeg_path.clone(),
        video.ffprobe_path.clone(),
        video.hls_segment_seconds,
    )
    .context("Invalid ffmpeg configuration")?;

    let transcode_service: Option<Arc<dyn TranscodeJobService>> = match video.transcode_mode {
        TranscodeMode::Local => None,
        TranscodeMode::Remote => {
            let url = video
                .transcode_service_url
                .clone()
                .context("TRANSCODE_SERVICE_URL must be set when TRANSCODE_MODE=remote")?;
            let service = HttpTranscodeService::new(url, TRANSCODE_SERVICE_TIMEOUT)
                .context("Failed to create transcode service client")?;
            Some(Arc::new(service))
        }
    };

    assemble_services(
        config,
        ServiceBackends {
            store,
            metadata,
            encoder: Arc::new(CodecEncoder),
            transcoder: Arc::new(transcoder),
            transcode_service,
            notifier: None,
        },
    )
    .await
}

/// Wire the pipeline around the given backends and start its background workers. Without
/// an explicit notifier, the log sink (plus the webhook sink when configured) is used.
pub async fn assemble_services(config: &Config, backends: ServiceBackends) -> Result<Services> {
    let start = std::time::Instant::now();
    let capabilities = Arc::new(CodecCapabilities::probe(backends.encoder.as_ref()));

    let images = Arc::new(ImageDerivativeGenerator::new(
        backends.store.clone(),
        backends.encoder.clone(),
        capabilities.clone(),
        config.image().clone(),
    ));
    let videos = Arc::new(VideoDerivativeGenerator::new(
        backends.store.clone(),
        backends.transcoder,
        config.video().clone(),
    ));

    let notifier = match backends.notifier {
        Some(notifier) => notifier,
        None => default_notifier(config)?,
    };

    let orchestrator = Arc::new(
        PipelineOrchestrator::new(
            PipelineDeps {
                store: backends.store.clone(),
                metadata: backends.metadata.clone(),
                images,
                videos,
                transcode: backends.transcode_service,
                notifier,
            },
            config.video(),
        )
        .context("Failed to build pipeline orchestrator")?,
    );

    let queue = Arc::new(DispatchQueue::start(orchestrator.clone(), config.worker()));
    queue
        .resume_interrupted(backends.metadata.as_ref())
        .await
        .context("Failed to re-queue interrupted runs")?;

    let video = config.video();
    let poller = (video.transcode_mode == TranscodeMode::Remote).then(|| {
        JobPoller::spawn(
            orchestrator.clone(),
            Duration::from_secs(video.poll_interval_secs),
            Duration::from_secs(video.transcode_timeout_secs),
        )
    });

    let transforms = Arc::new(TransformCache::new(
        backends.store,
        backends.encoder,
        capabilities,
        config.image(),
    ));

    tracing::info!(
        transcode_mode = ?video.transcode_mode,
        worker_concurrency = config.worker().concurrency,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Pipeline services initialized"
    );

    Ok(Services {
        state: Arc::new(AppState {
            dispatch: queue.clone(),
            orchestrator,
            transforms,
        }),
        queue,
        poller,
    })
}

fn default_notifier(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    let log: Arc<dyn NotificationSink> = Arc::new(LogNotifier);
    let mut composite = CompositeNotifier::new(vec![log]);
    if let Some(webhook) = WebhookNotifierConfig::from_config(config.notification()) {
        tracing::info!(url = %webhook.url, signed = webhook.secret.is_some(), "Webhook notifications enabled");
        composite.push(Arc::new(
            WebhookNotifier::new(webhook).context("Failed to create webhook notifier")?,
        ));
    }
    Ok(Arc::new(composite))
}
