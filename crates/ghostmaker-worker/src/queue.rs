//! Dispatch queue: bounded channel of accepted assets drained by a semaphore-limited pool.
//!
//! Acceptance (the `processing` claim) happens on the caller's task, so duplicate triggers are
//! rejected before anything is queued. Shutdown stops the pool from taking new work; in-flight
//! runs finish on their own tasks.

use ghostmaker_core::config::WorkerConfig;
use ghostmaker_core::models::{AssetId, AssetStatus};
use ghostmaker_core::AppError;
use ghostmaker_db::MetadataStore;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::orchestrator::{PipelineOrchestrator, TriggerOutcome};

pub struct DispatchQueue {
    orchestrator: Arc<PipelineOrchestrator>,
    jobs_tx: mpsc::Sender<AssetId>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatchQueue {
    /// Spawn the worker pool and return a handle for submitting work.
    pub fn start(orchestrator: Arc<PipelineOrchestrator>, config: &WorkerConfig) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let concurrency = config.concurrency.max(1);
        let pool_orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            Self::worker_pool(pool_orchestrator, concurrency, jobs_rx, shutdown_rx).await;
        });

        Self {
            orchestrator,
            jobs_tx,
            shutdown_tx,
        }
    }

    async fn worker_pool(
        orchestrator: Arc<PipelineOrchestrator>,
        concurrency: usize,
        mut jobs_rx: mpsc::Receiver<AssetId>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(concurrency = concurrency, "Dispatch worker pool started");
        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Dispatch worker pool shutting down");
                    break;
                }
                next = jobs_rx.recv() => {
                    let Some(asset_id) = next else {
                        break;
                    };
                    // Waiting here leaves further work in the channel, which is the backpressure.
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        orchestrator.process(&asset_id).await;
                    });
                }
            }
        }

        tracing::info!("Dispatch worker pool stopped");
    }

    /// Queue an asset that is already `processing`. Waits while the queue is full.
    pub async fn enqueue(&self, asset_id: AssetId) -> Result<(), AppError> {
        self.jobs_tx
            .send(asset_id)
            .await
            .map_err(|e| AppError::Internal(format!("Dispatch queue closed, dropped {}", e.0)))
    }

    /// Guard the trigger on the caller's task and queue accepted assets for generation.
    pub async fn on_object_created(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<TriggerOutcome, AppError> {
        let outcome = self.orchestrator.accept_trigger(bucket, key, size).await?;
        if let TriggerOutcome::Accepted { asset_id, .. } = &outcome {
            self.enqueue(asset_id.clone()).await?;
        }
        Ok(outcome)
    }

    /// Bump the asset's version and queue the new run.
    pub async fn reprocess(&self, asset_id: &AssetId) -> Result<u32, AppError> {
        let version = self.orchestrator.reprocess(asset_id).await?;
        self.enqueue(asset_id.clone()).await?;
        Ok(version)
    }

    /// Re-queue local runs left `processing` by a previous process. Assets waiting on a remote
    /// job are left to the job poller.
    pub async fn resume_interrupted(&self, metadata: &dyn MetadataStore) -> Result<usize, AppError> {
        let stranded: Vec<AssetId> = metadata
            .list_by_status(AssetStatus::Processing)
            .await?
            .into_iter()
            .filter(|asset| asset.job.is_none())
            .map(|asset| asset.id)
            .collect();

        let count = stranded.len();
        for asset_id in stranded {
            self.enqueue(asset_id).await?;
        }
        if count > 0 {
            tracing::info!(count = count, "Re-queued interrupted runs");
        }
        Ok(count)
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    /// Signal the pool to stop taking work. Does not wait for running assets.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
