//! Fallback signal for remote transcode jobs, in case a completion event never arrives.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::orchestrator::PipelineOrchestrator;

pub struct JobPoller {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl JobPoller {
    /// Check outstanding jobs every `interval`; jobs older than `timeout` are abandoned.
    pub fn spawn(orchestrator: Arc<PipelineOrchestrator>, interval: Duration, timeout: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = interval.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_secs = period.as_secs(),
                timeout_secs = timeout.as_secs(),
                "Transcode job poller started"
            );
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match orchestrator.poll_outstanding_jobs(timeout).await {
                            Ok(0) => {}
                            Ok(settled) => tracing::info!(settled = settled, "Transcode jobs settled by poll"),
                            Err(e) => tracing::error!(error = %e, "Transcode job poll failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::info!("Transcode job poller stopped");
        });

        Self { shutdown_tx, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}
