use async_trait::async_trait;
use ghostmaker_core::models::AssetId;
use ghostmaker_core::{NotificationSink, PipelineOutcome};

/// Writes each outcome as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<(), String> {
        match outcome {
            PipelineOutcome::Ready { version } => tracing::info!(
                asset_id = %asset_id,
                version = version,
                "Asset ready"
            ),
            PipelineOutcome::Failed { error } => tracing::warn!(
                asset_id = %asset_id,
                error = %error,
                "Asset failed"
            ),
        }
        Ok(())
    }
}
