//! Outbound notification hook
//!
//! The orchestrator reports terminal outcomes through this trait. Delivery is best effort:
//! an error returned here is logged by the caller and never changes asset state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::AssetId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PipelineOutcome {
    Ready { version: u32 },
    Failed { error: String },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<(), String>;
}

/// Sink that drops every notification.
pub struct NoOpNotifier;

#[async_trait]
impl NotificationSink for NoOpNotifier {
    async fn notify(&self, _asset_id: &AssetId, _outcome: &PipelineOutcome) -> Result<(), String> {
        Ok(())
    }
}
