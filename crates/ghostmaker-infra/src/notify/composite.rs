use async_trait::async_trait;
use futures::future::join_all;
use ghostmaker_core::models::AssetId;
use ghostmaker_core::{NotificationSink, PipelineOutcome};
use std::sync::Arc;

/// Fans one outcome out to several sinks. All sinks are attempted even when one fails; the
/// collected errors are joined into the returned message.
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl CompositeNotifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for CompositeNotifier {
    async fn notify(&self, asset_id: &AssetId, outcome: &PipelineOutcome) -> Result<(), String> {
        let results = join_all(self.sinks.iter().map(|s| s.notify(asset_id, outcome))).await;
        let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
