//! Asset lifecycle transitions
//!
//! Pure: the orchestrator asks `transition` whether an event is allowed and then performs
//! the side effects itself.

use ghostmaker_core::models::AssetStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A trigger for the original arrived.
    Dispatch,
    /// The manifest was persisted.
    Completed,
    /// Generation or the external job failed.
    Failed,
    /// An explicit reprocess request.
    Reprocess,
}

pub fn transition(current: AssetStatus, event: PipelineEvent) -> Option<AssetStatus> {
    match (current, event) {
        // A failed asset re-triggered retries the same version.
        (AssetStatus::Pending | AssetStatus::Failed, PipelineEvent::Dispatch) => {
            Some(AssetStatus::Processing)
        }
        (AssetStatus::Processing, PipelineEvent::Completed) => Some(AssetStatus::Ready),
        (AssetStatus::Processing, PipelineEvent::Failed) => Some(AssetStatus::Failed),
        (
            AssetStatus::Pending | AssetStatus::Ready | AssetStatus::Failed,
            PipelineEvent::Reprocess,
        ) => Some(AssetStatus::Processing),
        _ => None,
    }
}

/// Statuses from which `event` is allowed, for compare-and-update guards.
pub fn sources_for(event: PipelineEvent) -> Vec<AssetStatus> {
    [
        AssetStatus::Pending,
        AssetStatus::Processing,
        AssetStatus::Ready,
        AssetStatus::Failed,
    ]
    .into_iter()
    .filter(|s| transition(*s, event).is_some())
    .collect()
}
