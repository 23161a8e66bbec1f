//! Pipeline orchestration for ghostmaker: trigger guards, the asset state machine, the
//! dispatch queue and remote transcode job tracking.

pub mod guard;
pub mod orchestrator;
pub mod poller;
pub mod queue;
pub mod state;
pub mod transcode;

#[cfg(test)]
mod test_support;

pub use guard::{classify_trigger, AcceptedTrigger, TriggerRejection};
pub use orchestrator::{
    AssetStatusView, CompletionOutcome, PipelineDeps, PipelineOrchestrator, TriggerOutcome,
    JOB_TIMEOUT_MESSAGE,
};
pub use poller::JobPoller;
pub use queue::DispatchQueue;
pub use state::{transition, PipelineEvent};
pub use transcode::{
    HttpTranscodeService, JobStatusReport, JobUserMetadata, TranscodeError, TranscodeJobRequest,
    TranscodeJobService,
};
