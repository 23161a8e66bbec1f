//! Application state shared by every handler.

use ghostmaker_processing::TransformCache;
use ghostmaker_worker::{DispatchQueue, PipelineOrchestrator};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Accepts triggers and reprocess requests, runs generation off the request path.
    pub dispatch: Arc<DispatchQueue>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub transforms: Arc<TransformCache>,
}
