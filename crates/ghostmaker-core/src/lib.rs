//! Ghostmaker Core Library
//!
//! Domain models, error types, configuration and the object key layout shared by every
//! ghostmaker component.

pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod notify;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    Config, GhostmakerConfig, ImageConfig, MetadataBackend, MetadataConfig, NotificationConfig,
    ServerConfig, StorageConfig, TranscodeMode, VideoConfig, WorkerConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use notify::{NoOpNotifier, NotificationSink, PipelineOutcome};
pub use storage_types::StorageBackend;
