//! Error types module
//!
//! `AppError` is the outward-facing error for the pipeline. Lower layers keep their own
//! error enums (storage, metadata, processing) and convert into `AppError` at the edges
//! where a response or a terminal asset state is produced.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SOURCE_UNREADABLE")
    fn error_code(&self) -> &'static str;

    /// Whether the same request may succeed if retried
    fn is_recoverable(&self) -> bool;

    /// Client-facing message. Never carries internal details for sensitive errors.
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    /// Original blob missing or undecodable.
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("Media processing error: {0}")]
    Processing(String),

    /// External transcode job reported error or canceled.
    #[error("Transcode job failed: {0}")]
    ExternalJobFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// (http_status, error_code, recoverable, sensitive, log_level) per variant.
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, bool, LogLevel) {
    match err {
        AppError::Config(_) => (500, "CONFIG_ERROR", false, true, LogLevel::Error),
        AppError::Storage(_) => (502, "STORAGE_ERROR", true, true, LogLevel::Error),
        AppError::Metadata(_) => (503, "METADATA_STORE_ERROR", true, true, LogLevel::Error),
        AppError::SourceUnreadable(_) => (422, "SOURCE_UNREADABLE", false, false, LogLevel::Warn),
        AppError::Processing(_) => (500, "PROCESSING_ERROR", true, true, LogLevel::Error),
        AppError::ExternalJobFailure(_) => {
            (502, "EXTERNAL_JOB_FAILURE", false, false, LogLevel::Warn)
        }
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, false, LogLevel::Debug),
        AppError::Conflict(_) => (409, "CONFLICT", true, false, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).3
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        if self.is_sensitive() {
            return match self {
                AppError::Storage(_) => "Failed to access storage".to_string(),
                AppError::Metadata(_) => "Failed to access asset metadata".to_string(),
                AppError::Processing(_) => "Failed to process media".to_string(),
                _ => "Internal server error".to_string(),
            };
        }
        match self {
            AppError::SourceUnreadable(msg)
            | AppError::ExternalJobFailure(msg)
            | AppError::InvalidInput(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
