use ghostmaker_core::models::ImageFormat;
use ghostmaker_core::AppError;
use ghostmaker_storage::StorageError;
use thiserror::Error;

/// Failures of a derivative generation run.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The original is missing or cannot be decoded. Terminal for the asset.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// Every planned rendition failed.
    #[error("no renditions could be produced: {0}")]
    NothingProduced(String),

    /// A single encode failed. Callers contain this to the one rendition.
    #[error("{format} encode failed: {message}")]
    Encode {
        format: ImageFormat,
        message: String,
    },

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    pub fn encode(format: ImageFormat, message: impl ToString) -> Self {
        ProcessingError::Encode {
            format,
            message: message.to_string(),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::SourceUnreadable(msg) => AppError::SourceUnreadable(msg),
            ProcessingError::Storage(e) if e.is_not_found() => {
                AppError::SourceUnreadable(format!("original not found: {}", e))
            }
            ProcessingError::Storage(e) => AppError::from(e),
            other => AppError::Processing(other.to_string()),
        }
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
