//! Blob storage abstraction trait
//!
//! This module defines the `BlobStore` trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<StorageError> for ghostmaker_core::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ghostmaker_core::AppError::NotFound(key),
            StorageError::InvalidKey(msg) => ghostmaker_core::AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => ghostmaker_core::AppError::Config(msg),
            other => ghostmaker_core::AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Caching semantics attached to a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// Versioned or content-addressed; may be cached forever.
    Immutable,
    /// Immutable, and served as an attachment rather than inline.
    Download,
    /// Must be revalidated on every read.
    NoCache,
}

impl CacheDirective {
    pub fn cache_control(&self) -> &'static str {
        match self {
            CacheDirective::Immutable | CacheDirective::Download => IMMUTABLE_CACHE_CONTROL,
            CacheDirective::NoCache => "no-cache",
        }
    }

    /// `Content-Disposition` for the blob stored under `key`, if any.
    pub fn content_disposition(&self, key: &str) -> Option<String> {
        match self {
            CacheDirective::Download => {
                let filename = key.rsplit('/').next().unwrap_or(key);
                Some(format!("attachment; filename=\"{}\"", filename))
            }
            _ => None,
        }
    }
}

/// Blob storage abstraction trait
///
/// All storage backends (S3, local filesystem, in-memory) implement this trait, so the
/// pipeline never couples to a specific provider. Keys are `/`-separated, never start with
/// `/` and never contain `..`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. Missing keys map to `StorageError::NotFound`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Store a blob. A blob is either fully visible to readers or not visible at all.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        cache: CacheDirective,
    ) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete keys. Keys that do not exist are skipped.
    async fn delete(&self, keys: &[String]) -> StorageResult<()>;

    /// Publicly reachable URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}
