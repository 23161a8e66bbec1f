//! Ghostmaker Storage Library
//!
//! The `BlobStore` trait and its backends: S3 (and S3-compatible providers), the local
//! filesystem and an in-memory store.
//!
//! # Key format
//!
//! Keys are plain `/`-separated paths and must not contain `..` or a leading `/`. The key
//! layout itself (originals, versioned derivatives, transform cache) lives in
//! `ghostmaker_core::keys` so every backend stores the same paths.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use ghostmaker_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::{MemoryStorage, StoredObject};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{BlobStore, CacheDirective, StorageError, StorageResult, IMMUTABLE_CACHE_CONTROL};
