//! On-demand resize proxy with a content-addressed cache
//!
//! Requests are normalised first, so every spelling of the same transform maps to one cache
//! key. A miss is regenerated and returned straight away; the cache write runs in the
//! background. Concurrent misses for one key may both regenerate; the last write wins.

use bytes::Bytes;
use ghostmaker_core::config::ImageConfig;
use ghostmaker_core::keys::CACHE_PREFIX;
use ghostmaker_core::models::ImageFormat;
use ghostmaker_core::AppError;
use ghostmaker_storage::{BlobStore, CacheDirective, StorageError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::image::codec::{CodecCapabilities, ImageEncoder};
use crate::image::generator::ImageDerivativeGenerator;
use crate::image::resize::resize_to_fit;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_FORMAT: ImageFormat = ImageFormat::WebP;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("invalid transform request: {0}")]
    InvalidRequest(String),

    #[error("transform failed: {0}")]
    Processing(String),
}

impl From<TransformError> for AppError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::NotFound(key) => AppError::NotFound(format!("Image {} not found", key)),
            TransformError::InvalidRequest(msg) => AppError::InvalidInput(msg),
            TransformError::Processing(msg) => AppError::Processing(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A transform after defaults, clamping and codec fallback have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTransform {
    pub width: u32,
    pub quality: u8,
    pub format: ImageFormat,
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub data: Bytes,
    pub content_type: &'static str,
    pub cache_key: String,
    pub cache_status: CacheStatus,
}

/// Apply defaults and bounds. Unknown formats become WebP; formats without an encoder
/// resolve through the capability table.
pub fn normalize(
    width: Option<u32>,
    quality: Option<u32>,
    format: Option<&str>,
    max_width: u32,
    capabilities: &CodecCapabilities,
) -> NormalizedTransform {
    let width = width.unwrap_or(DEFAULT_WIDTH).clamp(1, max_width.max(1));
    let quality = quality
        .map(|q| q.clamp(1, 100) as u8)
        .unwrap_or(DEFAULT_QUALITY);
    let requested = format
        .and_then(ImageFormat::parse)
        .unwrap_or(DEFAULT_FORMAT);
    NormalizedTransform {
        width,
        quality,
        format: capabilities.resolve(requested),
    }
}

/// `proxy-cache/{hh}/{sha256}.{ext}` for a normalised transform of `source_key`.
pub fn cache_key(source_key: &str, transform: &NormalizedTransform) -> String {
    let digest = Sha256::digest(
        format!(
            "{}\n{}\n{}\n{}",
            source_key, transform.width, transform.quality, transform.format
        )
        .as_bytes(),
    );
    let hex = hex::encode(digest);
    format!(
        "{}{}/{}.{}",
        CACHE_PREFIX,
        &hex[..2],
        hex,
        transform.format.extension()
    )
}

pub struct TransformCache {
    store: Arc<dyn BlobStore>,
    encoder: Arc<dyn ImageEncoder>,
    capabilities: Arc<CodecCapabilities>,
    max_width: u32,
}

impl TransformCache {
    pub fn new(
        store: Arc<dyn BlobStore>,
        encoder: Arc<dyn ImageEncoder>,
        capabilities: Arc<CodecCapabilities>,
        config: &ImageConfig,
    ) -> Self {
        Self {
            store,
            encoder,
            capabilities,
            max_width: config.transform_max_width,
        }
    }

    pub fn normalize(&self, width: Option<u32>, quality: Option<u32>, format: Option<&str>) -> NormalizedTransform {
        normalize(width, quality, format, self.max_width, &self.capabilities)
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        source_key: &str,
        width: Option<u32>,
        quality: Option<u32>,
        format: Option<&str>,
    ) -> Result<TransformOutput, TransformError> {
        let source_key = source_key.trim_start_matches('/');
        if source_key.is_empty() || source_key.starts_with(CACHE_PREFIX) {
            return Err(TransformError::InvalidRequest(format!(
                "not a transformable source: {}",
                source_key
            )));
        }

        let transform = self.normalize(width, quality, format);
        let key = cache_key(source_key, &transform);
        let content_type = transform.format.mime_type();

        match self.store.get(&key).await {
            Ok(data) => {
                tracing::debug!(key = %key, size_bytes = data.len(), "Transform cache hit");
                return Ok(TransformOutput {
                    data,
                    content_type,
                    cache_key: key,
                    cache_status: CacheStatus::Hit,
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Transform cache read failed, regenerating");
            }
        }

        let start = Instant::now();
        let original = self.store.get(source_key).await.map_err(|e| match e {
            StorageError::NotFound(_) => TransformError::NotFound(source_key.to_string()),
            StorageError::InvalidKey(msg) => TransformError::InvalidRequest(msg),
            other => TransformError::Processing(other.to_string()),
        })?;

        let encoder = self.encoder.clone();
        let data = tokio::task::spawn_blocking(move || {
            let img = ImageDerivativeGenerator::decode_oriented(&original)?;
            let resized = resize_to_fit(&img, transform.width, u32::MAX);
            encoder.encode(&resized, transform.format, transform.quality)
        })
        .await
        .map_err(|e| TransformError::Processing(e.to_string()))?
        .map_err(|e| TransformError::Processing(e.to_string()))?;

        tracing::info!(
            source_key = %source_key,
            key = %key,
            width = transform.width,
            quality = transform.quality,
            format = %transform.format,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transform cache miss regenerated"
        );

        let store = self.store.clone();
        let write_key = key.clone();
        let write_data = data.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .put(&write_key, write_data, content_type, CacheDirective::Immutable)
                .await
            {
                tracing::warn!(key = %write_key, error = %e, "Transform cache write failed");
            }
        });

        Ok(TransformOutput {
            data,
            content_type,
            cache_key: key,
            cache_status: CacheStatus::Miss,
        })
    }
}
