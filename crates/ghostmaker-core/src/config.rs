//! Configuration module
//!
//! `Config` is built once at process start and handed to each component's constructor.
//! Nothing below the binary reads the environment directly.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::AppError;
use crate::storage_types::StorageBackend;

const BIND_ADDR: &str = "0.0.0.0:3000";
const MAX_EVENT_BODY_BYTES: usize = 64 * 1024;
const LOCAL_STORAGE_PATH: &str = "./data/media";
const DB_MAX_CONNECTIONS: u32 = 10;
const FFMPEG_PATH: &str = "ffmpeg";
const FFPROBE_PATH: &str = "ffprobe";
const HLS_SEGMENT_SECONDS: u32 = 4;
const TRANSCODE_POLL_INTERVAL_SECS: u64 = 15;
const TRANSCODE_TIMEOUT_SECS: u64 = 3600;
const WORKER_CONCURRENCY: usize = 4;
const WORKER_QUEUE_CAPACITY: usize = 256;
const TRANSFORM_MAX_WIDTH: u32 = 4096;
const DIGEST_MAX_SOURCE_BYTES: u64 = 20 * 1024 * 1024;
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Memory,
    Postgres,
}

impl FromStr for MetadataBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(MetadataBackend::Memory),
            "postgres" | "postgresql" => Ok(MetadataBackend::Postgres),
            _ => Err(anyhow::anyhow!("Invalid metadata backend: {}", s)),
        }
    }
}

impl Display for MetadataBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MetadataBackend::Memory => write!(f, "memory"),
            MetadataBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Where video renditions are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// ffmpeg on this host.
    Local,
    /// External managed transcode service.
    Remote,
}

impl FromStr for TranscodeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(TranscodeMode::Local),
            "remote" => Ok(TranscodeMode::Remote),
            _ => Err(anyhow::anyhow!("Invalid transcode mode: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_event_body_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    /// Base URL renditions are served from. Falls back to the backend's native URL.
    pub public_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct ImageConfig {
    /// Visual and content digests are skipped for originals above this size.
    pub digest_max_source_bytes: u64,
    pub transform_max_width: u32,
}

#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub hls_segment_seconds: u32,
    pub transcode_mode: TranscodeMode,
    pub transcode_service_url: Option<String>,
    pub poll_interval_secs: u64,
    pub transcode_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GhostmakerConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub image: ImageConfig,
    pub video: VideoConfig,
    pub worker: WorkerConfig,
    pub notification: NotificationConfig,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<GhostmakerConfig>);

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw))),
        _ => Ok(default),
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Local)?;
        let metadata_backend = parse_or(&lookup, "METADATA_BACKEND", MetadataBackend::Memory)?;
        let transcode_mode = parse_or(&lookup, "TRANSCODE_MODE", TranscodeMode::Local)?;

        let config = GhostmakerConfig {
            server: ServerConfig {
                bind_addr: optional(&lookup, "BIND_ADDR").unwrap_or_else(|| BIND_ADDR.to_string()),
                max_event_body_bytes: parse_or(
                    &lookup,
                    "MAX_UPLOAD_EVENT_BYTES",
                    MAX_EVENT_BODY_BYTES,
                )?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_path: optional(&lookup, "STORAGE_LOCAL_PATH")
                    .unwrap_or_else(|| LOCAL_STORAGE_PATH.to_string()),
                public_base_url: optional(&lookup, "STORAGE_PUBLIC_BASE_URL"),
                s3_bucket: optional(&lookup, "S3_BUCKET"),
                s3_region: optional(&lookup, "S3_REGION").or_else(|| optional(&lookup, "AWS_REGION")),
                s3_endpoint: optional(&lookup, "S3_ENDPOINT"),
            },
            metadata: MetadataConfig {
                backend: metadata_backend,
                database_url: optional(&lookup, "DATABASE_URL"),
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            },
            image: ImageConfig {
                digest_max_source_bytes: parse_or(
                    &lookup,
                    "DIGEST_MAX_SOURCE_BYTES",
                    DIGEST_MAX_SOURCE_BYTES,
                )?,
                transform_max_width: parse_or(&lookup, "TRANSFORM_MAX_WIDTH", TRANSFORM_MAX_WIDTH)?,
            },
            video: VideoConfig {
                ffmpeg_path: optional(&lookup, "FFMPEG_PATH")
                    .unwrap_or_else(|| FFMPEG_PATH.to_string()),
                ffprobe_path: optional(&lookup, "FFPROBE_PATH")
                    .unwrap_or_else(|| FFPROBE_PATH.to_string()),
                hls_segment_seconds: parse_or(&lookup, "HLS_SEGMENT_SECONDS", HLS_SEGMENT_SECONDS)?,
                transcode_mode,
                transcode_service_url: optional(&lookup, "TRANSCODE_SERVICE_URL"),
                poll_interval_secs: parse_or(
                    &lookup,
                    "TRANSCODE_POLL_INTERVAL_SECS",
                    TRANSCODE_POLL_INTERVAL_SECS,
                )?,
                transcode_timeout_secs: parse_or(
                    &lookup,
                    "TRANSCODE_TIMEOUT_SECS",
                    TRANSCODE_TIMEOUT_SECS,
                )?,
            },
            worker: WorkerConfig {
                concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", WORKER_CONCURRENCY)?,
                queue_capacity: parse_or(&lookup, "WORKER_QUEUE_CAPACITY", WORKER_QUEUE_CAPACITY)?,
            },
            notification: NotificationConfig {
                webhook_url: optional(&lookup, "WEBHOOK_URL"),
                webhook_secret: optional(&lookup, "WEBHOOK_SECRET"),
                timeout_secs: parse_or(&lookup, "WEBHOOK_TIMEOUT_SECS", WEBHOOK_TIMEOUT_SECS)?,
            },
        };

        config.validate()?;
        Ok(Config(Box::new(config)))
    }

    pub fn server(&self) -> &ServerConfig {
        &self.0.server
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.0.storage
    }

    pub fn metadata(&self) -> &MetadataConfig {
        &self.0.metadata
    }

    pub fn image(&self) -> &ImageConfig {
        &self.0.image
    }

    pub fn video(&self) -> &VideoConfig {
        &self.0.video
    }

    pub fn worker(&self) -> &WorkerConfig {
        &self.0.worker
    }

    pub fn notification(&self) -> &NotificationConfig {
        &self.0.notification
    }
}

impl GhostmakerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.storage.backend == StorageBackend::S3 {
            if self.storage.s3_bucket.is_none() {
                return Err(AppError::Config(
                    "S3_BUCKET must be set when using S3 storage backend".to_string(),
                ));
            }
            if self.storage.s3_region.is_none() {
                return Err(AppError::Config(
                    "S3_REGION or AWS_REGION must be set when using S3 storage backend".to_string(),
                ));
            }
        }

        if self.metadata.backend == MetadataBackend::Postgres {
            match self.metadata.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                _ => {
                    return Err(AppError::Config(
                        "DATABASE_URL must be a valid PostgreSQL connection string".to_string(),
                    ))
                }
            }
        }

        if !(2..=10).contains(&self.video.hls_segment_seconds) {
            return Err(AppError::Config(
                "HLS_SEGMENT_SECONDS must be between 2 and 10".to_string(),
            ));
        }

        if self.video.transcode_mode == TranscodeMode::Remote
            && self.video.transcode_service_url.is_none()
        {
            return Err(AppError::Config(
                "TRANSCODE_SERVICE_URL must be set when TRANSCODE_MODE=remote".to_string(),
            ));
        }

        if self.worker.concurrency == 0 {
            return Err(AppError::Config(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if self.image.transform_max_width == 0 {
            return Err(AppError::Config(
                "TRANSFORM_MAX_WIDTH must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            digest_max_source_bytes: DIGEST_MAX_SOURCE_BYTES,
            transform_max_width: TRANSFORM_MAX_WIDTH,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: FFMPEG_PATH.to_string(),
            ffprobe_path: FFPROBE_PATH.to_string(),
            hls_segment_seconds: HLS_SEGMENT_SECONDS,
            transcode_mode: TranscodeMode::Local,
            transcode_service_url: None,
            poll_interval_secs: TRANSCODE_POLL_INTERVAL_SECS,
            transcode_timeout_secs: TRANSCODE_TIMEOUT_SECS,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: WORKER_CONCURRENCY,
            queue_capacity: WORKER_QUEUE_CAPACITY,
        }
    }
}
