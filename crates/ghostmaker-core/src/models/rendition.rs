use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Still-image output formats the pipeline can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
    Heif,
}

impl ImageFormat {
    /// Lenient parse used by query strings: case-insensitive, accepts common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::WebP),
            "avif" => Some(ImageFormat::Avif),
            "heif" | "heic" => Some(ImageFormat::Heif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Heif => "heic",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Heif => "image/heic",
        }
    }

    /// Higher is preferred when choosing the best URL for a ladder rung.
    pub fn preference(&self) -> u8 {
        match self {
            ImageFormat::Avif | ImageFormat::Heif => 3,
            ImageFormat::WebP => 2,
            ImageFormat::Jpeg | ImageFormat::Png => 1,
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImageFormat::Jpeg => write!(f, "jpeg"),
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::WebP => write!(f, "webp"),
            ImageFormat::Avif => write!(f, "avif"),
            ImageFormat::Heif => write!(f, "heif"),
        }
    }
}

/// One concrete derived artifact. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendition {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// `jpeg`, `webp`, `avif`, `hls`, `mp4` or the original container extension.
    pub format: String,
    pub key: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}
