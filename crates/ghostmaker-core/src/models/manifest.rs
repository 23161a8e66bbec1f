use serde::{Deserialize, Serialize};

use super::asset::{AssetStatus, MediaKind};
use super::rendition::{ImageFormat, Rendition};

/// Per-format URLs of one ladder rung.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avif: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heif: Option<String>,
}

impl FormatUrls {
    pub fn set(&mut self, format: ImageFormat, url: String) {
        match format {
            ImageFormat::Jpeg | ImageFormat::Png => self.jpg = Some(url),
            ImageFormat::WebP => self.webp = Some(url),
            ImageFormat::Avif => self.avif = Some(url),
            ImageFormat::Heif => self.heif = Some(url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jpg.is_none() && self.webp.is_none() && self.avif.is_none() && self.heif.is_none()
    }

    /// Preferred URL: AVIF/HEIF, then WebP, then JPEG.
    pub fn best(&self) -> Option<&str> {
        self.avif
            .as_deref()
            .or(self.heif.as_deref())
            .or(self.webp.as_deref())
            .or(self.jpg.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LadderEntry {
    pub label: String,
    /// Best available URL among `formats`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub formats: FormatUrls,
    /// Every encoded file of this rung, in encode order.
    #[serde(default)]
    pub renditions: Vec<Rendition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HlsManifest {
    pub master: String,
    pub renditions: Vec<Rendition>,
}

/// Persisted description of everything produced for one asset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub status: AssetStatus,
    pub kind: MediaKind,
    pub version: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Rendition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_placeholder: Option<Rendition>,
    #[serde(default)]
    pub ladder: Vec<LadderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<Rendition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls: Option<HlsManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<Rendition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<Rendition>,
}

impl Manifest {
    pub fn new(kind: MediaKind, version: u32) -> Self {
        Self {
            status: AssetStatus::Ready,
            kind,
            version,
            width: None,
            height: None,
            visual_digest: None,
            content_digest: None,
            thumbnail: None,
            blur_placeholder: None,
            ladder: Vec::new(),
            poster: None,
            hls: None,
            downloads: Vec::new(),
            cover: None,
        }
    }

    /// All renditions referenced by this manifest, flattened in a stable order. A key
    /// referenced from more than one place appears once.
    pub fn renditions(&self) -> Vec<Rendition> {
        let mut out: Vec<Rendition> = Vec::new();
        out.extend(self.thumbnail.iter().cloned());
        out.extend(self.blur_placeholder.iter().cloned());
        for entry in &self.ladder {
            out.extend(entry.renditions.iter().cloned());
        }
        out.extend(self.poster.iter().cloned());
        if let Some(hls) = &self.hls {
            out.extend(hls.renditions.iter().cloned());
        }
        out.extend(self.downloads.iter().cloned());
        out.extend(self.cover.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        out.retain(|r| seen.insert(r.key.clone()));
        out
    }
}
