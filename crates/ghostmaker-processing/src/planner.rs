//! Rendition planning
//!
//! `plan` is a pure function of media kind and source dimensions. The image ladder is fixed;
//! no-upscale clipping happens at generation time, so a small source still gets every rung
//! planned.

use ghostmaker_core::models::{ImageFormat, MediaKind};

pub const THUMBNAIL_LABEL: &str = "thumb";
pub const BLUR_PLACEHOLDER_LABEL: &str = "blur_placeholder";
pub const POSTER_LABEL: &str = "poster";
pub const ORIGINAL_LABEL: &str = "original";

const THUMBNAIL_BOX: u32 = 300;
const THUMBNAIL_QUALITY: u8 = 80;
const BLUR_PLACEHOLDER_BOX: u32 = 20;
const BLUR_PLACEHOLDER_QUALITY: u8 = 20;
const POSTER_BOX: u32 = 1280;
const POSTER_QUALITY: u8 = 85;
const AUDIO_BITRATE_KBPS: u32 = 128;

/// (box edge, jpeg quality) for each ladder rung.
const IMAGE_LADDER: &[(u32, u8)] = &[(320, 75), (640, 80), (960, 85), (1280, 90), (1920, 95)];

/// (label, short edge, long edge, video kbps) for each streaming rung.
const VIDEO_LADDER: &[(&str, u32, u32, u32)] = &[
    ("480p", 360, 640, 1000),
    ("720p", 540, 960, 2500),
    ("1080p", 720, 1280, 5000),
];

const DOWNLOAD_LABEL: &str = "1080p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenditionRole {
    Thumbnail,
    BlurPlaceholder,
    Ladder,
    Poster,
    Hls,
    Download,
    OriginalDownload,
}

/// Encoding parameters for one planned rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityParams {
    Image {
        jpeg_quality: u8,
        formats: Vec<ImageFormat>,
    },
    Video {
        video_kbps: u32,
        audio_kbps: u32,
    },
    /// Byte-for-byte copy of the original.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionSpec {
    pub label: String,
    pub role: RenditionRole,
    /// Bounding box. The produced rendition fits inside it and never exceeds the source.
    pub width: u32,
    pub height: u32,
    pub quality: QualityParams,
}

impl RenditionSpec {
    fn image(label: impl Into<String>, role: RenditionRole, edge: u32, q: u8, formats: &[ImageFormat]) -> Self {
        Self {
            label: label.into(),
            role,
            width: edge,
            height: edge,
            quality: QualityParams::Image {
                jpeg_quality: q,
                formats: formats.to_vec(),
            },
        }
    }

    pub fn video_kbps(&self) -> Option<u32> {
        match self.quality {
            QualityParams::Video { video_kbps, .. } => Some(video_kbps),
            _ => None,
        }
    }
}

/// Quality to encode `format` at, derived from the rung's JPEG quality.
pub fn quality_for_format(jpeg_quality: u8, format: ImageFormat) -> u8 {
    match format {
        ImageFormat::WebP => jpeg_quality.saturating_sub(15).max(70),
        ImageFormat::Avif | ImageFormat::Heif => jpeg_quality.saturating_sub(20).max(50),
        ImageFormat::Jpeg | ImageFormat::Png => jpeg_quality,
    }
}

pub fn plan(kind: MediaKind, width: Option<u32>, height: Option<u32>) -> Vec<RenditionSpec> {
    match kind {
        MediaKind::Image => plan_image(),
        MediaKind::Video => plan_video(width, height),
    }
}

fn plan_image() -> Vec<RenditionSpec> {
    // Formats without a working encoder collapse onto JPEG when resolved.
    const LADDER_FORMATS: &[ImageFormat] = &[
        ImageFormat::Jpeg,
        ImageFormat::WebP,
        ImageFormat::Avif,
        ImageFormat::Heif,
    ];

    let mut specs = vec![
        RenditionSpec::image(
            THUMBNAIL_LABEL,
            RenditionRole::Thumbnail,
            THUMBNAIL_BOX,
            THUMBNAIL_QUALITY,
            &[ImageFormat::Jpeg],
        ),
        RenditionSpec::image(
            BLUR_PLACEHOLDER_LABEL,
            RenditionRole::BlurPlaceholder,
            BLUR_PLACEHOLDER_BOX,
            BLUR_PLACEHOLDER_QUALITY,
            &[ImageFormat::Jpeg],
        ),
    ];
    specs.extend(IMAGE_LADDER.iter().map(|&(edge, q)| {
        RenditionSpec::image(format!("{}w", edge), RenditionRole::Ladder, edge, q, LADDER_FORMATS)
    }));
    specs
}

/// Portrait (or unknown) sources get `short x long`; landscape sources get it swapped.
fn orient(short: u32, long: u32, landscape: bool) -> (u32, u32) {
    if landscape {
        (long, short)
    } else {
        (short, long)
    }
}

fn plan_video(width: Option<u32>, height: Option<u32>) -> Vec<RenditionSpec> {
    let landscape = matches!((width, height), (Some(w), Some(h)) if w > h);

    let mut specs = vec![RenditionSpec {
        label: POSTER_LABEL.to_string(),
        role: RenditionRole::Poster,
        width: POSTER_BOX,
        height: POSTER_BOX,
        quality: QualityParams::Image {
            jpeg_quality: POSTER_QUALITY,
            formats: vec![ImageFormat::Jpeg],
        },
    }];

    for &(label, short, long, kbps) in VIDEO_LADDER {
        let (w, h) = orient(short, long, landscape);
        specs.push(RenditionSpec {
            label: label.to_string(),
            role: RenditionRole::Hls,
            width: w,
            height: h,
            quality: QualityParams::Video {
                video_kbps: kbps,
                audio_kbps: AUDIO_BITRATE_KBPS,
            },
        });
    }

    let download = VIDEO_LADDER
        .iter()
        .find(|(label, ..)| *label == DOWNLOAD_LABEL)
        .map(|&(_, short, long, kbps)| (orient(short, long, landscape), kbps));
    if let Some(((w, h), kbps)) = download {
        specs.push(RenditionSpec {
            label: DOWNLOAD_LABEL.to_string(),
            role: RenditionRole::Download,
            width: w,
            height: h,
            quality: QualityParams::Video {
                video_kbps: kbps,
                audio_kbps: AUDIO_BITRATE_KBPS,
            },
        });
    }

    specs.push(RenditionSpec {
        label: ORIGINAL_LABEL.to_string(),
        role: RenditionRole::OriginalDownload,
        width: width.unwrap_or(0),
        height: height.unwrap_or(0),
        quality: QualityParams::Passthrough,
    });

    specs
}
