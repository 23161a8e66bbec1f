//! Placeholder and near-duplicate digests
//!
//! Both digests are computed from the oriented original, never from an encoded derivative.

use image::imageops::FilterType;
use image::DynamicImage;
use sha2::{Digest, Sha256};

use super::resize::fit_inside;

const VISUAL_SAMPLE_EDGE: u32 = 32;
const VISUAL_COMPONENTS_X: u32 = 4;
const VISUAL_COMPONENTS_Y: u32 = 3;
const CONTENT_SAMPLE_EDGE: u32 = 8;
const CONTENT_DIGEST_HEX_LEN: usize = 16;

/// Blurhash of a 32x32 (inside fit) downsample with 4x3 components.
pub fn visual_digest(img: &DynamicImage) -> Option<String> {
    let (w, h) = fit_inside(
        img.width(),
        img.height(),
        VISUAL_SAMPLE_EDGE,
        VISUAL_SAMPLE_EDGE,
    );
    let sample = img.resize_exact(w.max(1), h.max(1), FilterType::Triangle).to_rgba8();
    match blurhash::encode(
        VISUAL_COMPONENTS_X,
        VISUAL_COMPONENTS_Y,
        sample.width(),
        sample.height(),
        sample.as_raw(),
    ) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!(error = ?e, "Blurhash encoding failed");
            None
        }
    }
}

/// SHA-256 over an 8x8 greyscale fill downsample, truncated. Near-identical images collide;
/// this is not an integrity hash.
pub fn content_digest(img: &DynamicImage) -> String {
    let grey = img
        .resize_exact(CONTENT_SAMPLE_EDGE, CONTENT_SAMPLE_EDGE, FilterType::Triangle)
        .to_luma8();
    let digest = Sha256::digest(grey.as_raw());
    let mut hex = hex::encode(digest);
    hex.truncate(CONTENT_DIGEST_HEX_LEN);
    hex
}
