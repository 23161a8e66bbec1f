//! Encoders and the startup capability table
//!
//! Each output format maps to an encoder. `CodecCapabilities::probe` encodes a 1x1 image in
//! every format once; a format whose encoder fails is recorded as falling back to JPEG.

use bytes::Bytes;
use ghostmaker_core::models::ImageFormat;
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error::{ProcessingError, ProcessingResult};

const AVIF_SPEED: u8 = 6;
const FALLBACK_FORMAT: ImageFormat = ImageFormat::Jpeg;
const PROBED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Avif,
    ImageFormat::Heif,
];

/// Encodes a decoded image into one output format. Implementations are CPU bound and are
/// called from blocking threads.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, img: &DynamicImage, format: ImageFormat, quality: u8) -> ProcessingResult<Bytes>;
}

/// mozjpeg, libwebp, ravif and the `image` PNG writer. HEIF has no encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecEncoder;

impl CodecEncoder {
    fn encode_jpeg(img: &DynamicImage, quality: u8) -> ProcessingResult<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp
            .start_compress(Vec::new())
            .map_err(|e| ProcessingError::encode(ImageFormat::Jpeg, e))?;
        comp.write_scanlines(&rgb_img)
            .map_err(|e| ProcessingError::encode(ImageFormat::Jpeg, e))?;
        let jpeg_data = comp
            .finish()
            .map_err(|e| ProcessingError::encode(ImageFormat::Jpeg, e))?;

        Ok(Bytes::from(jpeg_data))
    }

    fn encode_png(img: &DynamicImage) -> ProcessingResult<Bytes> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .map_err(|e| ProcessingError::encode(ImageFormat::Png, e))?;
        Ok(Bytes::from(buffer))
    }

    fn encode_webp(img: &DynamicImage, quality: u8) -> ProcessingResult<Bytes> {
        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(quality as f32);
        if webp_data.is_empty() {
            return Err(ProcessingError::encode(ImageFormat::WebP, "encoder returned no data"));
        }
        Ok(Bytes::copy_from_slice(&webp_data))
    }

    fn encode_avif(img: &DynamicImage, quality: u8) -> ProcessingResult<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();
        let rgb_data: Vec<rgb::RGB8> = rgb_img
            .as_raw()
            .chunks_exact(3)
            .map(|chunk| rgb::RGB8::new(chunk[0], chunk[1], chunk[2]))
            .collect();

        let img_buf = ravif::Img::new(rgb_data.as_slice(), width as usize, height as usize);
        let encoded = ravif::Encoder::new()
            .with_quality(quality as f32)
            .with_speed(AVIF_SPEED)
            .encode_rgb(img_buf)
            .map_err(|e| ProcessingError::encode(ImageFormat::Avif, e))?;

        Ok(Bytes::from(encoded.avif_file))
    }
}

impl ImageEncoder for CodecEncoder {
    fn encode(&self, img: &DynamicImage, format: ImageFormat, quality: u8) -> ProcessingResult<Bytes> {
        let quality = quality.clamp(1, 100);
        match format {
            ImageFormat::Jpeg => Self::encode_jpeg(img, quality),
            ImageFormat::Png => Self::encode_png(img),
            ImageFormat::WebP => Self::encode_webp(img, quality),
            ImageFormat::Avif => Self::encode_avif(img, quality),
            ImageFormat::Heif => Err(ProcessingError::encode(
                ImageFormat::Heif,
                "no HEIF encoder available",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Available,
    FallbackTo(ImageFormat),
}

/// Format availability decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecCapabilities {
    table: BTreeMap<ImageFormat, Capability>,
}

impl CodecCapabilities {
    pub fn probe(encoder: &dyn ImageEncoder) -> Self {
        let probe_img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([128, 128, 128, 255])));
        let mut table = BTreeMap::new();

        for &format in PROBED_FORMATS {
            let capability = match encoder.encode(&probe_img, format, 80) {
                Ok(data) if !data.is_empty() => Capability::Available,
                Ok(_) => Capability::FallbackTo(FALLBACK_FORMAT),
                Err(e) => {
                    tracing::info!(format = %format, error = %e, "Encoder unavailable, falling back to JPEG");
                    Capability::FallbackTo(FALLBACK_FORMAT)
                }
            };
            table.insert(format, capability);
        }
        // JPEG is the floor; it cannot fall back to itself.
        table.insert(FALLBACK_FORMAT, Capability::Available);

        tracing::info!(capabilities = ?table, "Codec capability probe complete");
        Self { table }
    }

    /// Table with only the given formats available; everything else falls back to JPEG.
    pub fn with_available(formats: &[ImageFormat]) -> Self {
        let table = PROBED_FORMATS
            .iter()
            .map(|&f| {
                let capability = if f == FALLBACK_FORMAT || formats.contains(&f) {
                    Capability::Available
                } else {
                    Capability::FallbackTo(FALLBACK_FORMAT)
                };
                (f, capability)
            })
            .collect();
        Self { table }
    }

    pub fn capability(&self, format: ImageFormat) -> Capability {
        self.table
            .get(&format)
            .copied()
            .unwrap_or(Capability::FallbackTo(FALLBACK_FORMAT))
    }

    /// Format actually encoded when `format` is requested.
    pub fn resolve(&self, format: ImageFormat) -> ImageFormat {
        match self.capability(format) {
            Capability::Available => format,
            Capability::FallbackTo(target) => target,
        }
    }

    /// Resolve a requested format set, dropping formats that collapse onto one already listed.
    pub fn resolve_all(&self, requested: &[ImageFormat]) -> Vec<ImageFormat> {
        let mut out: Vec<ImageFormat> = Vec::with_capacity(requested.len());
        for &format in requested {
            let resolved = self.resolve(format);
            if !out.contains(&resolved) {
                out.push(resolved);
            }
        }
        out
    }
}
