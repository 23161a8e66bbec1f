//! Image derivative generation
//!
//! The original is decoded and oriented once. Every planned rung is then resized and encoded
//! independently; a failed (rung, format) pair is logged and left out.

use bytes::Bytes;
use futures::future::join_all;
use ghostmaker_core::config::ImageConfig;
use ghostmaker_core::keys;
use ghostmaker_core::models::{
    AssetId, FormatUrls, ImageFormat, LadderEntry, Manifest, MediaKind, Rendition,
};
use ghostmaker_storage::{BlobStore, CacheDirective};
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use super::codec::{CodecCapabilities, ImageEncoder};
use super::digest;
use super::orientation::ImageOrientation;
use super::resize::resize_to_fit;
use crate::cover::select_cover_candidate;
use crate::error::{ProcessingError, ProcessingResult};
use crate::planner::{self, quality_for_format, QualityParams, RenditionRole, RenditionSpec};

/// Everything produced for one image version.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDerivatives {
    pub width: u32,
    pub height: u32,
    pub thumbnail: Option<Rendition>,
    pub blur_placeholder: Option<Rendition>,
    pub visual_digest: Option<String>,
    pub content_digest: Option<String>,
    /// Blur placeholder followed by the resolution rungs, in plan order.
    pub ladder: Vec<LadderEntry>,
}

impl ImageDerivatives {
    pub fn into_manifest(self, version: u32) -> Manifest {
        let mut manifest = Manifest::new(MediaKind::Image, version);
        let ladder_renditions: Vec<Rendition> = self
            .ladder
            .iter()
            .filter(|entry| entry.label != planner::BLUR_PLACEHOLDER_LABEL)
            .flat_map(|entry| entry.renditions.iter().cloned())
            .collect();
        manifest.cover = select_cover_candidate(&ladder_renditions);
        manifest.width = Some(self.width);
        manifest.height = Some(self.height);
        manifest.visual_digest = self.visual_digest;
        manifest.content_digest = self.content_digest;
        manifest.thumbnail = self.thumbnail;
        manifest.blur_placeholder = self.blur_placeholder;
        manifest.ladder = self.ladder;
        manifest
    }
}

struct EncodedRung {
    spec: RenditionSpec,
    width: u32,
    height: u32,
    outputs: Vec<(ImageFormat, ProcessingResult<Bytes>)>,
}

pub struct ImageDerivativeGenerator {
    store: Arc<dyn BlobStore>,
    encoder: Arc<dyn ImageEncoder>,
    capabilities: Arc<CodecCapabilities>,
    config: ImageConfig,
}

impl ImageDerivativeGenerator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        encoder: Arc<dyn ImageEncoder>,
        capabilities: Arc<CodecCapabilities>,
        config: ImageConfig,
    ) -> Self {
        Self {
            store,
            encoder,
            capabilities,
            config,
        }
    }

    /// Decode an original and apply its EXIF orientation.
    pub fn decode_oriented(data: &[u8]) -> ProcessingResult<DynamicImage> {
        let img = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| ProcessingError::SourceUnreadable(e.to_string()))?
            .decode()
            .map_err(|e| ProcessingError::SourceUnreadable(e.to_string()))?;
        Ok(ImageOrientation::apply_exif_orientation(img, data))
    }

    #[tracing::instrument(skip(self, original), fields(size_bytes = original.len()))]
    pub async fn generate(
        &self,
        asset_id: &AssetId,
        version: u32,
        original: Bytes,
    ) -> ProcessingResult<ImageDerivatives> {
        let start = Instant::now();
        let compute_digests = original.len() as u64 <= self.config.digest_max_source_bytes;

        let img = tokio::task::spawn_blocking(move || Self::decode_oriented(&original)).await??;
        let img = Arc::new(img);
        let (width, height) = img.dimensions();

        let digests = if compute_digests {
            let img = img.clone();
            let (visual, content) = tokio::task::spawn_blocking(move || {
                (digest::visual_digest(&img), digest::content_digest(&img))
            })
            .await?;
            (visual, Some(content))
        } else {
            tracing::info!(asset_id = %asset_id, "Original exceeds digest size limit, skipping digests");
            (None, None)
        };

        let plan = planner::plan(MediaKind::Image, Some(width), Some(height));
        let rungs = join_all(plan.into_iter().map(|spec| self.encode_rung(img.clone(), spec))).await;

        let mut thumbnail = None;
        let mut blur_placeholder = None;
        let mut ladder = Vec::new();
        let mut produced_rungs = 0usize;

        for rung in rungs {
            let rung = match rung {
                Ok(rung) => rung,
                Err(e) => {
                    tracing::warn!(asset_id = %asset_id, error = %e, "Rendition task failed");
                    continue;
                }
            };
            let renditions = self.persist_rung(asset_id, version, &rung).await;
            if renditions.is_empty() {
                continue;
            }

            match rung.spec.role {
                RenditionRole::Thumbnail => thumbnail = renditions.into_iter().next(),
                RenditionRole::BlurPlaceholder => {
                    blur_placeholder = renditions.first().cloned();
                    ladder.push(ladder_entry(&rung, renditions));
                }
                RenditionRole::Ladder => {
                    produced_rungs += 1;
                    ladder.push(ladder_entry(&rung, renditions));
                }
                _ => {}
            }
        }

        if produced_rungs == 0 {
            return Err(ProcessingError::NothingProduced(format!(
                "no ladder rung could be encoded for {}",
                asset_id
            )));
        }

        tracing::info!(
            asset_id = %asset_id,
            version = version,
            width = width,
            height = height,
            rungs = produced_rungs,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image derivatives generated"
        );

        Ok(ImageDerivatives {
            width,
            height,
            thumbnail,
            blur_placeholder,
            visual_digest: digests.0,
            content_digest: digests.1,
            ladder,
        })
    }

    /// Resize once for the rung, then encode each resolved format in turn.
    async fn encode_rung(&self, img: Arc<DynamicImage>, spec: RenditionSpec) -> ProcessingResult<EncodedRung> {
        let (jpeg_quality, requested) = match &spec.quality {
            QualityParams::Image {
                jpeg_quality,
                formats,
            } => (*jpeg_quality, formats.clone()),
            _ => (0, Vec::new()),
        };
        let formats = self.capabilities.resolve_all(&requested);
        let encoder = self.encoder.clone();

        tokio::task::spawn_blocking(move || {
            let resized = resize_to_fit(&img, spec.width, spec.height);
            let (width, height) = resized.dimensions();
            let outputs = formats
                .into_iter()
                .map(|format| {
                    let quality = quality_for_format(jpeg_quality, format);
                    let result = catch_unwind(AssertUnwindSafe(|| encoder.encode(&resized, format, quality)))
                        .unwrap_or_else(|_| Err(ProcessingError::encode(format, "encoder panicked")));
                    (format, result)
                })
                .collect();
            EncodedRung {
                spec,
                width,
                height,
                outputs,
            }
        })
        .await
        .map_err(ProcessingError::from)
    }

    async fn persist_rung(&self, asset_id: &AssetId, version: u32, rung: &EncodedRung) -> Vec<Rendition> {
        let mut renditions = Vec::new();
        for (format, output) in &rung.outputs {
            let data = match output {
                Ok(data) => data.clone(),
                Err(e) => {
                    tracing::warn!(
                        asset_id = %asset_id,
                        label = %rung.spec.label,
                        format = %format,
                        error = %e,
                        "Rendition encode failed, omitting format"
                    );
                    continue;
                }
            };

            let name = format!("{}.{}", rung.spec.label, format.extension());
            let key = keys::derivative_key(asset_id, version, &name);
            let size_bytes = data.len();
            if let Err(e) = self
                .store
                .put(&key, data, format.mime_type(), CacheDirective::Immutable)
                .await
            {
                tracing::warn!(
                    asset_id = %asset_id,
                    key = %key,
                    error = %e,
                    "Failed to store rendition, omitting format"
                );
                continue;
            }
            tracing::debug!(key = %key, size_bytes = size_bytes, "Rendition stored");

            renditions.push(Rendition {
                label: rung.spec.label.clone(),
                width: rung.width,
                height: rung.height,
                format: format.to_string(),
                url: self.store.public_url(&key),
                key,
                bitrate_kbps: None,
            });
        }
        renditions
    }
}

fn ladder_entry(rung: &EncodedRung, renditions: Vec<Rendition>) -> LadderEntry {
    let mut formats = FormatUrls::default();
    let mut best: Option<(u8, String)> = None;
    for rendition in &renditions {
        if let Some(format) = ImageFormat::parse(&rendition.format) {
            formats.set(format, rendition.url.clone());
            if best.as_ref().map_or(true, |(p, _)| format.preference() > *p) {
                best = Some((format.preference(), rendition.url.clone()));
            }
        }
    }

    LadderEntry {
        label: rung.spec.label.clone(),
        url: best.map(|(_, url)| url).unwrap_or_default(),
        width: rung.width,
        height: rung.height,
        formats,
        renditions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::codec::CodecEncoder;
    use ghostmaker_storage::MemoryStorage;
    use image::{Rgba, RgbaImage};

    /// Writes a tagged placeholder instead of real bitstreams; fails on request.
    struct StubEncoder {
        fail: Option<(ImageFormat, u32)>,
    }

    impl ImageEncoder for StubEncoder {
        fn encode(&self, img: &DynamicImage, format: ImageFormat, _quality: u8) -> ProcessingResult<Bytes> {
            if self.fail == Some((format, img.width())) {
                return Err(ProcessingError::encode(format, "injected failure"));
            }
            Ok(Bytes::from(format!("{}:{}x{}", format, img.width(), img.height())))
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 100, 255])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(buf)
    }

    fn generator(
        store: Arc<MemoryStorage>,
        encoder: Arc<dyn ImageEncoder>,
        available: &[ImageFormat],
    ) -> ImageDerivativeGenerator {
        ImageDerivativeGenerator::new(
            store,
            encoder,
            Arc::new(CodecCapabilities::with_available(available)),
            ImageConfig::default(),
        )
    }

    fn labels(derivatives: &ImageDerivatives) -> Vec<&str> {
        derivatives.ladder.iter().map(|e| e.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_large_jpeg_produces_full_ladder() {
        let store = Arc::new(MemoryStorage::default());
        let gen = generator(
            store.clone(),
            Arc::new(StubEncoder { fail: None }),
            &[ImageFormat::WebP, ImageFormat::Avif],
        );

        let out = gen
            .generate(&AssetId::new("p", "m"), 1, png(4000, 3000))
            .await
            .unwrap();

        assert_eq!((out.width, out.height), (4000, 3000));
        assert_eq!(
            labels(&out),
            vec!["blur_placeholder", "320w", "640w", "960w", "1280w", "1920w"]
        );
        for entry in &out.ladder {
            assert!(entry.width <= 1920);
            assert!(entry.formats.jpg.is_some(), "{} has no jpg", entry.label);
        }
        let top = out.ladder.last().unwrap();
        assert_eq!((top.width, top.height), (1920, 1440));
        assert_eq!(top.url, top.formats.avif.clone().unwrap());

        let thumb = out.thumbnail.unwrap();
        assert_eq!((thumb.width, thumb.height), (300, 225));
        assert_eq!(thumb.key, "projects/p/media/m/v1/thumb.jpg");
        assert!(store.object(&thumb.key).await.is_some());
        assert_eq!(out.blur_placeholder.unwrap().width, 20);
        assert_eq!(out.visual_digest.unwrap().len(), 28);
        assert_eq!(out.content_digest.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_small_source_is_never_upscaled() {
        let store = Arc::new(MemoryStorage::default());
        let gen = generator(store, Arc::new(CodecEncoder), &[ImageFormat::WebP]);

        let out = gen
            .generate(&AssetId::new("p", "small"), 1, png(200, 200))
            .await
            .unwrap();

        assert_eq!(out.ladder.len(), 6);
        for entry in out.ladder.iter().filter(|e| e.label.ends_with('w')) {
            assert_eq!((entry.width, entry.height), (200, 200), "{}", entry.label);
            assert!(entry.formats.jpg.is_some());
            assert!(entry.formats.webp.is_some());
            assert!(entry.formats.avif.is_none());
        }
        assert_eq!(out.thumbnail.unwrap().width, 200);
    }

    #[tokio::test]
    async fn test_single_format_failure_is_contained() {
        let store = Arc::new(MemoryStorage::default());
        let gen = generator(
            store,
            Arc::new(StubEncoder {
                fail: Some((ImageFormat::WebP, 640)),
            }),
            &[ImageFormat::WebP],
        );

        let out = gen
            .generate(&AssetId::new("p", "m"), 1, png(1600, 1200))
            .await
            .unwrap();

        let rung = out.ladder.iter().find(|e| e.label == "640w").unwrap();
        assert!(rung.formats.jpg.is_some());
        assert!(rung.formats.webp.is_none());
        assert_eq!(rung.url, rung.formats.jpg.clone().unwrap());

        let others = out.ladder.iter().filter(|e| e.label.ends_with('w') && e.label != "640w");
        for entry in others {
            assert!(entry.formats.webp.is_some(), "{} lost webp", entry.label);
        }
    }

    #[tokio::test]
    async fn test_heif_slot_filled_when_encoder_supports_it() {
        let store = Arc::new(MemoryStorage::default());
        let gen = generator(
            store.clone(),
            Arc::new(StubEncoder { fail: None }),
            &[ImageFormat::WebP, ImageFormat::Heif],
        );

        let out = gen
            .generate(&AssetId::new("p", "m"), 1, png(800, 600))
            .await
            .unwrap();

        let rung = out.ladder.iter().find(|e| e.label == "640w").unwrap();
        let heif = rung.formats.heif.clone().unwrap();
        assert!(heif.ends_with("/v1/640w.heic"));
        assert!(rung.formats.avif.is_none());
        assert_eq!(rung.url, heif);
        assert!(store.object("projects/p/media/m/v1/640w.heic").await.is_some());
    }

    #[tokio::test]
    async fn test_default_capabilities_leave_heif_slot_empty() {
        let gen = generator(
            Arc::new(MemoryStorage::default()),
            Arc::new(StubEncoder { fail: None }),
            &[ImageFormat::WebP, ImageFormat::Avif],
        );
        let out = gen
            .generate(&AssetId::new("p", "m"), 1, png(400, 300))
            .await
            .unwrap();
        for entry in out.ladder.iter().filter(|e| e.label.ends_with('w')) {
            assert!(entry.formats.heif.is_none());
            // jpg, webp and avif; the heif request collapses onto jpg
            assert_eq!(entry.renditions.len(), 3, "{}", entry.label);
        }
    }

    #[tokio::test]
    async fn test_corrupt_source_is_unreadable() {
        let gen = generator(
            Arc::new(MemoryStorage::default()),
            Arc::new(StubEncoder { fail: None }),
            &[],
        );
        let err = gen
            .generate(&AssetId::new("p", "m"), 1, Bytes::from_static(b"definitely not an image"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::SourceUnreadable(_)));
    }

    #[tokio::test]
    async fn test_digests_skipped_above_limit() {
        let config = ImageConfig {
            digest_max_source_bytes: 10,
            ..ImageConfig::default()
        };
        let gen = ImageDerivativeGenerator::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(StubEncoder { fail: None }),
            Arc::new(CodecCapabilities::with_available(&[])),
            config,
        );
        let out = gen
            .generate(&AssetId::new("p", "m"), 1, png(64, 64))
            .await
            .unwrap();
        assert!(out.visual_digest.is_none());
        assert!(out.content_digest.is_none());
        assert!(!out.ladder.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_cover_is_first_wide_rung() {
        let gen = generator(
            Arc::new(MemoryStorage::default()),
            Arc::new(StubEncoder { fail: None }),
            &[],
        );
        let out = gen
            .generate(&AssetId::new("p", "m"), 3, png(1000, 500))
            .await
            .unwrap();
        let manifest = out.into_manifest(3);
        let cover = manifest.cover.clone().unwrap();
        assert_eq!(cover.label, "640w");
        assert!(cover.key.contains("/v3/"));
        assert_eq!(manifest.renditions().iter().filter(|r| r.label == "blur_placeholder").count(), 1);
    }
}
