//! Video derivative generation
//!
//! Local mode encodes with a `VideoTranscoder` inside a temp directory and uploads the
//! results. Remote mode only assembles what an external job already wrote under the version
//! prefix. Both end with the master playlist, written after every rendition has settled.

use bytes::Bytes;
use futures::future::join_all;
use ghostmaker_core::config::VideoConfig;
use ghostmaker_core::keys;
use ghostmaker_core::models::{AssetId, HlsManifest, Manifest, MediaKind, Rendition};
use ghostmaker_storage::{BlobStore, CacheDirective};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use super::ffmpeg::{VideoTarget, VideoTranscoder, HLS_PLAYLIST_NAME};
use super::probe::VideoProbe;
use super::playlist::{
    build_master_playlist, HLS_DIR, MASTER_PLAYLIST_NAME, PLAYLIST_CONTENT_TYPE,
    SEGMENT_CONTENT_TYPE,
};
use crate::cover::select_cover_candidate;
use crate::error::{ProcessingError, ProcessingResult};
use crate::image::resize::fit_inside;
use crate::planner::{self, QualityParams, RenditionRole, RenditionSpec};

const DOWNLOADS_DIR: &str = "downloads";
const POSTER_TIMESTAMP_SECS: f64 = 1.0;
pub const POSTER_FILE: &str = "poster.jpg";

/// Grab the poster one second in, or the first frame for clips no longer than that.
fn poster_timestamp(duration: f64) -> f64 {
    if duration > POSTER_TIMESTAMP_SECS {
        POSTER_TIMESTAMP_SECS
    } else {
        0.0
    }
}

/// Everything produced for one video version.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDerivatives {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub poster: Option<Rendition>,
    pub hls: Option<HlsManifest>,
    pub downloads: Vec<Rendition>,
}

impl VideoDerivatives {
    pub fn into_manifest(self, version: u32) -> Manifest {
        let mut manifest = Manifest::new(MediaKind::Video, version);
        manifest.cover = select_cover_candidate(self.poster.as_slice());
        manifest.width = self.width;
        manifest.height = self.height;
        manifest.poster = self.poster;
        manifest.hls = self.hls;
        manifest.downloads = self.downloads;
        manifest
    }
}

pub fn video_content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

fn extension_of(key: &str) -> &str {
    key.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin")
}

/// Output size for a box: the source fitted inside it with even edges, or the box itself
/// when the source size is unknown.
fn output_dims(source: Option<(u32, u32)>, box_w: u32, box_h: u32) -> (u32, u32) {
    match source {
        Some((w, h)) => {
            let (w, h) = fit_inside(w, h, box_w, box_h);
            ((w & !1).max(2), (h & !1).max(2))
        }
        None => (box_w, box_h),
    }
}

fn target_for(spec: &RenditionSpec) -> Option<VideoTarget> {
    match spec.quality {
        QualityParams::Video {
            video_kbps,
            audio_kbps,
        } => Some(VideoTarget {
            label: spec.label.clone(),
            width: spec.width,
            height: spec.height,
            video_kbps,
            audio_kbps,
        }),
        _ => None,
    }
}

pub struct VideoDerivativeGenerator {
    store: Arc<dyn BlobStore>,
    transcoder: Arc<dyn VideoTranscoder>,
    config: VideoConfig,
}

impl VideoDerivativeGenerator {
    pub fn new(store: Arc<dyn BlobStore>, transcoder: Arc<dyn VideoTranscoder>, config: VideoConfig) -> Self {
        Self {
            store,
            transcoder,
            config,
        }
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    fn key(asset_id: &AssetId, version: u32, name: &str) -> String {
        keys::derivative_key(asset_id, version, name)
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str, cache: CacheDirective) -> ProcessingResult<String> {
        let size_bytes = data.len();
        self.store.put(key, data, content_type, cache).await?;
        tracing::debug!(key = %key, size_bytes = size_bytes, "Video derivative stored");
        Ok(self.store.public_url(key))
    }

    async fn stage_input(&self, ext: &str, original: &Bytes) -> ProcessingResult<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new()?;
        let input_path = temp_dir.path().join(format!("input.{}", ext));
        tokio::fs::write(&input_path, original).await?;
        Ok((temp_dir, input_path))
    }

    async fn probe_staged(&self, input: &Path) -> ProcessingResult<VideoProbe> {
        self.transcoder.probe(input).await.map_err(|e| match e {
            ProcessingError::SourceUnreadable(msg) => ProcessingError::SourceUnreadable(msg),
            other => ProcessingError::SourceUnreadable(other.to_string()),
        })
    }

    /// Read the source's dimensions and duration without encoding anything. Used before
    /// handing the asset to an external transcode job.
    #[tracing::instrument(skip(self, original), fields(size_bytes = original.len()))]
    pub async fn probe_source(&self, original_key: &str, original: &Bytes) -> ProcessingResult<VideoProbe> {
        let ext = extension_of(original_key).to_ascii_lowercase();
        let (_temp_dir, input_path) = self.stage_input(&ext, original).await?;
        self.probe_staged(&input_path).await
    }

    /// Encode all planned video renditions locally.
    #[tracing::instrument(skip(self, original), fields(size_bytes = original.len()))]
    pub async fn generate(
        &self,
        asset_id: &AssetId,
        version: u32,
        original_key: &str,
        original: Bytes,
    ) -> ProcessingResult<VideoDerivatives> {
        let start = Instant::now();
        let ext = extension_of(original_key).to_ascii_lowercase();

        let (temp_dir, input_path) = self.stage_input(&ext, &original).await?;
        let probe = self.probe_staged(&input_path).await?;
        let source = Some((probe.width, probe.height));
        let plan = planner::plan(MediaKind::Video, Some(probe.width), Some(probe.height));

        let poster_spec = plan.iter().find(|s| s.role == RenditionRole::Poster);
        let hls_specs: Vec<&RenditionSpec> = plan.iter().filter(|s| s.role == RenditionRole::Hls).collect();
        let download_spec = plan.iter().find(|s| s.role == RenditionRole::Download);

        let poster_fut = async {
            match poster_spec {
                Some(spec) => {
                    let timestamp = poster_timestamp(probe.duration);
                    self.produce_poster(asset_id, version, &input_path, temp_dir.path(), spec, timestamp, source)
                        .await
                }
                None => None,
            }
        };
        let hls_fut = join_all(
            hls_specs
                .iter()
                .map(|spec| self.produce_hls(asset_id, version, &input_path, temp_dir.path(), spec, source)),
        );
        let mp4_fut = async {
            match download_spec {
                Some(spec) => self.produce_mp4(asset_id, version, &input_path, temp_dir.path(), spec, source).await,
                None => None,
            }
        };

        let (poster, hls_results, mp4) = tokio::join!(poster_fut, hls_fut, mp4_fut);
        let hls_renditions: Vec<Rendition> = hls_results.into_iter().flatten().collect();

        let hls = if hls_renditions.is_empty() {
            None
        } else {
            Some(self.write_master(asset_id, version, hls_renditions).await?)
        };

        let mut downloads: Vec<Rendition> = mp4.into_iter().collect();
        if hls.is_none() && downloads.is_empty() {
            return Err(ProcessingError::NothingProduced(format!(
                "every video encode failed for {}",
                asset_id
            )));
        }

        let original_copy = self
            .copy_original(asset_id, version, &ext, original, source)
            .await?;
        downloads.push(original_copy);

        tracing::info!(
            asset_id = %asset_id,
            version = version,
            hls_renditions = hls.as_ref().map_or(0, |h| h.renditions.len()),
            downloads = downloads.len(),
            poster = poster.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video derivatives generated"
        );

        Ok(VideoDerivatives {
            width: Some(probe.width),
            height: Some(probe.height),
            duration: Some(probe.duration),
            poster,
            hls,
            downloads,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn produce_poster(
        &self,
        asset_id: &AssetId,
        version: u32,
        input: &Path,
        work_dir: &Path,
        spec: &RenditionSpec,
        timestamp: f64,
        source: Option<(u32, u32)>,
    ) -> Option<Rendition> {
        let out_path = work_dir.join(POSTER_FILE);
        let result = async {
            self.transcoder
                .capture_frame(input, &out_path, timestamp, spec.width, spec.height)
                .await?;
            let data = tokio::fs::read(&out_path).await?;
            let key = Self::key(asset_id, version, POSTER_FILE);
            let url = self
                .put(&key, Bytes::from(data), "image/jpeg", CacheDirective::Immutable)
                .await?;
            Ok::<_, ProcessingError>((key, url))
        }
        .await;

        match result {
            Ok((key, url)) => {
                let (width, height) = output_dims(source, spec.width, spec.height);
                Some(Rendition {
                    label: spec.label.clone(),
                    width,
                    height,
                    format: "jpeg".to_string(),
                    key,
                    url,
                    bitrate_kbps: None,
                })
            }
            Err(e) => {
                tracing::warn!(asset_id = %asset_id, error = %e, "Poster capture failed");
                None
            }
        }
    }

    async fn produce_hls(
        &self,
        asset_id: &AssetId,
        version: u32,
        input: &Path,
        work_dir: &Path,
        spec: &RenditionSpec,
        source: Option<(u32, u32)>,
    ) -> Option<Rendition> {
        let target = target_for(spec)?;
        let out_dir = work_dir.join(HLS_DIR).join(&target.label);

        let result = async {
            self.transcoder.encode_hls(input, &out_dir, &target).await?;
            self.upload_hls_dir(asset_id, version, &target.label, &out_dir).await
        }
        .await;

        match result {
            Ok((key, url)) => {
                let (width, height) = output_dims(source, target.width, target.height);
                Some(Rendition {
                    label: target.label,
                    width,
                    height,
                    format: "hls".to_string(),
                    key,
                    url,
                    bitrate_kbps: Some(target.video_kbps),
                })
            }
            Err(e) => {
                tracing::warn!(
                    asset_id = %asset_id,
                    label = %target.label,
                    error = %e,
                    "HLS rendition failed, omitting"
                );
                None
            }
        }
    }

    /// Upload segments before the variant playlist so the playlist never references a missing
    /// segment. Returns the playlist key and URL.
    async fn upload_hls_dir(
        &self,
        asset_id: &AssetId,
        version: u32,
        label: &str,
        dir: &Path,
    ) -> ProcessingResult<(String, String)> {
        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ts") {
                segments.push(path);
            }
        }
        segments.sort();

        let playlist_path = dir.join(HLS_PLAYLIST_NAME);
        if !tokio::fs::try_exists(&playlist_path).await? {
            return Err(ProcessingError::Transcode(format!(
                "{} produced no playlist",
                label
            )));
        }

        for segment in &segments {
            let name = segment
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ProcessingError::Transcode("invalid segment file name".to_string()))?;
            let key = Self::key(asset_id, version, &format!("{}/{}/{}", HLS_DIR, label, name));
            let data = tokio::fs::read(segment).await?;
            self.put(&key, Bytes::from(data), SEGMENT_CONTENT_TYPE, CacheDirective::Immutable)
                .await?;
        }

        let key = Self::key(
            asset_id,
            version,
            &format!("{}/{}/{}", HLS_DIR, label, HLS_PLAYLIST_NAME),
        );
        let data = tokio::fs::read(&playlist_path).await?;
        let url = self
            .put(&key, Bytes::from(data), PLAYLIST_CONTENT_TYPE, CacheDirective::Immutable)
            .await?;
        tracing::info!(asset_id = %asset_id, label = %label, segments = segments.len(), "HLS rendition uploaded");
        Ok((key, url))
    }

    async fn produce_mp4(
        &self,
        asset_id: &AssetId,
        version: u32,
        input: &Path,
        work_dir: &Path,
        spec: &RenditionSpec,
        source: Option<(u32, u32)>,
    ) -> Option<Rendition> {
        let target = target_for(spec)?;
        let name = format!("{}.mp4", target.label);
        let out_path = work_dir.join(&name);

        let result = async {
            self.transcoder.encode_mp4(input, &out_path, &target).await?;
            let data = tokio::fs::read(&out_path).await?;
            let key = Self::key(asset_id, version, &format!("{}/{}", DOWNLOADS_DIR, name));
            let url = self
                .put(&key, Bytes::from(data), "video/mp4", CacheDirective::Download)
                .await?;
            Ok::<_, ProcessingError>((key, url))
        }
        .await;

        match result {
            Ok((key, url)) => {
                let (width, height) = output_dims(source, target.width, target.height);
                Some(Rendition {
                    label: target.label,
                    width,
                    height,
                    format: "mp4".to_string(),
                    key,
                    url,
                    bitrate_kbps: Some(target.video_kbps),
                })
            }
            Err(e) => {
                tracing::warn!(asset_id = %asset_id, label = %target.label, error = %e, "MP4 download encode failed");
                None
            }
        }
    }

    async fn copy_original(
        &self,
        asset_id: &AssetId,
        version: u32,
        ext: &str,
        original: Bytes,
        source: Option<(u32, u32)>,
    ) -> ProcessingResult<Rendition> {
        let key = Self::key(
            asset_id,
            version,
            &format!("{}/{}.{}", DOWNLOADS_DIR, planner::ORIGINAL_LABEL, ext),
        );
        let url = self
            .put(&key, original, video_content_type(ext), CacheDirective::Download)
            .await?;
        let (width, height) = source.unwrap_or((0, 0));
        Ok(Rendition {
            label: planner::ORIGINAL_LABEL.to_string(),
            width,
            height,
            format: ext.to_string(),
            key,
            url,
            bitrate_kbps: None,
        })
    }

    async fn write_master(
        &self,
        asset_id: &AssetId,
        version: u32,
        mut renditions: Vec<Rendition>,
    ) -> ProcessingResult<HlsManifest> {
        renditions.sort_by_key(|r| r.bitrate_kbps.unwrap_or(0));
        let playlist = build_master_playlist(&renditions);
        let key = Self::key(asset_id, version, &format!("{}/{}", HLS_DIR, MASTER_PLAYLIST_NAME));
        let master = self
            .put(&key, Bytes::from(playlist), PLAYLIST_CONTENT_TYPE, CacheDirective::Immutable)
            .await?;
        Ok(HlsManifest { master, renditions })
    }

    /// Build derivatives from the outputs an external transcode job wrote under the version
    /// prefix. Renditions the job did not produce are left out.
    #[tracing::instrument(skip(self))]
    pub async fn assemble_remote(
        &self,
        asset_id: &AssetId,
        version: u32,
        original_key: &str,
        source: Option<(u32, u32)>,
    ) -> ProcessingResult<VideoDerivatives> {
        let prefix = format!("{}/", keys::derivative_prefix(asset_id, version));
        let existing = self.store.list(&prefix).await?;
        let has = |name: &str| existing.iter().any(|k| k == &Self::key(asset_id, version, name));

        let plan = planner::plan(MediaKind::Video, source.map(|s| s.0), source.map(|s| s.1));
        let mut poster = None;
        let mut hls_renditions = Vec::new();
        let mut downloads = Vec::new();

        for spec in &plan {
            let (width, height) = output_dims(source, spec.width, spec.height);
            let rendition = |name: String, format: &str| {
                let key = Self::key(asset_id, version, &name);
                Rendition {
                    label: spec.label.clone(),
                    width,
                    height,
                    format: format.to_string(),
                    url: self.store.public_url(&key),
                    key,
                    bitrate_kbps: spec.video_kbps(),
                }
            };

            match spec.role {
                RenditionRole::Poster => {
                    if has(POSTER_FILE) {
                        poster = Some(rendition(POSTER_FILE.to_string(), "jpeg"));
                    } else {
                        tracing::warn!(asset_id = %asset_id, "Transcode job produced no poster");
                    }
                }
                RenditionRole::Hls => {
                    let name = format!("{}/{}/{}", HLS_DIR, spec.label, HLS_PLAYLIST_NAME);
                    if has(&name) {
                        hls_renditions.push(rendition(name, "hls"));
                    } else {
                        tracing::warn!(asset_id = %asset_id, label = %spec.label, "Transcode job produced no playlist for rendition");
                    }
                }
                RenditionRole::Download => {
                    let name = format!("{}/{}.mp4", DOWNLOADS_DIR, spec.label);
                    if has(&name) {
                        downloads.push(rendition(name, "mp4"));
                    }
                }
                _ => {}
            }
        }

        let hls = if hls_renditions.is_empty() {
            None
        } else {
            Some(self.write_master(asset_id, version, hls_renditions).await?)
        };
        if hls.is_none() && downloads.is_empty() {
            return Err(ProcessingError::NothingProduced(
                "transcode job produced no outputs".to_string(),
            ));
        }

        let ext = extension_of(original_key).to_ascii_lowercase();
        let original = self.store.get(original_key).await?;
        downloads.push(self.copy_original(asset_id, version, &ext, original, source).await?);

        Ok(VideoDerivatives {
            width: source.map(|s| s.0),
            height: source.map(|s| s.1),
            duration: None,
            poster,
            hls,
            downloads,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteContainer {
    /// A single JPEG frame.
    FrameCapture,
    /// `{path}/index.m3u8` plus its segments.
    Hls,
    Mp4,
}

/// One output an external transcode job is asked to write, relative to the version prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub container: RemoteContainer,
    pub path: String,
    /// Bounding box and bitrates. Bitrates are zero for frame captures.
    pub target: VideoTarget,
    pub frame_offset_ms: Option<u32>,
}

/// Planned outputs for an external transcode job, laid out the way `assemble_remote` reads
/// them back.
pub fn remote_outputs(source: Option<(u32, u32)>, duration: Option<f64>) -> Vec<RemoteOutput> {
    planner::plan(MediaKind::Video, source.map(|s| s.0), source.map(|s| s.1))
        .iter()
        .filter_map(|spec| match spec.role {
            RenditionRole::Poster => {
                let offset = poster_timestamp(duration.unwrap_or(0.0));
                Some(RemoteOutput {
                    container: RemoteContainer::FrameCapture,
                    path: POSTER_FILE.to_string(),
                    target: VideoTarget {
                        label: spec.label.clone(),
                        width: spec.width,
                        height: spec.height,
                        video_kbps: 0,
                        audio_kbps: 0,
                    },
                    frame_offset_ms: Some((offset * 1000.0) as u32),
                })
            }
            RenditionRole::Hls => target_for(spec).map(|target| RemoteOutput {
                container: RemoteContainer::Hls,
                path: format!("{}/{}", HLS_DIR, spec.label),
                target,
                frame_offset_ms: None,
            }),
            RenditionRole::Download => target_for(spec).map(|target| RemoteOutput {
                container: RemoteContainer::Mp4,
                path: format!("{}/{}.mp4", DOWNLOADS_DIR, spec.label),
                target,
                frame_offset_ms: None,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ghostmaker_storage::MemoryStorage;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Writes small fake outputs instead of invoking ffmpeg.
    #[derive(Default)]
    struct FakeTranscoder {
        unreadable: bool,
        fail_labels: HashSet<String>,
        fail_mp4: bool,
        frame_timestamps: Mutex<Vec<f64>>,
        duration: f64,
    }

    impl FakeTranscoder {
        fn new() -> Self {
            Self {
                duration: 10.0,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl VideoTranscoder for FakeTranscoder {
        async fn probe(&self, _input: &Path) -> ProcessingResult<VideoProbe> {
            if self.unreadable {
                return Err(ProcessingError::SourceUnreadable("moov atom not found".to_string()));
            }
            Ok(VideoProbe {
                duration: self.duration,
                width: 1920,
                height: 1080,
                codec: "h264".to_string(),
                bitrate: None,
                framerate: Some(30.0),
            })
        }

        async fn capture_frame(&self, _input: &Path, output: &Path, ts: f64, _w: u32, _h: u32) -> ProcessingResult<()> {
            self.frame_timestamps.lock().unwrap().push(ts);
            tokio::fs::write(output, b"jpeg").await?;
            Ok(())
        }

        async fn encode_hls(&self, _input: &Path, output_dir: &Path, target: &VideoTarget) -> ProcessingResult<()> {
            if self.fail_labels.contains(&target.label) {
                return Err(ProcessingError::Transcode("encoder crashed".to_string()));
            }
            tokio::fs::create_dir_all(output_dir).await?;
            tokio::fs::write(output_dir.join("segment_000.ts"), b"ts0").await?;
            tokio::fs::write(output_dir.join("segment_001.ts"), b"ts1").await?;
            tokio::fs::write(output_dir.join(HLS_PLAYLIST_NAME), b"#EXTM3U\n").await?;
            Ok(())
        }

        async fn encode_mp4(&self, _input: &Path, output: &Path, _target: &VideoTarget) -> ProcessingResult<()> {
            if self.fail_mp4 {
                return Err(ProcessingError::Transcode("mp4 failed".to_string()));
            }
            tokio::fs::write(output, b"mp4").await?;
            Ok(())
        }
    }

    fn generator(store: Arc<MemoryStorage>, transcoder: FakeTranscoder) -> VideoDerivativeGenerator {
        VideoDerivativeGenerator::new(store, Arc::new(transcoder), VideoConfig::default())
    }

    const ORIGINAL: &str = "projects/p/media/m/clip.MOV";

    #[tokio::test]
    async fn test_generate_full_video_set() {
        let store = Arc::new(MemoryStorage::default());
        let gen = generator(store.clone(), FakeTranscoder::new());

        let out = gen
            .generate(&AssetId::new("p", "m"), 1, ORIGINAL, Bytes::from_static(b"movie"))
            .await
            .unwrap();

        let hls = out.hls.unwrap();
        let labels: Vec<&str> = hls.renditions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["480p", "720p", "1080p"]);
        assert_eq!((hls.renditions[0].width, hls.renditions[0].height), (640, 360));
        assert!(store.object("projects/p/media/m/v1/hls/720p/segment_001.ts").await.is_some());

        let master = store.object("projects/p/media/m/v1/hls/master.m3u8").await.unwrap();
        assert_eq!(master.content_type, PLAYLIST_CONTENT_TYPE);
        let text = String::from_utf8(master.data.to_vec()).unwrap();
        assert_eq!(text.matches("#EXT-X-STREAM-INF").count(), 3);

        let download_keys: Vec<&str> = out.downloads.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            download_keys,
            vec![
                "projects/p/media/m/v1/downloads/1080p.mp4",
                "projects/p/media/m/v1/downloads/original.mov"
            ]
        );
        let original = store
            .object("projects/p/media/m/v1/downloads/original.mov")
            .await
            .unwrap();
        assert_eq!(original.data, Bytes::from_static(b"movie"));
        assert_eq!(original.cache, CacheDirective::Download);
        assert_eq!(original.content_type, "video/quicktime");

        assert_eq!(out.poster.unwrap().key, "projects/p/media/m/v1/poster.jpg");
    }

    #[tokio::test]
    async fn test_failed_rendition_is_omitted_from_master() {
        let store = Arc::new(MemoryStorage::default());
        let mut transcoder = FakeTranscoder::new();
        transcoder.fail_labels.insert("720p".to_string());
        let gen = generator(store.clone(), transcoder);

        let out = gen
            .generate(&AssetId::new("p", "m"), 1, ORIGINAL, Bytes::from_static(b"movie"))
            .await
            .unwrap();

        let labels: Vec<String> = out.hls.unwrap().renditions.into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["480p", "1080p"]);
        let master = store.object("projects/p/media/m/v1/hls/master.m3u8").await.unwrap();
        let text = String::from_utf8(master.data.to_vec()).unwrap();
        assert!(!text.contains("720p"));
        assert_eq!(out.downloads.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_video_is_unreadable() {
        let transcoder = FakeTranscoder {
            unreadable: true,
            ..FakeTranscoder::new()
        };
        let gen = generator(Arc::new(MemoryStorage::default()), transcoder);
        let err = gen
            .generate(&AssetId::new("p", "m"), 1, ORIGINAL, Bytes::from_static(b"garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::SourceUnreadable(_)));
    }

    #[tokio::test]
    async fn test_all_encodes_failing_produces_nothing() {
        let mut transcoder = FakeTranscoder::new();
        transcoder.fail_mp4 = true;
        for label in ["480p", "720p", "1080p"] {
            transcoder.fail_labels.insert(label.to_string());
        }
        let gen = generator(Arc::new(MemoryStorage::default()), transcoder);
        let err = gen
            .generate(&AssetId::new("p", "m"), 1, ORIGINAL, Bytes::from_static(b"movie"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NothingProduced(_)));
    }

    #[tokio::test]
    async fn test_short_clip_poster_uses_first_frame() {
        let transcoder = Arc::new(FakeTranscoder {
            duration: 0.8,
            ..FakeTranscoder::new()
        });
        let gen = VideoDerivativeGenerator::new(
            Arc::new(MemoryStorage::default()),
            transcoder.clone(),
            VideoConfig::default(),
        );
        gen.generate(&AssetId::new("p", "m"), 1, ORIGINAL, Bytes::from_static(b"movie"))
            .await
            .unwrap();
        assert_eq!(*transcoder.frame_timestamps.lock().unwrap(), vec![0.0]);
    }

    #[tokio::test]
    async fn test_assemble_remote_outputs() {
        let store = Arc::new(MemoryStorage::default());
        let id = AssetId::new("p", "m");
        for name in ["hls/480p/index.m3u8", "hls/1080p/index.m3u8", "poster.jpg"] {
            store
                .put(
                    &keys::derivative_key(&id, 2, name),
                    Bytes::from_static(b"x"),
                    "application/octet-stream",
                    CacheDirective::Immutable,
                )
                .await
                .unwrap();
        }
        store
            .put(ORIGINAL, Bytes::from_static(b"movie"), "video/quicktime", CacheDirective::NoCache)
            .await
            .unwrap();

        let gen = generator(store.clone(), FakeTranscoder::new());
        let out = gen.assemble_remote(&id, 2, ORIGINAL, Some((1080, 1920))).await.unwrap();

        let hls = out.hls.unwrap();
        assert_eq!(hls.renditions.len(), 2);
        assert_eq!((hls.renditions[0].width, hls.renditions[0].height), (360, 640));
        assert!(store.object("projects/p/media/m/v2/hls/master.m3u8").await.is_some());
        assert_eq!(out.downloads.len(), 1);
        assert_eq!(out.downloads[0].label, "original");
        assert!(out.poster.is_some());
    }

    #[tokio::test]
    async fn test_assemble_remote_without_outputs_fails() {
        let gen = generator(Arc::new(MemoryStorage::default()), FakeTranscoder::new());
        let err = gen
            .assemble_remote(&AssetId::new("p", "m"), 1, ORIGINAL, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NothingProduced(_)));
    }

    #[test]
    fn test_remote_outputs_cover_poster_hls_and_download() {
        let outputs = remote_outputs(Some((1920, 1080)), Some(10.0));
        let paths: Vec<&str> = outputs.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["poster.jpg", "hls/480p", "hls/720p", "hls/1080p", "downloads/1080p.mp4"]
        );
        assert_eq!(outputs[0].container, RemoteContainer::FrameCapture);
        assert_eq!(outputs[0].frame_offset_ms, Some(1000));
        assert_eq!(outputs[4].container, RemoteContainer::Mp4);
        assert_eq!((outputs[1].target.width, outputs[1].target.height), (640, 360));
        assert_eq!(outputs[3].target.video_kbps, 5000);
        assert!(outputs[1..].iter().all(|o| o.frame_offset_ms.is_none()));
    }

    #[test]
    fn test_remote_poster_for_short_clip_uses_first_frame() {
        let outputs = remote_outputs(Some((1920, 1080)), Some(0.5));
        assert_eq!(outputs[0].frame_offset_ms, Some(0));
    }

    #[tokio::test]
    async fn test_source_dimensions_read_without_encoding() {
        let gen = generator(Arc::new(MemoryStorage::default()), FakeTranscoder::new());
        let probe = gen
            .probe_source(ORIGINAL, &Bytes::from_static(b"movie"))
            .await
            .unwrap();
        assert_eq!((probe.width, probe.height), (1920, 1080));
        assert_eq!(probe.duration, 10.0);
    }

    #[tokio::test]
    async fn test_corrupt_source_rejected_before_encoding() {
        let transcoder = FakeTranscoder {
            unreadable: true,
            ..FakeTranscoder::new()
        };
        let gen = generator(Arc::new(MemoryStorage::default()), transcoder);
        let err = gen
            .probe_source(ORIGINAL, &Bytes::from_static(b"garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::SourceUnreadable(_)));
    }

    #[test]
    fn test_output_dims_are_even() {
        assert_eq!(output_dims(Some((641, 361)), 1280, 720), (640, 360));
        assert_eq!(output_dims(Some((1920, 1080)), 640, 360), (640, 360));
        assert_eq!(output_dims(None, 640, 360), (640, 360));
    }
}
