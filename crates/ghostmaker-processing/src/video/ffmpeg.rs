//! FFmpeg-backed transcoding
//!
//! Argument construction is kept in pure functions so the exact command lines can be
//! tested without an ffmpeg binary.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use super::probe::{parse_probe_output, probe_args, VideoProbe};
use crate::error::{ProcessingError, ProcessingResult};

pub const HLS_PLAYLIST_NAME: &str = "index.m3u8";
pub const HLS_SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// One video output to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTarget {
    pub label: String,
    /// Bounding box; the output keeps the source aspect ratio and never upscales.
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

/// Local encoding operations used by the video generator.
#[async_trait]
pub trait VideoTranscoder: Send + Sync {
    async fn probe(&self, input: &Path) -> ProcessingResult<VideoProbe>;

    /// Write a single JPEG frame taken at `timestamp` seconds, scaled inside the box.
    async fn capture_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp: f64,
        box_w: u32,
        box_h: u32,
    ) -> ProcessingResult<()>;

    /// Write `index.m3u8` and its segments into `output_dir`.
    async fn encode_hls(&self, input: &Path, output_dir: &Path, target: &VideoTarget) -> ProcessingResult<()>;

    async fn encode_mp4(&self, input: &Path, output: &Path, target: &VideoTarget) -> ProcessingResult<()>;
}

fn validate_tool_path(path: &str) -> ProcessingResult<()> {
    let safe = !path.is_empty()
        && !path.contains("..")
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'));
    if safe {
        Ok(())
    } else {
        Err(ProcessingError::Transcode(format!(
            "invalid tool path: {}",
            path
        )))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn scale_filter(box_w: u32, box_h: u32) -> String {
    format!(
        "scale=w='min({w},iw)':h='min({h},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
        w = box_w,
        h = box_h
    )
}

fn h264_args(target: &VideoTarget, segment_seconds: u32) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-profile:v".to_string(),
        "main".to_string(),
        "-vf".to_string(),
        scale_filter(target.width, target.height),
        "-b:v".to_string(),
        format!("{}k", target.video_kbps),
        "-maxrate".to_string(),
        format!("{}k", (target.video_kbps as f32 * 1.2) as u32),
        "-bufsize".to_string(),
        format!("{}k", target.video_kbps * 2),
        "-force_key_frames".to_string(),
        format!("expr:gte(t,n_forced*{})", segment_seconds),
        "-sc_threshold".to_string(),
        "0".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", target.audio_kbps),
        "-ac".to_string(),
        "2".to_string(),
        "-ar".to_string(),
        "48000".to_string(),
    ]
}

pub fn hls_args(input: &Path, output_dir: &Path, target: &VideoTarget, segment_seconds: u32) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
    args.extend(h264_args(target, segment_seconds));
    args.extend([
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        segment_seconds.to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_segment_filename".to_string(),
        path_arg(&output_dir.join(HLS_SEGMENT_PATTERN)),
        path_arg(&output_dir.join(HLS_PLAYLIST_NAME)),
    ]);
    args
}

pub fn mp4_args(input: &Path, output: &Path, target: &VideoTarget, segment_seconds: u32) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
    args.extend(h264_args(target, segment_seconds));
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]);
    args
}

pub fn frame_args(input: &Path, output: &Path, timestamp: f64, box_w: u32, box_h: u32) -> Vec<String> {
    vec![
        "-ss".to_string(),
        format!("{:.3}", timestamp),
        "-i".to_string(),
        path_arg(input),
        "-vframes".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        scale_filter(box_w, box_h),
        "-q:v".to_string(),
        "2".to_string(),
        "-y".to_string(),
        path_arg(output),
    ]
}

/// Shells out to `ffmpeg` / `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    segment_seconds: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: String, ffprobe_path: String, segment_seconds: u32) -> ProcessingResult<Self> {
        validate_tool_path(&ffmpeg_path)?;
        validate_tool_path(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            segment_seconds,
        })
    }

    async fn run_ffmpeg(&self, operation: &str, args: &[String]) -> ProcessingResult<()> {
        let start = Instant::now();
        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ProcessingError::Transcode(format!("failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(ProcessingError::Transcode(format!(
                "ffmpeg {} failed: {}",
                operation, tail
            )));
        }

        tracing::debug!(
            ffmpeg.operation = operation,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "ffmpeg completed"
        );
        Ok(())
    }
}

#[async_trait]
impl VideoTranscoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self), fields(process.executable.path = %self.ffprobe_path, ffmpeg.operation = "probe"))]
    async fn probe(&self, input: &Path) -> ProcessingResult<VideoProbe> {
        let output = Command::new(&self.ffprobe_path)
            .args(probe_args())
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessingError::Transcode(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ProcessingError::SourceUnreadable(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe = parse_probe_output(&output.stdout)?;
        tracing::info!(
            video_duration = probe.duration,
            width = probe.width,
            height = probe.height,
            codec = %probe.codec,
            "Video probe completed"
        );
        Ok(probe)
    }

    async fn capture_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp: f64,
        box_w: u32,
        box_h: u32,
    ) -> ProcessingResult<()> {
        self.run_ffmpeg("frame", &frame_args(input, output, timestamp, box_w, box_h))
            .await
    }

    #[tracing::instrument(skip(self, input, output_dir), fields(label = %target.label))]
    async fn encode_hls(&self, input: &Path, output_dir: &Path, target: &VideoTarget) -> ProcessingResult<()> {
        tokio::fs::create_dir_all(output_dir).await?;
        self.run_ffmpeg("hls", &hls_args(input, output_dir, target, self.segment_seconds))
            .await
    }

    #[tracing::instrument(skip(self, input, output), fields(label = %target.label))]
    async fn encode_mp4(&self, input: &Path, output: &Path, target: &VideoTarget) -> ProcessingResult<()> {
        self.run_ffmpeg("mp4", &mp4_args(input, output, target, self.segment_seconds))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target() -> VideoTarget {
        VideoTarget {
            label: "720p".to_string(),
            width: 960,
            height: 540,
            video_kbps: 2500,
            audio_kbps: 128,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn test_hls_args_force_keyframes_per_segment() {
        let args = hls_args(
            &PathBuf::from("/tmp/in.mp4"),
            &PathBuf::from("/tmp/hls/720p"),
            &target(),
            4,
        );
        assert_eq!(value_after(&args, "-hls_time"), "4");
        assert_eq!(value_after(&args, "-force_key_frames"), "expr:gte(t,n_forced*4)");
        assert_eq!(value_after(&args, "-sc_threshold"), "0");
        assert_eq!(value_after(&args, "-hls_playlist_type"), "vod");
        assert_eq!(value_after(&args, "-b:v"), "2500k");
        assert_eq!(value_after(&args, "-maxrate"), "3000k");
        assert_eq!(value_after(&args, "-b:a"), "128k");
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            "/tmp/hls/720p/segment_%03d.ts"
        );
        assert_eq!(args.last().unwrap(), "/tmp/hls/720p/index.m3u8");
    }

    #[test]
    fn test_scale_filter_never_upscales() {
        let args = mp4_args(&PathBuf::from("in.mov"), &PathBuf::from("out.mp4"), &target(), 4);
        let vf = value_after(&args, "-vf");
        assert!(vf.contains("min(960,iw)"));
        assert!(vf.contains("force_original_aspect_ratio=decrease"));
        assert_eq!(value_after(&args, "-movflags"), "+faststart");
    }

    #[test]
    fn test_frame_args() {
        let args = frame_args(&PathBuf::from("in.mp4"), &PathBuf::from("poster.jpg"), 1.0, 1280, 1280);
        assert_eq!(value_after(&args, "-ss"), "1.000");
        assert_eq!(value_after(&args, "-vframes"), "1");
        assert_eq!(args.last().unwrap(), "poster.jpg");
    }

    #[test]
    fn test_tool_path_validation() {
        assert!(FfmpegTranscoder::new("ffmpeg".into(), "/usr/bin/ffprobe".into(), 4).is_ok());
        assert!(FfmpegTranscoder::new("ffmpeg; rm -rf /".into(), "ffprobe".into(), 4).is_err());
        assert!(FfmpegTranscoder::new("../ffmpeg".into(), "ffprobe".into(), 4).is_err());
    }
}
