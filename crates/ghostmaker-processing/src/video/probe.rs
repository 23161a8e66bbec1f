//! ffprobe output parsing

use serde_json::Value;

use crate::error::{ProcessingError, ProcessingResult};

/// Stream facts needed to plan and encode a video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub framerate: Option<f32>,
}

/// Arguments for `ffprobe` before the input path.
pub fn probe_args() -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "-select_streams",
        "v:0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn parse_framerate(raw: &str) -> Option<f32> {
    let (num, den) = raw.split_once('/')?;
    let num: f32 = num.parse().ok()?;
    let den: f32 = den.parse().ok()?;
    if den != 0.0 {
        Some(num / den)
    } else {
        None
    }
}

/// Parse `ffprobe -print_format json` output. Anything missing a video stream, dimensions or
/// a duration is treated as an unreadable source.
pub fn parse_probe_output(stdout: &[u8]) -> ProcessingResult<VideoProbe> {
    let unreadable = |msg: &str| ProcessingError::SourceUnreadable(msg.to_string());

    let probe_data: Value = serde_json::from_slice(stdout)
        .map_err(|e| ProcessingError::SourceUnreadable(format!("invalid ffprobe output: {}", e)))?;

    let stream = probe_data["streams"]
        .get(0)
        .ok_or_else(|| unreadable("no video stream found"))?;
    let format = &probe_data["format"];

    let duration = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| stream["duration"].as_str().and_then(|d| d.parse::<f64>().ok()))
        .ok_or_else(|| unreadable("could not parse duration"))?;

    let width = stream["width"]
        .as_u64()
        .and_then(|w| u32::try_from(w).ok())
        .filter(|w| *w > 0)
        .ok_or_else(|| unreadable("could not parse width"))?;
    let height = stream["height"]
        .as_u64()
        .and_then(|h| u32::try_from(h).ok())
        .filter(|h| *h > 0)
        .ok_or_else(|| unreadable("could not parse height"))?;

    Ok(VideoProbe {
        duration,
        width,
        height,
        codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
        bitrate: format["bit_rate"].as_str().and_then(|b| b.parse().ok()),
        framerate: stream["r_frame_rate"].as_str().and_then(parse_framerate),
    })
}
