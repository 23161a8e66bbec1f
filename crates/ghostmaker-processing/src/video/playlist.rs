use ghostmaker_core::models::Rendition;

use super::ffmpeg::HLS_PLAYLIST_NAME;

pub const HLS_DIR: &str = "hls";
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Variant playlist URI relative to the master playlist.
pub fn variant_uri(label: &str) -> String {
    format!("{}/{}", label, HLS_PLAYLIST_NAME)
}

/// Master playlist for the renditions that were actually produced, lowest bandwidth first so
/// players that pick the first entry start fast.
pub fn build_master_playlist(renditions: &[Rendition]) -> String {
    let mut sorted: Vec<&Rendition> = renditions.iter().collect();
    sorted.sort_by_key(|r| (r.bitrate_kbps.unwrap_or(0), r.width * r.height));

    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for rendition in sorted {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}\n\n",
            rendition.bitrate_kbps.unwrap_or(0) * 1000,
            rendition.width,
            rendition.height,
            variant_uri(&rendition.label)
        ));
    }
    playlist
}
