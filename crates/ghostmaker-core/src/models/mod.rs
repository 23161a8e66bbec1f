pub mod asset;
pub mod job;
pub mod manifest;
pub mod rendition;

pub use asset::{AssetId, AssetStatus, MediaAsset, MediaKind};
pub use job::{JobStatus, ProcessingJob};
pub use manifest::{FormatUrls, HlsManifest, LadderEntry, Manifest};
pub use rendition::{ImageFormat, Rendition};
