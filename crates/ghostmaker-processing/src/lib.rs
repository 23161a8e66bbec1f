//! Ghostmaker Processing Library
//!
//! Everything that turns an original into derived artifacts: the rendition planner, the image
//! and video derivative generators, and the on-demand transform cache that serves resizes not
//! covered by the pre-generated ladder.

pub mod cover;
pub mod error;
pub mod image;
pub mod planner;
pub mod transform_cache;
pub mod video;

pub use cover::select_cover_candidate;
pub use error::{ProcessingError, ProcessingResult};
pub use self::image::{
    Capability, CodecCapabilities, CodecEncoder, ImageDerivativeGenerator, ImageDerivatives,
    ImageEncoder,
};
pub use planner::{plan, QualityParams, RenditionRole, RenditionSpec};
pub use transform_cache::{CacheStatus, TransformCache, TransformError, TransformOutput};
pub use video::{
    remote_outputs, RemoteContainer, RemoteOutput, FfmpegTranscoder, VideoDerivativeGenerator, VideoDerivatives, VideoTarget,
    VideoTranscoder,
};
