pub mod ffmpeg;
pub mod generator;
pub mod playlist;
pub mod probe;

pub use ffmpeg::{FfmpegTranscoder, VideoTarget, VideoTranscoder};
pub use generator::{remote_outputs, RemoteContainer, RemoteOutput, VideoDerivativeGenerator, VideoDerivatives};
pub use probe::VideoProbe;
