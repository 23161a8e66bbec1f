pub mod codec;
pub mod digest;
pub mod generator;
pub mod orientation;
pub mod resize;

pub use codec::{Capability, CodecCapabilities, CodecEncoder, ImageEncoder};
pub use generator::{ImageDerivativeGenerator, ImageDerivatives};
pub use orientation::ImageOrientation;
