// Adapters - External system implementations

pub mod raw_encoder;
pub mod refresh;
pub mod synthetic;

#[cfg(feature = "libav")]
pub mod libav_encoder;
#[cfg(feature = "libav")]
pub mod libav_source;

// Re-export adapters
pub use raw_encoder::RawVideoEncoderFactory;
pub use refresh::{FreeRunningRefresh, PacedRefresh};
pub use synthetic::SyntheticGridSource;

#[cfg(feature = "libav")]
pub use libav_encoder::{H264Settings, LibavEncoderFactory};
#[cfg(feature = "libav")]
pub use libav_source::LibavSource;
