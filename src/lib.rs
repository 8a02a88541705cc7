//! GridSplit Library
//!
//! Splits a video composed as a 3x3 grid of equal cells into nine independent
//! per-cell videos. Playback of the source drives a frame pump that paints each
//! frame into nine cell surfaces, samples them at a fixed capture rate and feeds
//! one encoder per cell. Chunks are assembled into nine artifacts once playback
//! ends and every encoder has flushed.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod ports;
pub mod utils;

#[cfg(feature = "libav")]
pub mod cli;

// Re-export commonly used types
pub use config::SplitterConfig;
pub use domain::errors::DomainError;
pub use domain::model::{ProcessingStatus, Segment, SegmentIndex, SplitState, VideoMetadata};
pub use engine::{EngineConfig, GridSplitter, StateStore};
pub use error::{SplitError, SplitResult};

/// Initialize GridSplit library
pub fn init() -> SplitResult<()> {
    #[cfg(feature = "libav")]
    ffmpeg_next::init().map_err(|e| SplitError::Setup {
        message: format!("Failed to initialize FFmpeg: {}", e),
    })?;

    Ok(())
}
