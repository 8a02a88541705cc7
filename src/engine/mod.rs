//! Core splitting engine module

use std::time::Duration;

pub mod assembler;
pub mod progress;
pub mod pump;
pub mod splitter;
pub mod surface;

pub use assembler::{ChunkCollector, SegmentAssembler, SegmentBuffer};
pub use progress::{
    forward_progress, ConsoleProgressCallback, JsonProgressCallback, ProgressCallback, RunToken,
    StateStore,
};
pub use pump::{CellPipeline, FramePump, PumpOutcome, PumpState};
pub use splitter::GridSplitter;
pub use surface::{CaptureStream, CellSurface};

/// Default capture rate of the per-cell streams
pub const DEFAULT_CAPTURE_FPS: u32 = 30;
/// Default wait for encoders that cannot acknowledge their flush
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Splitting engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frame rate of every capture stream
    pub capture_fps: u32,
    /// Wait applied when an encoder offers no flush acknowledgement
    pub grace_period: Duration,
    /// Upper bound on waiting for flush acknowledgements
    pub flush_timeout: Duration,
    /// Upper bound on waiting for source metadata
    pub metadata_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_fps: DEFAULT_CAPTURE_FPS,
            grace_period: DEFAULT_GRACE_PERIOD,
            flush_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(10),
        }
    }
}
