// Ports - Interface definitions (contracts)

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::domain::model::*;
use crate::error::SplitResult;

/// Playback state reported after advancing a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// A current frame is available
    Playing,
    /// Playback was paused externally
    Paused,
    /// The source has no more frames
    Ended,
}

/// Port for the video being split
///
/// A source plays once: `start` rewinds to the beginning, then each `advance`
/// moves the playback clock forward.
#[async_trait]
pub trait FrameSource: Send {
    /// Metadata if it has already loaded
    fn metadata(&self) -> Option<VideoMetadata>;

    /// Suspend until metadata is available
    async fn wait_for_metadata(&mut self) -> SplitResult<VideoMetadata>;

    /// Rewind to the start and begin playback
    async fn start(&mut self) -> SplitResult<()>;

    /// Move the playback clock forward
    ///
    /// With `target` set, the clock moves to the last frame due at or before
    /// `target` seconds. Without it, the clock moves by exactly one frame.
    async fn advance(&mut self, target: Option<f64>) -> SplitResult<Playback>;

    /// Frame under the playback clock
    fn current_frame(&self) -> Option<&RgbFrame>;

    /// Playback clock in seconds
    fn current_time(&self) -> f64;
}

/// Signal delivered once per display refresh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshTick {
    /// Wall-clock playback position, when playback is paced in real time
    pub playback_target: Option<f64>,
}

/// Port for the refresh signal driving the frame pump
#[async_trait]
pub trait RefreshClock: Send {
    /// Wait for the next refresh
    async fn next_refresh(&mut self) -> RefreshTick;
}

/// Encoded bytes delivered by one encoder
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    /// Run that produced the chunk
    pub generation: u64,
    pub index: SegmentIndex,
    pub bytes: Vec<u8>,
}

/// Sending half of the chunk channel, bound to one segment and one run
#[derive(Debug, Clone)]
pub struct ChunkSink {
    generation: u64,
    index: SegmentIndex,
    tx: mpsc::UnboundedSender<ChunkEvent>,
}

impl ChunkSink {
    pub fn new(generation: u64, index: SegmentIndex, tx: mpsc::UnboundedSender<ChunkEvent>) -> Self {
        Self {
            generation,
            index,
            tx,
        }
    }

    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    /// Deliver a chunk; returns false once the receiving run is gone
    pub fn deliver(&self, bytes: Vec<u8>) -> bool {
        self.tx
            .send(ChunkEvent {
                generation: self.generation,
                index: self.index,
                bytes,
            })
            .is_ok()
    }
}

/// Acknowledgement that an encoder delivered its final chunk
pub enum FlushAck {
    /// Resolves once every chunk of the encoder has been delivered
    Pending(oneshot::Receiver<SplitResult<()>>),
    /// The encoder offers no acknowledgement; a grace period applies
    Unacknowledged,
}

impl FlushAck {
    /// Acknowledgement that has already resolved successfully
    pub fn done() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(()));
        FlushAck::Pending(rx)
    }
}

/// Parameters for one per-cell encoding session
#[derive(Debug, Clone, Copy)]
pub struct EncoderSpec {
    pub index: SegmentIndex,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Port for one per-cell encoding session
#[async_trait]
pub trait CellEncoder: Send {
    /// Submit one captured frame
    async fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()>;

    /// Stop accepting frames and flush
    fn stop(self: Box<Self>) -> FlushAck;
}

/// Port creating encoders for one codec and container
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    /// Media type of the assembled artifact
    fn media_type(&self) -> &'static str;

    /// File extension of the assembled artifact
    fn extension(&self) -> &'static str;

    /// Start an encoding session; chunks go to `sink`
    async fn create(&self, spec: EncoderSpec, sink: ChunkSink) -> SplitResult<Box<dyn CellEncoder>>;
}
