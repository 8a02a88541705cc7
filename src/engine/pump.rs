//! Playback-driven frame pump
//!
//! One tick per refresh: advance the playback clock, paint the current frame
//! into all nine surfaces, feed the capture streams to the encoders and publish
//! progress. Capture instants that fell between two source frames are fed
//! from the surfaces before they are repainted. Ticks are strictly
//! sequential; the next refresh is awaited only after the previous tick has
//! finished.

use tracing::{debug, info};

use crate::domain::model::*;
use crate::engine::assembler::ChunkCollector;
use crate::engine::progress::{RunToken, StateStore};
use crate::engine::surface::{CaptureStream, CellSurface};
use crate::error::{SplitError, SplitResult};
use crate::ports::{CellEncoder, FlushAck, FrameSource, Playback, RefreshClock};

/// Pump lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    NotStarted,
    Running,
    Stopped,
}

/// Why the pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Playback ended or was paused; encoders must be stopped and assembled
    Finished { ticks: u64, playback: Playback },
    /// The run was reset; everything is discarded
    Cancelled { ticks: u64 },
}

/// Surface, capture stream and encoder of one cell
pub struct CellPipeline {
    pub surface: CellSurface,
    pub stream: CaptureStream,
    pub encoder: Box<dyn CellEncoder>,
}

impl CellPipeline {
    pub fn new(surface: CellSurface, stream: CaptureStream, encoder: Box<dyn CellEncoder>) -> Self {
        Self {
            surface,
            stream,
            encoder,
        }
    }
}

/// Drives all nine cells in lockstep with the source's playback clock
pub struct FramePump {
    state: PumpState,
    cells: Vec<CellPipeline>,
    store: StateStore,
    token: RunToken,
    duration: f64,
    ticks: u64,
}

impl FramePump {
    pub fn new(cells: Vec<CellPipeline>, store: StateStore, token: RunToken, duration: f64) -> Self {
        Self {
            state: PumpState::NotStarted,
            cells,
            store,
            token,
            duration,
            ticks: 0,
        }
    }

    /// Rewind and play the source, then pump until playback stops or the run is reset
    pub async fn run<S, R>(
        &mut self,
        source: &mut S,
        refresh: &mut R,
        collector: &mut ChunkCollector,
    ) -> SplitResult<PumpOutcome>
    where
        S: FrameSource + ?Sized,
        R: RefreshClock + ?Sized,
    {
        if self.state != PumpState::NotStarted {
            return Err(SplitError::setup("frame pump can only run once"));
        }

        source.start().await?;
        self.state = PumpState::Running;
        info!(cells = self.cells.len(), "Frame pump running");

        loop {
            let tick = refresh.next_refresh().await;

            if !self.store.is_current(self.token) {
                self.state = PumpState::Stopped;
                info!(ticks = self.ticks, "Frame pump abandoned by reset");
                return Ok(PumpOutcome::Cancelled { ticks: self.ticks });
            }

            collector.drain();

            match source.advance(tick.playback_target).await? {
                Playback::Playing => {
                    let time = source.current_time();
                    self.flush_held_frames(time).await?;
                    self.paint(source.current_frame())?;
                    self.feed_encoders(time).await?;
                }
                playback => {
                    self.state = PumpState::Stopped;
                    info!(ticks = self.ticks, ?playback, "Frame pump stopped");
                    return Ok(PumpOutcome::Finished {
                        ticks: self.ticks,
                        playback,
                    });
                }
            }
        }
    }

    /// Paint the current frame into every surface before any encoder sees it
    fn paint(&mut self, frame: Option<&RgbFrame>) -> SplitResult<()> {
        let frame =
            frame.ok_or_else(|| SplitError::source("playback reported a frame but none is loaded"))?;
        for cell in &mut self.cells {
            cell.surface.paint(frame)?;
        }
        Ok(())
    }

    /// Feed capture instants that elapsed while the previous frame was on screen
    async fn flush_held_frames(&mut self, time: f64) -> SplitResult<()> {
        for cell in &mut self.cells {
            for captured in cell.stream.capture_before(&cell.surface, time) {
                cell.encoder.encode(captured).await?;
            }
        }
        Ok(())
    }

    async fn feed_encoders(&mut self, time: f64) -> SplitResult<()> {
        for cell in &mut self.cells {
            for captured in cell.stream.capture(&cell.surface, time) {
                cell.encoder.encode(captured).await?;
            }
        }

        self.ticks += 1;
        if self.store.update_progress(self.token, time, self.duration) {
            debug!(time, progress = self.store.snapshot().progress, "Progress published");
        }
        Ok(())
    }

    /// Stop every encoder together and hand back their flush acknowledgements
    pub fn stop_encoders(self) -> Vec<(SegmentIndex, FlushAck)> {
        self.cells
            .into_iter()
            .map(|cell| (cell.surface.index(), cell.encoder.stop()))
            .collect()
    }
}
