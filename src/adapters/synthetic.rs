// Synthetic source adapter - Deterministic colour-cycle grid video

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::model::*;
use crate::error::{SplitError, SplitResult};
use crate::ports::{FrameSource, Playback};

/// Colour of each cell while it is lit, indexed by segment
pub const CELL_PALETTE: [[u8; 3]; SEGMENT_COUNT] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [128, 0, 255],
    [255, 255, 255],
];

/// Colour of unlit cells
pub const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Tolerance for float error when mapping a playback target to a frame
const CLOCK_EPSILON: f64 = 1e-6;

/// Grid video in which cell `i` alone is lit during second `i`
pub struct SyntheticGridSource {
    width: u32,
    height: u32,
    fps: u32,
    total_frames: u64,
    metadata_ready: bool,
    metadata_delay: Duration,
    pause_after: Option<u64>,
    started: bool,
    position: Option<u64>,
    frame: RgbFrame,
}

impl SyntheticGridSource {
    /// Source lasting `seconds` seconds at `fps` frames per second
    pub fn new(width: u32, height: u32, fps: u32, seconds: u32) -> Self {
        let fps = fps.max(1);
        Self {
            width,
            height,
            fps,
            total_frames: fps as u64 * seconds as u64,
            metadata_ready: true,
            metadata_delay: Duration::ZERO,
            pause_after: None,
            started: false,
            position: None,
            frame: RgbFrame::new(width, height),
        }
    }

    /// Nine-second cycle lighting every cell once
    pub fn color_cycle(width: u32, height: u32, fps: u32) -> Self {
        Self::new(width, height, fps, SEGMENT_COUNT as u32)
    }

    /// Metadata becomes available only after `delay` spent waiting for it
    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_ready = false;
        self.metadata_delay = delay;
        self
    }

    /// Report a pause once `frames` frames have played
    pub fn with_pause_after(mut self, frames: u64) -> Self {
        self.pause_after = Some(frames);
        self
    }

    /// Colour cell `index` shows during second `second`
    pub fn expected_color(index: SegmentIndex, second: u64) -> [u8; 3] {
        if second == index.value() as u64 {
            CELL_PALETTE[index.value()]
        } else {
            BACKGROUND
        }
    }

    fn full_metadata(&self) -> VideoMetadata {
        VideoMetadata::new(
            self.width,
            self.height,
            self.total_frames as f64 / self.fps as f64,
        )
        .with_frame_rate(self.fps as f64)
        .with_codec("synthetic")
    }

    fn render(&mut self, frame_number: u64) {
        let geometry = GridGeometry::from_dimensions(self.width, self.height);
        let second = frame_number / self.fps as u64;
        self.frame.fill(BACKGROUND);
        for index in SegmentIndex::all() {
            let color = Self::expected_color(index, second);
            if color != BACKGROUND {
                self.frame.fill_rect(geometry.cell_rect(index), color);
            }
        }
        self.position = Some(frame_number);
    }
}

#[async_trait]
impl FrameSource for SyntheticGridSource {
    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata_ready.then(|| self.full_metadata())
    }

    async fn wait_for_metadata(&mut self) -> SplitResult<VideoMetadata> {
        if !self.metadata_ready {
            tokio::time::sleep(self.metadata_delay).await;
            self.metadata_ready = true;
        }
        Ok(self.full_metadata())
    }

    async fn start(&mut self) -> SplitResult<()> {
        self.started = true;
        self.position = None;
        Ok(())
    }

    async fn advance(&mut self, target: Option<f64>) -> SplitResult<Playback> {
        if !self.started {
            return Err(SplitError::source("advance called before start"));
        }

        let played = self.position.map_or(0, |p| p + 1);
        if let Some(limit) = self.pause_after {
            if played >= limit {
                return Ok(Playback::Paused);
            }
        }

        let next = match target {
            None => played,
            Some(t) => {
                let due = (t.max(0.0) * self.fps as f64 + CLOCK_EPSILON).floor() as u64;
                due.max(self.position.unwrap_or(0))
            }
        };
        if next >= self.total_frames {
            return Ok(Playback::Ended);
        }

        if self.position != Some(next) {
            self.render(next);
        }
        Ok(Playback::Playing)
    }

    fn current_frame(&self) -> Option<&RgbFrame> {
        self.position.map(|_| &self.frame)
    }

    fn current_time(&self) -> f64 {
        self.position.map_or(0.0, |p| p as f64 / self.fps as f64)
    }
}
