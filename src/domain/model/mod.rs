// Domain models - Core types and data structures

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::errors::DomainError;

/// Rows in the source grid
pub const GRID_ROWS: u32 = 3;
/// Columns in the source grid
pub const GRID_COLS: u32 = 3;
/// Number of segments produced by one run
pub const SEGMENT_COUNT: usize = (GRID_ROWS * GRID_COLS) as usize;

/// Bytes per pixel of an RGB24 buffer
const RGB_BYTES: usize = 3;

/// Position of one cell in the 3x3 grid, numbered row-major from 0 to 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SegmentIndex(u8);

impl SegmentIndex {
    /// Create a segment index, rejecting values outside the grid
    pub fn new(index: usize) -> Result<Self, DomainError> {
        if index >= SEGMENT_COUNT {
            return Err(DomainError::InvalidSegmentIndex(index));
        }
        Ok(Self(index as u8))
    }

    /// Create the index of the cell at `row`, `col` (both 0-based)
    pub fn from_position(row: u32, col: u32) -> Result<Self, DomainError> {
        if row >= GRID_ROWS || col >= GRID_COLS {
            let index = (row as usize)
                .saturating_mul(GRID_COLS as usize)
                .saturating_add(col as usize);
            return Err(DomainError::InvalidSegmentIndex(index));
        }
        Ok(Self((row * GRID_COLS + col) as u8))
    }

    /// All nine indices in increasing order
    pub fn all() -> impl Iterator<Item = SegmentIndex> {
        (0..SEGMENT_COUNT as u8).map(SegmentIndex)
    }

    pub fn value(self) -> usize {
        self.0 as usize
    }

    /// 0-based row
    pub fn row(self) -> u32 {
        self.0 as u32 / GRID_COLS
    }

    /// 0-based column
    pub fn col(self) -> u32 {
        self.0 as u32 % GRID_COLS
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (row {}, col {})", self.0, self.row() + 1, self.col() + 1)
    }
}

/// Source video properties known once metadata has loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Total duration in seconds
    pub duration: f64,
    /// Average source frame rate, when the container reports one
    pub frame_rate: Option<f64>,
    pub codec: Option<String>,
}

impl VideoMetadata {
    pub fn new(width: u32, height: u32, duration: f64) -> Self {
        Self {
            width,
            height,
            duration,
            frame_rate: None,
            codec: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cell dimensions derived from the source dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridGeometry {
    pub cell_width: u32,
    pub cell_height: u32,
}

impl GridGeometry {
    /// Divide the source frame into a 3x3 grid, truncating remainders
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            cell_width: width / GRID_COLS,
            cell_height: height / GRID_ROWS,
        }
    }

    pub fn from_metadata(metadata: &VideoMetadata) -> Self {
        Self::from_dimensions(metadata.width, metadata.height)
    }

    /// Source rectangle covered by the given cell
    pub fn cell_rect(&self, index: SegmentIndex) -> CellRect {
        CellRect {
            x: index.col() * self.cell_width,
            y: index.row() * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cell_width == 0 || self.cell_height == 0
    }
}

/// Tightly packed RGB24 image
#[derive(Clone, PartialEq, Eq)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbFrame {
    /// Black frame of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * RGB_BYTES],
        }
    }

    /// Wrap an existing packed buffer
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DomainError> {
        let expected = width as usize * height as usize * RGB_BYTES;
        if data.len() != expected {
            return Err(DomainError::InvalidFrameBuffer(format!(
                "{}x{} RGB24 needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes per row
    pub fn row_len(&self) -> usize {
        self.width as usize * RGB_BYTES
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.row_len() + x as usize * RGB_BYTES;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for pixel in self.data.chunks_exact_mut(RGB_BYTES) {
            pixel.copy_from_slice(&color);
        }
    }

    /// Fill a rectangle, clipped to the frame
    pub fn fill_rect(&mut self, rect: CellRect, color: [u8; 3]) {
        let x_end = (rect.x + rect.width).min(self.width);
        let y_end = (rect.y + rect.height).min(self.height);
        let row_len = self.row_len();
        for y in rect.y.min(y_end)..y_end {
            let row = &mut self.data[y as usize * row_len..(y as usize + 1) * row_len];
            for x in rect.x.min(x_end)..x_end {
                let offset = x as usize * RGB_BYTES;
                row[offset..offset + RGB_BYTES].copy_from_slice(&color);
            }
        }
    }

    /// Copy `rect` of this frame into `target`, which must have the rectangle's size
    pub fn crop_into(&self, rect: CellRect, target: &mut RgbFrame) -> Result<(), DomainError> {
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return Err(DomainError::RegionOutOfBounds(format!(
                "{}x{}+{}+{} outside {}x{} frame",
                rect.width, rect.height, rect.x, rect.y, self.width, self.height
            )));
        }
        if target.width != rect.width || target.height != rect.height {
            return Err(DomainError::InvalidFrameBuffer(format!(
                "crop target is {}x{}, region is {}x{}",
                target.width, target.height, rect.width, rect.height
            )));
        }

        let src_row_len = self.row_len();
        let dst_row_len = target.row_len();
        let x_offset = rect.x as usize * RGB_BYTES;
        for row in 0..rect.height as usize {
            let src_start = (rect.y as usize + row) * src_row_len + x_offset;
            let dst_start = row * dst_row_len;
            target.data[dst_start..dst_start + dst_row_len]
                .copy_from_slice(&self.data[src_start..src_start + dst_row_len]);
        }
        Ok(())
    }
}

impl fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One frame emitted by a capture stream, numbered at the capture rate
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub index: SegmentIndex,
    /// Frame number in units of 1/fps
    pub sequence: u64,
    pub image: RgbFrame,
}

/// Finished, playable output of one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub media_type: &'static str,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One of the nine output sub-videos
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: SegmentIndex,
    pub artifact: Option<Arc<Artifact>>,
}

impl Segment {
    pub fn pending(index: SegmentIndex) -> Self {
        Self {
            index,
            artifact: None,
        }
    }

    pub fn finished(index: SegmentIndex, artifact: Artifact) -> Self {
        Self {
            index,
            artifact: Some(Arc::new(artifact)),
        }
    }

    pub fn row(&self) -> u32 {
        self.index.row()
    }

    pub fn col(&self) -> u32 {
        self.index.col()
    }

    pub fn is_finished(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Process-wide run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStatus::Idle => "idle",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of the run state observed by the UI layer
#[derive(Debug, Clone)]
pub struct SplitState {
    pub status: ProcessingStatus,
    /// Percentage in 0..=100
    pub progress: u8,
    /// Empty until the run completes, then exactly nine entries
    pub segments: Vec<Segment>,
    pub error: Option<String>,
    /// Bumped on every run start and reset
    pub generation: u64,
}

impl Default for SplitState {
    fn default() -> Self {
        Self {
            status: ProcessingStatus::Idle,
            progress: 0,
            segments: Vec::new(),
            error: None,
            generation: 0,
        }
    }
}

#[cfg(test)]
mod tests;
