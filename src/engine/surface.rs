//! Per-cell drawing surfaces and their fixed-rate capture streams

use crate::domain::model::*;
use crate::error::{SplitError, SplitResult};

/// Tolerance for float error when mapping the playback clock to capture frames
const CLOCK_EPSILON: f64 = 1e-6;

/// Offscreen surface holding the latest crop of one cell
pub struct CellSurface {
    index: SegmentIndex,
    source_rect: CellRect,
    canvas: RgbFrame,
    painted: bool,
}

impl CellSurface {
    /// Allocate the surface for `index`; a zero-sized cell cannot be allocated
    pub fn allocate(index: SegmentIndex, geometry: &GridGeometry) -> SplitResult<Self> {
        if geometry.is_empty() {
            return Err(SplitError::setup(format!(
                "cannot allocate {}x{} surface for segment {}",
                geometry.cell_width,
                geometry.cell_height,
                index.value()
            )));
        }

        Ok(Self {
            index,
            source_rect: geometry.cell_rect(index),
            canvas: RgbFrame::new(geometry.cell_width, geometry.cell_height),
            painted: false,
        })
    }

    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Copy this cell's region of `frame` onto the surface at full surface size
    pub fn paint(&mut self, frame: &RgbFrame) -> SplitResult<()> {
        frame.crop_into(self.source_rect, &mut self.canvas)?;
        self.painted = true;
        Ok(())
    }

    pub fn is_painted(&self) -> bool {
        self.painted
    }

    pub fn canvas(&self) -> &RgbFrame {
        &self.canvas
    }
}

/// Live feed sampling a surface at a fixed rate, independent of the source rate
pub struct CaptureStream {
    fps: u32,
    next_sequence: u64,
}

impl CaptureStream {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            next_sequence: 0,
        }
    }

    /// Frames captured so far
    pub fn captured(&self) -> u64 {
        self.next_sequence
    }

    /// Emit one frame for every capture instant reached by `playback_time`
    ///
    /// Each emitted frame duplicates the current surface content. Nothing is
    /// emitted before the surface has been painted.
    pub fn capture(&mut self, surface: &CellSurface, playback_time: f64) -> Vec<CapturedFrame> {
        if !playback_time.is_finite() || playback_time < 0.0 {
            return Vec::new();
        }
        let due = (playback_time * self.fps as f64 + CLOCK_EPSILON).floor() as u64;
        self.emit_through(surface, due)
    }

    /// Emit the capture instants strictly before `playback_time`
    ///
    /// Called before a new frame is painted, so instants that fell between two
    /// source frames show the frame that was on screen at the time.
    pub fn capture_before(&mut self, surface: &CellSurface, playback_time: f64) -> Vec<CapturedFrame> {
        if !playback_time.is_finite() || playback_time <= 0.0 {
            return Vec::new();
        }
        let next = (playback_time * self.fps as f64 - CLOCK_EPSILON).ceil() as u64;
        match next.checked_sub(1) {
            Some(due) => self.emit_through(surface, due),
            None => Vec::new(),
        }
    }

    fn emit_through(&mut self, surface: &CellSurface, due: u64) -> Vec<CapturedFrame> {
        if !surface.is_painted() {
            return Vec::new();
        }

        let mut frames = Vec::new();
        while self.next_sequence <= due {
            frames.push(CapturedFrame {
                index: surface.index(),
                sequence: self.next_sequence,
                image: surface.canvas().clone(),
            });
            self.next_sequence += 1;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrant_frame(geometry: &GridGeometry, width: u32, height: u32) -> RgbFrame {
        let mut frame = RgbFrame::new(width, height);
        for index in SegmentIndex::all() {
            let v = index.value() as u8 + 1;
            frame.fill_rect(geometry.cell_rect(index), [v, v * 2, v * 3]);
        }
        frame
    }

    #[test]
    fn test_allocate_rejects_empty_geometry() {
        let geometry = GridGeometry::from_dimensions(2, 2);
        let index = SegmentIndex::new(0).unwrap();
        let result = CellSurface::allocate(index, &geometry);
        assert!(matches!(result, Err(SplitError::Setup { .. })));
    }

    #[test]
    fn test_paint_copies_only_own_cell() {
        let geometry = GridGeometry::from_dimensions(12, 9);
        let frame = quadrant_frame(&geometry, 12, 9);

        for index in SegmentIndex::all() {
            let mut surface = CellSurface::allocate(index, &geometry).unwrap();
            assert_eq!((surface.width(), surface.height()), (4, 3));
            surface.paint(&frame).unwrap();
            let v = index.value() as u8 + 1;
            assert_eq!(surface.canvas().pixel(0, 0), Some([v, v * 2, v * 3]));
            assert_eq!(surface.canvas().pixel(3, 2), Some([v, v * 2, v * 3]));
        }
    }

    #[test]
    fn test_capture_waits_for_first_paint() {
        let geometry = GridGeometry::from_dimensions(9, 9);
        let surface = CellSurface::allocate(SegmentIndex::new(4).unwrap(), &geometry).unwrap();
        let mut stream = CaptureStream::new(30);
        assert!(stream.capture(&surface, 1.0).is_empty());
        assert_eq!(stream.captured(), 0);
    }

    #[test]
    fn test_capture_emits_at_fixed_rate() {
        let geometry = GridGeometry::from_dimensions(9, 9);
        let mut surface = CellSurface::allocate(SegmentIndex::new(4).unwrap(), &geometry).unwrap();
        surface.paint(&RgbFrame::new(9, 9)).unwrap();
        let mut stream = CaptureStream::new(30);

        // First frame at t=0
        assert_eq!(stream.capture(&surface, 0.0).len(), 1);
        // A 60 Hz tick between capture instants emits nothing
        assert!(stream.capture(&surface, 1.0 / 60.0).is_empty());
        assert_eq!(stream.capture(&surface, 1.0 / 30.0).len(), 1);
        // A slow source catches up by duplicating the surface
        let frames = stream.capture(&surface, 0.5);
        assert_eq!(frames.len(), 14);
        assert_eq!(frames.last().unwrap().sequence, 15);
        assert_eq!(stream.captured(), 16);
    }

    #[test]
    fn test_capture_sequences_are_contiguous_for_frame_aligned_clock() {
        let geometry = GridGeometry::from_dimensions(9, 9);
        let mut surface = CellSurface::allocate(SegmentIndex::new(0).unwrap(), &geometry).unwrap();
        surface.paint(&RgbFrame::new(9, 9)).unwrap();
        let mut stream = CaptureStream::new(30);

        let mut sequences = Vec::new();
        for n in 0..90u64 {
            let time = n as f64 / 30.0;
            sequences.extend(stream.capture(&surface, time).into_iter().map(|f| f.sequence));
        }
        assert_eq!(sequences, (0..90).collect::<Vec<_>>());
    }

    #[test]
    fn test_capture_before_holds_previous_content() {
        let geometry = GridGeometry::from_dimensions(3, 3);
        let index = SegmentIndex::new(0).unwrap();
        let mut surface = CellSurface::allocate(index, &geometry).unwrap();
        let mut stream = CaptureStream::new(20);

        let mut first = RgbFrame::new(3, 3);
        first.fill([10, 10, 10]);
        let mut second = RgbFrame::new(3, 3);
        second.fill([20, 20, 20]);

        // Nothing on screen before the first paint
        assert!(stream.capture_before(&surface, 0.0).is_empty());
        surface.paint(&first).unwrap();
        assert_eq!(stream.capture(&surface, 0.0).len(), 1);

        // Source advances by 0.2s: instants 1..=3 show the old frame, 4 the new one
        let held = stream.capture_before(&surface, 0.2);
        assert_eq!(held.iter().map(|f| f.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(held.iter().all(|f| f.image.pixel(0, 0) == Some([10, 10, 10])));

        surface.paint(&second).unwrap();
        let fresh = stream.capture(&surface, 0.2);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].sequence, 4);
        assert_eq!(fresh[0].image.pixel(0, 0), Some([20, 20, 20]));
    }
}
