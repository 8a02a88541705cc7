//! End-to-end tests of the splitting pipeline with synthetic sources

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridsplit::adapters::synthetic::CELL_PALETTE;
use gridsplit::adapters::{FreeRunningRefresh, RawVideoEncoderFactory, SyntheticGridSource};
use gridsplit::domain::model::*;
use gridsplit::engine::{EngineConfig, GridSplitter, StateStore};
use gridsplit::ports::*;
use gridsplit::{SplitError, SplitResult};

fn engine_config(capture_fps: u32) -> EngineConfig {
    EngineConfig {
        capture_fps,
        grace_period: Duration::from_millis(50),
        flush_timeout: Duration::from_secs(2),
        metadata_timeout: Duration::from_secs(2),
    }
}

fn raw_splitter(capture_fps: u32) -> GridSplitter {
    GridSplitter::new(engine_config(capture_fps), Arc::new(RawVideoEncoderFactory))
}

/// Split an artifact of raw RGB24 frames into per-frame slices
fn frames_of(segment: &Segment, geometry: &GridGeometry) -> Vec<Vec<u8>> {
    let frame_len = (geometry.cell_width * geometry.cell_height * 3) as usize;
    let bytes = &segment.artifact.as_ref().expect("finished segment").bytes;
    assert_eq!(bytes.len() % frame_len, 0);
    bytes.chunks(frame_len).map(|c| c.to_vec()).collect()
}

fn is_solid(frame: &[u8], color: [u8; 3]) -> bool {
    frame.chunks(3).all(|px| px == color)
}

#[tokio::test]
async fn test_color_cycle_yields_nine_clean_segments() {
    let splitter = raw_splitter(10);
    let mut source = SyntheticGridSource::color_cycle(90, 60, 10);
    let geometry = GridGeometry::from_dimensions(90, 60);

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();

    assert_eq!(segments.len(), SEGMENT_COUNT);
    let state = splitter.state();
    assert_eq!(state.status, ProcessingStatus::Completed);
    assert_eq!(state.progress, 100);
    assert_eq!(state.segments.len(), SEGMENT_COUNT);

    for (position, segment) in segments.iter().enumerate() {
        assert_eq!(segment.index.value(), position);
        let artifact = segment.artifact.as_ref().unwrap();
        assert_eq!(artifact.media_type, "video/x-raw-rgb");

        let frames = frames_of(segment, &geometry);
        assert_eq!(frames.len(), 90);
        for (sequence, frame) in frames.iter().enumerate() {
            let second = sequence as u64 / 10;
            let expected = SyntheticGridSource::expected_color(segment.index, second);
            assert!(
                is_solid(frame, expected),
                "segment {} frame {} is not solid {:?}",
                position,
                sequence,
                expected
            );
        }
    }
}

#[tokio::test]
async fn test_capture_rate_above_source_rate_duplicates_frames() {
    let splitter = raw_splitter(20);
    let mut source = SyntheticGridSource::color_cycle(30, 30, 5);
    let geometry = GridGeometry::from_dimensions(30, 30);

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();

    // Last source frame is at 8.8s, so capture instants 0..=176 are reached
    let frames = frames_of(&segments[4], &geometry);
    assert_eq!(frames.len(), 177);

    // Cell 4 is lit for exactly the capture instants of second 4
    let lit = CELL_PALETTE[4];
    assert!(is_solid(&frames[79], [0, 0, 0]));
    assert!(is_solid(&frames[80], lit));
    assert!(is_solid(&frames[99], lit));
    assert!(is_solid(&frames[100], [0, 0, 0]));
    assert_eq!(frames.iter().filter(|f| is_solid(f, lit)).count(), 20);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completion_atomic() {
    let splitter = raw_splitter(10);
    let mut rx = splitter.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        loop {
            let state = rx.borrow_and_update().clone();
            let done = state.status.is_terminal();
            seen.push(state);
            if done || rx.changed().await.is_err() {
                return seen;
            }
        }
    });

    let mut source = SyntheticGridSource::color_cycle(30, 30, 10);
    splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();
    let seen = observer.await.unwrap();

    let mut last = 0;
    for state in &seen {
        assert!(state.progress <= 100);
        if state.status == ProcessingStatus::Processing {
            assert!(state.progress >= last);
            assert!(state.progress < 100);
            assert!(state.segments.is_empty());
            last = state.progress;
        }
        if state.status != ProcessingStatus::Completed {
            assert!(state.segments.is_empty());
        }
    }
    let final_state = seen.last().unwrap();
    assert_eq!(final_state.status, ProcessingStatus::Completed);
    assert_eq!(final_state.progress, 100);
    assert_eq!(final_state.segments.len(), SEGMENT_COUNT);
}

/// Counts encoders that are alive
#[derive(Clone, Default)]
struct CountingFactory {
    live: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

struct CountingEncoder {
    inner: Box<dyn CellEncoder>,
    live: Arc<AtomicUsize>,
}

impl Drop for CountingEncoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CellEncoder for CountingEncoder {
    async fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()> {
        self.inner.encode(frame).await
    }

    fn stop(self: Box<Self>) -> FlushAck {
        let mut this = self;
        let inner = std::mem::replace(&mut this.inner, Box::new(NullEncoder));
        inner.stop()
    }
}

struct NullEncoder;

#[async_trait]
impl CellEncoder for NullEncoder {
    async fn encode(&mut self, _frame: CapturedFrame) -> SplitResult<()> {
        Ok(())
    }

    fn stop(self: Box<Self>) -> FlushAck {
        FlushAck::done()
    }
}

#[async_trait]
impl EncoderFactory for CountingFactory {
    fn media_type(&self) -> &'static str {
        RawVideoEncoderFactory.media_type()
    }

    fn extension(&self) -> &'static str {
        RawVideoEncoderFactory.extension()
    }

    async fn create(&self, spec: EncoderSpec, sink: ChunkSink) -> SplitResult<Box<dyn CellEncoder>> {
        let inner = RawVideoEncoderFactory.create(spec, sink).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEncoder {
            inner,
            live: self.live.clone(),
        }))
    }
}

/// Free-running refresh that resets the store once a given tick is reached
struct ResettingRefresh {
    store: StateStore,
    reset_at: u64,
    ticks: u64,
}

#[async_trait]
impl RefreshClock for ResettingRefresh {
    async fn next_refresh(&mut self) -> RefreshTick {
        self.ticks += 1;
        if self.ticks == self.reset_at {
            self.store.reset();
        }
        tokio::task::yield_now().await;
        RefreshTick {
            playback_target: None,
        }
    }
}

#[tokio::test]
async fn test_reset_abandons_run_and_fresh_run_completes() {
    let factory = CountingFactory::default();
    let store = StateStore::new();
    let splitter = GridSplitter::new(engine_config(10), Arc::new(factory.clone()))
        .with_store(store.clone());

    let mut source = SyntheticGridSource::color_cycle(30, 30, 10);
    let mut refresh = ResettingRefresh {
        store: store.clone(),
        reset_at: 25,
        ticks: 0,
    };
    let result = splitter.split(&mut source, &mut refresh).await;

    assert!(matches!(result, Err(SplitError::Cancelled)));
    let state = splitter.state();
    assert_eq!(state.status, ProcessingStatus::Idle);
    assert_eq!(state.progress, 0);
    assert!(state.segments.is_empty());
    assert!(state.error.is_none());
    assert_eq!(factory.live.load(Ordering::SeqCst), 0);

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();
    assert_eq!(segments.len(), SEGMENT_COUNT);
    assert_eq!(splitter.state().status, ProcessingStatus::Completed);
    assert_eq!(factory.created.load(Ordering::SeqCst), 2 * SEGMENT_COUNT);
    assert_eq!(factory.live.load(Ordering::SeqCst), 0);

    let geometry = GridGeometry::from_dimensions(30, 30);
    assert_eq!(frames_of(&segments[0], &geometry).len(), 90);
}

#[tokio::test]
async fn test_pause_stops_playback_and_assembles() {
    let splitter = raw_splitter(10);
    let mut source = SyntheticGridSource::color_cycle(30, 30, 10).with_pause_after(15);
    let geometry = GridGeometry::from_dimensions(30, 30);

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();

    assert_eq!(segments.len(), SEGMENT_COUNT);
    for segment in &segments {
        assert_eq!(frames_of(segment, &geometry).len(), 15);
    }
    assert_eq!(splitter.state().status, ProcessingStatus::Completed);
}

#[tokio::test]
async fn test_too_small_source_fails_setup() {
    let splitter = raw_splitter(10);
    let mut source = SyntheticGridSource::color_cycle(2, 2, 10);

    let result = splitter.split(&mut source, &mut FreeRunningRefresh).await;

    assert!(matches!(result, Err(SplitError::Setup { .. })));
    let state = splitter.state();
    assert_eq!(state.status, ProcessingStatus::Error);
    assert!(state.error.is_some());
    assert!(state.segments.is_empty());
}

#[tokio::test]
async fn test_waits_for_delayed_metadata() {
    let splitter = raw_splitter(10);
    let mut source =
        SyntheticGridSource::color_cycle(30, 30, 10).with_metadata_delay(Duration::from_millis(30));

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();
    assert_eq!(segments.len(), SEGMENT_COUNT);
}

#[tokio::test]
async fn test_metadata_timeout_is_an_error() {
    let config = EngineConfig {
        metadata_timeout: Duration::from_millis(20),
        ..engine_config(10)
    };
    let splitter = GridSplitter::new(config, Arc::new(RawVideoEncoderFactory));
    let mut source =
        SyntheticGridSource::color_cycle(30, 30, 10).with_metadata_delay(Duration::from_secs(5));

    let result = splitter.split(&mut source, &mut FreeRunningRefresh).await;

    assert!(matches!(result, Err(SplitError::MetadataTimeout { waited_ms: 20 })));
    assert_eq!(splitter.state().status, ProcessingStatus::Error);
}

/// Encoder that only delivers its data shortly after being stopped, without acknowledgement
struct LateEncoder {
    sink: ChunkSink,
    pending: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl CellEncoder for LateEncoder {
    async fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()> {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(frame.sequence as u8);
        }
        // Empty chunks are dropped by the collector
        self.sink.deliver(Vec::new());
        Ok(())
    }

    fn stop(self: Box<Self>) -> FlushAck {
        let LateEncoder { sink, pending } = *self;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let bytes = pending.lock().map(|p| p.clone()).unwrap_or_default();
            sink.deliver(bytes);
        });
        FlushAck::Unacknowledged
    }
}

struct LateFactory;

#[async_trait]
impl EncoderFactory for LateFactory {
    fn media_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    async fn create(&self, _spec: EncoderSpec, sink: ChunkSink) -> SplitResult<Box<dyn CellEncoder>> {
        Ok(Box::new(LateEncoder {
            sink,
            pending: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

#[tokio::test]
async fn test_grace_period_collects_late_chunks() {
    let config = EngineConfig {
        grace_period: Duration::from_millis(300),
        ..engine_config(10)
    };
    let splitter = GridSplitter::new(config, Arc::new(LateFactory));
    let mut source = SyntheticGridSource::new(30, 30, 10, 1);

    let segments = splitter
        .split(&mut source, &mut FreeRunningRefresh)
        .await
        .unwrap();

    for segment in &segments {
        let artifact = segment.artifact.as_ref().unwrap();
        assert_eq!(artifact.bytes, (0..10).collect::<Vec<u8>>());
        assert_eq!(artifact.extension, "bin");
    }
}
