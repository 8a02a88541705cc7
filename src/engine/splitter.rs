//! Orchestration of one split run

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::domain::model::*;
use crate::engine::assembler::{ChunkCollector, SegmentAssembler};
use crate::engine::progress::{RunToken, StateStore};
use crate::engine::pump::{CellPipeline, FramePump, PumpOutcome};
use crate::engine::surface::{CaptureStream, CellSurface};
use crate::engine::EngineConfig;
use crate::error::{SplitError, SplitResult};
use crate::ports::{EncoderFactory, EncoderSpec, FrameSource, RefreshClock};

/// Splits a 3x3 composited video into nine segments
pub struct GridSplitter {
    config: EngineConfig,
    store: StateStore,
    encoders: Arc<dyn EncoderFactory>,
}

impl GridSplitter {
    pub fn new(config: EngineConfig, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self {
            config,
            store: StateStore::new(),
            encoders,
        }
    }

    /// Publish run state into an existing store
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<SplitState> {
        self.store.subscribe()
    }

    pub fn state(&self) -> SplitState {
        self.store.snapshot()
    }

    /// Abandon the run in flight, if any, and return to Idle
    pub fn reset(&self) {
        info!("Resetting workspace");
        self.store.reset();
    }

    /// Run the whole pipeline once
    ///
    /// Returns the nine published segments, `SplitError::Cancelled` if the run
    /// was reset, or the failure that moved the status to Error.
    pub async fn split<S, R>(&self, source: &mut S, refresh: &mut R) -> SplitResult<Vec<Segment>>
    where
        S: FrameSource + ?Sized,
        R: RefreshClock + ?Sized,
    {
        let token = self.store.begin_run();
        info!(generation = token.generation(), "Starting split run");

        let result = match self.run(token, source, refresh).await {
            Ok(segments) => self.publish(token, segments),
            Err(e) => Err(e),
        };

        match result {
            Ok(segments) => {
                info!(generation = token.generation(), "Split run completed");
                Ok(segments)
            }
            Err(SplitError::Cancelled) => {
                info!(generation = token.generation(), "Split run abandoned");
                Err(SplitError::Cancelled)
            }
            Err(e) => {
                error!(generation = token.generation(), "Split run failed: {}", e);
                self.store.fail(token, e.to_string());
                Err(e)
            }
        }
    }

    fn publish(&self, token: RunToken, segments: Vec<Segment>) -> SplitResult<Vec<Segment>> {
        match self.store.complete(token, segments.clone())? {
            true => Ok(segments),
            false => Err(SplitError::Cancelled),
        }
    }

    async fn run<S, R>(&self, token: RunToken, source: &mut S, refresh: &mut R) -> SplitResult<Vec<Segment>>
    where
        S: FrameSource + ?Sized,
        R: RefreshClock + ?Sized,
    {
        let metadata = self.await_metadata(source).await?;
        let geometry = GridGeometry::from_metadata(&metadata);
        info!(
            width = metadata.width,
            height = metadata.height,
            duration = metadata.duration,
            cell_width = geometry.cell_width,
            cell_height = geometry.cell_height,
            "Source metadata ready"
        );

        let surfaces = SegmentIndex::all()
            .map(|index| CellSurface::allocate(index, &geometry))
            .collect::<SplitResult<Vec<_>>>()?;

        let mut collector = ChunkCollector::new(token.generation());
        let mut cells = Vec::with_capacity(SEGMENT_COUNT);
        for surface in surfaces {
            let spec = EncoderSpec {
                index: surface.index(),
                width: surface.width(),
                height: surface.height(),
                fps: self.config.capture_fps,
            };
            let encoder = self
                .encoders
                .create(spec, collector.sink(surface.index()))
                .await?;
            debug!(segment = spec.index.value(), "Encoder started");
            cells.push(CellPipeline::new(
                surface,
                CaptureStream::new(self.config.capture_fps),
                encoder,
            ));
        }

        if !self.store.is_current(token) {
            return Err(SplitError::Cancelled);
        }

        let mut pump = FramePump::new(cells, self.store.clone(), token, metadata.duration);
        if let PumpOutcome::Cancelled { .. } = pump.run(source, refresh, &mut collector).await? {
            return Err(SplitError::Cancelled);
        }

        let acks = pump.stop_encoders();
        let assembler = SegmentAssembler::new(self.config.grace_period, self.config.flush_timeout);
        assembler
            .finish(
                acks,
                collector,
                self.encoders.media_type(),
                self.encoders.extension(),
            )
            .await
    }

    async fn await_metadata<S>(&self, source: &mut S) -> SplitResult<VideoMetadata>
    where
        S: FrameSource + ?Sized,
    {
        if let Some(metadata) = source.metadata() {
            return Ok(metadata);
        }

        debug!("Waiting for source metadata");
        match tokio::time::timeout(self.config.metadata_timeout, source.wait_for_metadata()).await {
            Ok(result) => result,
            Err(_) => Err(SplitError::MetadataTimeout {
                waited_ms: self.config.metadata_timeout.as_millis() as u64,
            }),
        }
    }
}
