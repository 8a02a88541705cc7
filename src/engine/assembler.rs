//! Chunk collection and final segment assembly

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::domain::model::*;
use crate::error::{SplitError, SplitResult};
use crate::ports::{ChunkEvent, ChunkSink, FlushAck};

/// Append-only chunk list of one segment during capture
#[derive(Debug)]
pub struct SegmentBuffer {
    index: SegmentIndex,
    chunks: Vec<Vec<u8>>,
    bytes: usize,
}

impl SegmentBuffer {
    pub fn new(index: SegmentIndex) -> Self {
        Self {
            index,
            chunks: Vec::new(),
            bytes: 0,
        }
    }

    /// Append a chunk; empty chunks are dropped
    pub fn append(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Concatenate the chunks in arrival order
    pub fn finish(self, media_type: &'static str, extension: &'static str) -> Segment {
        let mut bytes = Vec::with_capacity(self.bytes);
        for chunk in &self.chunks {
            bytes.extend_from_slice(chunk);
        }
        Segment::finished(
            self.index,
            Artifact {
                media_type,
                extension,
                bytes,
            },
        )
    }
}

/// Receives chunk deliveries for one run and files them per segment
///
/// The collector is the only writer of the segment buffers. Chunks tagged with
/// another generation are discarded.
pub struct ChunkCollector {
    generation: u64,
    tx: mpsc::UnboundedSender<ChunkEvent>,
    rx: mpsc::UnboundedReceiver<ChunkEvent>,
    buffers: Vec<SegmentBuffer>,
    stale: usize,
}

impl ChunkCollector {
    pub fn new(generation: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generation,
            tx,
            rx,
            buffers: SegmentIndex::all().map(SegmentBuffer::new).collect(),
            stale: 0,
        }
    }

    /// Delivery handle for the encoder of `index`
    pub fn sink(&self, index: SegmentIndex) -> ChunkSink {
        ChunkSink::new(self.generation, index, self.tx.clone())
    }

    /// Sender for chunk events, tagged by the caller
    pub fn sender(&self) -> mpsc::UnboundedSender<ChunkEvent> {
        self.tx.clone()
    }

    /// File one delivery
    pub fn accept(&mut self, event: ChunkEvent) {
        if event.generation != self.generation {
            self.stale += 1;
            trace!(
                generation = event.generation,
                segment = event.index.value(),
                "Discarded chunk from abandoned run"
            );
            return;
        }
        self.buffers[event.index.value()].append(event.bytes);
    }

    /// File every delivery that has already arrived
    pub fn drain(&mut self) -> usize {
        let mut received = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.accept(event);
            received += 1;
        }
        received
    }

    pub fn buffer(&self, index: SegmentIndex) -> &SegmentBuffer {
        &self.buffers[index.value()]
    }

    /// Deliveries discarded for carrying a stale generation
    pub fn stale_count(&self) -> usize {
        self.stale
    }

    fn into_buffers(self) -> Vec<SegmentBuffer> {
        self.buffers
    }
}

/// Waits for the encoders to flush and turns the chunk lists into artifacts
pub struct SegmentAssembler {
    grace_period: Duration,
    flush_timeout: Duration,
}

impl SegmentAssembler {
    pub fn new(grace_period: Duration, flush_timeout: Duration) -> Self {
        Self {
            grace_period,
            flush_timeout,
        }
    }

    /// Wait for every flush acknowledgement, then the grace period for encoders without one
    pub async fn await_flush(&self, acks: Vec<(SegmentIndex, FlushAck)>) -> SplitResult<()> {
        let mut pending = Vec::new();
        let mut unacknowledged = 0;
        for (index, ack) in acks {
            match ack {
                FlushAck::Pending(rx) => pending.push((index, rx)),
                FlushAck::Unacknowledged => unacknowledged += 1,
            }
        }

        let deadline = tokio::time::Instant::now() + self.flush_timeout;
        for (index, rx) in pending {
            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(result)) => result?,
                Ok(Err(_)) => {
                    return Err(SplitError::encoder(
                        index.value(),
                        "encoder exited without acknowledging flush",
                    ))
                }
                Err(_) => {
                    return Err(SplitError::FlushTimeout {
                        waited_ms: self.flush_timeout.as_millis() as u64,
                    })
                }
            }
        }

        if unacknowledged > 0 {
            debug!(
                encoders = unacknowledged,
                grace_ms = self.grace_period.as_millis() as u64,
                "Waiting grace period for unacknowledged encoders"
            );
            tokio::time::sleep(self.grace_period).await;
        }
        Ok(())
    }

    /// Flush barrier followed by assembly of all nine segments
    pub async fn finish(
        &self,
        acks: Vec<(SegmentIndex, FlushAck)>,
        mut collector: ChunkCollector,
        media_type: &'static str,
        extension: &'static str,
    ) -> SplitResult<Vec<Segment>> {
        self.await_flush(acks).await?;
        collector.drain();
        if collector.stale_count() > 0 {
            warn!(chunks = collector.stale_count(), "Ignored chunks from an abandoned run");
        }
        Ok(Self::assemble(collector.into_buffers(), media_type, extension))
    }

    /// Concatenate each buffer into one artifact, in index order
    pub fn assemble(
        mut buffers: Vec<SegmentBuffer>,
        media_type: &'static str,
        extension: &'static str,
    ) -> Vec<Segment> {
        buffers.sort_by_key(|b| b.index());
        let segments: Vec<Segment> = buffers
            .into_iter()
            .map(|buffer| {
                debug!(
                    segment = buffer.index().value(),
                    chunks = buffer.chunk_count(),
                    bytes = buffer.byte_len(),
                    "Assembling segment"
                );
                buffer.finish(media_type, extension)
            })
            .collect();
        info!(segments = segments.len(), media_type, "Segments assembled");
        segments
    }
}
