// Raw video encoder adapter - Uncompressed RGB24 frames as chunks

use async_trait::async_trait;
use tracing::trace;

use crate::domain::model::CapturedFrame;
use crate::error::{SplitError, SplitResult};
use crate::ports::{CellEncoder, ChunkSink, EncoderFactory, EncoderSpec, FlushAck};

/// Media type of raw RGB24 artifacts
pub const RAW_MEDIA_TYPE: &str = "video/x-raw-rgb";
/// File extension of raw RGB24 artifacts
pub const RAW_EXTENSION: &str = "rgb";

/// Creates encoders that emit every captured frame verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct RawVideoEncoderFactory;

#[async_trait]
impl EncoderFactory for RawVideoEncoderFactory {
    fn media_type(&self) -> &'static str {
        RAW_MEDIA_TYPE
    }

    fn extension(&self) -> &'static str {
        RAW_EXTENSION
    }

    async fn create(&self, spec: EncoderSpec, sink: ChunkSink) -> SplitResult<Box<dyn CellEncoder>> {
        if spec.width == 0 || spec.height == 0 {
            return Err(SplitError::encoder(
                spec.index.value(),
                format!("cannot encode {}x{} frames", spec.width, spec.height),
            ));
        }
        Ok(Box::new(RawVideoEncoder { spec, sink }))
    }
}

/// One frame in, one chunk out
pub struct RawVideoEncoder {
    spec: EncoderSpec,
    sink: ChunkSink,
}

#[async_trait]
impl CellEncoder for RawVideoEncoder {
    async fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()> {
        if frame.image.width() != self.spec.width || frame.image.height() != self.spec.height {
            return Err(SplitError::encoder(
                self.spec.index.value(),
                format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.image.width(),
                    frame.image.height(),
                    self.spec.width,
                    self.spec.height
                ),
            ));
        }
        if !self.sink.deliver(frame.image.into_bytes()) {
            trace!(segment = self.spec.index.value(), "Chunk receiver gone");
        }
        Ok(())
    }

    fn stop(self: Box<Self>) -> FlushAck {
        FlushAck::done()
    }
}
