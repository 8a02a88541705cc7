// LibAV encoder adapter - Per-cell H.264 elementary streams

use async_trait::async_trait;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::{Dictionary, Packet, Rational};

use crate::domain::model::{CapturedFrame, RgbFrame};
use crate::error::{SplitError, SplitResult};
use crate::ports::{CellEncoder, ChunkSink, EncoderFactory, EncoderSpec, FlushAck};

/// Media type of H.264 Annex-B artifacts
pub const H264_MEDIA_TYPE: &str = "video/h264";
/// File extension of H.264 Annex-B artifacts
pub const H264_EXTENSION: &str = "h264";

/// Captured frames queued ahead of each encoder
const FRAME_QUEUE_DEPTH: usize = 4;

/// Quality and speed settings shared by every cell encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H264Settings {
    /// Constant rate factor, 0 to 51
    pub crf: u8,
    /// x264 preset name
    pub preset: String,
    /// Encoder threads per cell
    pub threads: usize,
}

impl Default for H264Settings {
    fn default() -> Self {
        Self {
            crf: 23,
            preset: "medium".to_string(),
            threads: 1,
        }
    }
}

/// Creates libx264 encoders emitting Annex-B packets
///
/// Annex-B packets are self-delimiting, so the concatenated chunks of one
/// segment form a playable raw H.264 stream.
#[derive(Debug, Clone, Default)]
pub struct LibavEncoderFactory {
    settings: H264Settings,
}

impl LibavEncoderFactory {
    pub fn new(settings: H264Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl EncoderFactory for LibavEncoderFactory {
    fn media_type(&self) -> &'static str {
        H264_MEDIA_TYPE
    }

    fn extension(&self) -> &'static str {
        H264_EXTENSION
    }

    async fn create(&self, spec: EncoderSpec, sink: ChunkSink) -> SplitResult<Box<dyn CellEncoder>> {
        let segment = spec.index.value();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();

        let settings = self.settings.clone();
        thread::Builder::new()
            .name(format!("gridsplit-encode-{}", segment))
            .spawn(move || encode_worker(spec, settings, sink, frames_rx, ready_tx, ack_tx))?;

        ready_rx
            .await
            .map_err(|_| SplitError::encoder(segment, "encoder thread exited during setup"))??;

        Ok(Box::new(LibavCellEncoder {
            segment,
            frames: frames_tx,
            ack: Some(ack_rx),
        }))
    }
}

/// Async handle to one encoder thread
pub struct LibavCellEncoder {
    segment: usize,
    frames: mpsc::Sender<CapturedFrame>,
    ack: Option<oneshot::Receiver<SplitResult<()>>>,
}

impl LibavCellEncoder {
    /// Error reported by a worker that closed its queue
    async fn worker_failure(&mut self) -> SplitError {
        let segment = self.segment;
        let stopped = move || SplitError::encoder(segment, "encoder thread stopped");
        match self.ack.take() {
            Some(ack) => match ack.await {
                Ok(Err(e)) => e,
                _ => stopped(),
            },
            None => stopped(),
        }
    }
}

#[async_trait]
impl CellEncoder for LibavCellEncoder {
    async fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()> {
        if self.frames.send(frame).await.is_err() {
            return Err(self.worker_failure().await);
        }
        Ok(())
    }

    fn stop(self: Box<Self>) -> FlushAck {
        // Closing the queue tells the worker to drain and flush
        let LibavCellEncoder { frames, ack, .. } = *self;
        drop(frames);
        match ack {
            Some(ack) => FlushAck::Pending(ack),
            None => FlushAck::Unacknowledged,
        }
    }
}

/// Codec state owned by one encoder thread
struct CellEncoding {
    segment: usize,
    width: u32,
    height: u32,
    padded_width: u32,
    padded_height: u32,
    scaler: Scaler,
    encoder: ffmpeg_next::encoder::video::Encoder,
    sink: ChunkSink,
    packets: u64,
}

impl CellEncoding {
    fn open(spec: EncoderSpec, settings: &H264Settings, sink: ChunkSink) -> SplitResult<Self> {
        let segment = spec.index.value();
        if spec.width == 0 || spec.height == 0 {
            return Err(SplitError::encoder(
                segment,
                format!("cannot encode {}x{} frames", spec.width, spec.height),
            ));
        }
        let (out_width, out_height) = (even(spec.width), even(spec.height));

        let codec = ffmpeg_next::encoder::find_by_name("libx264")
            .or_else(|| ffmpeg_next::encoder::find(Id::H264))
            .ok_or_else(|| SplitError::encoder(segment, "H.264 encoder not available"))?;

        let mut video = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        video.set_width(out_width);
        video.set_height(out_height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(Rational::new(1, spec.fps as i32));
        video.set_frame_rate(Some(Rational::new(spec.fps as i32, 1)));

        let mut options = Dictionary::new();
        options.set("crf", &settings.crf.to_string());
        options.set("preset", &settings.preset);
        options.set("threads", &settings.threads.max(1).to_string());
        let encoder = video
            .open_as_with(codec, options)
            .map_err(|e| SplitError::encoder(segment, format!("Failed to open encoder: {}", e)))?;

        let scaler = Scaler::get(
            Pixel::RGB24,
            out_width,
            out_height,
            Pixel::YUV420P,
            out_width,
            out_height,
            Flags::BILINEAR,
        )?;

        if (out_width, out_height) != (spec.width, spec.height) {
            debug!(
                segment,
                "Padding {}x{} cell to {}x{} for YUV 4:2:0",
                spec.width,
                spec.height,
                out_width,
                out_height
            );
        }

        Ok(Self {
            segment,
            width: spec.width,
            height: spec.height,
            padded_width: out_width,
            padded_height: out_height,
            scaler,
            encoder,
            sink,
            packets: 0,
        })
    }

    fn encode(&mut self, frame: CapturedFrame) -> SplitResult<()> {
        let rgb = pad_rgb(&frame.image, self.padded_width, self.padded_height);
        let mut yuv = VideoFrame::empty();
        self.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(frame.sequence as i64));
        self.encoder.send_frame(&yuv)?;
        self.drain_packets();
        Ok(())
    }

    fn finish(&mut self) -> SplitResult<()> {
        self.encoder.send_eof()?;
        self.drain_packets();
        Ok(())
    }

    fn drain_packets(&mut self) {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            if let Some(data) = packet.data() {
                self.sink.deliver(data.to_vec());
                self.packets += 1;
            }
        }
    }

    fn check_size(&self, frame: &CapturedFrame) -> SplitResult<()> {
        if frame.image.width() == self.width && frame.image.height() == self.height {
            return Ok(());
        }
        Err(SplitError::encoder(
            self.segment,
            format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.image.width(),
                frame.image.height(),
                self.width,
                self.height
            ),
        ))
    }
}

fn encode_worker(
    spec: EncoderSpec,
    settings: H264Settings,
    sink: ChunkSink,
    mut frames: mpsc::Receiver<CapturedFrame>,
    ready: oneshot::Sender<SplitResult<()>>,
    ack: oneshot::Sender<SplitResult<()>>,
) {
    let segment = spec.index.value();
    let mut encoding = match CellEncoding::open(spec, &settings, sink) {
        Ok(encoding) => {
            let _ = ready.send(Ok(()));
            encoding
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    info!(segment, crf = settings.crf, preset = %settings.preset, "H.264 encoder opened");

    let mut result = Ok(());
    while let Some(frame) = frames.blocking_recv() {
        if let Err(e) = encoding
            .check_size(&frame)
            .and_then(|_| encoding.encode(frame))
        {
            warn!(segment, "Encoding failed: {}", e);
            result = Err(e);
            break;
        }
    }
    // Frames still queued after a failure are discarded
    drop(frames);

    if result.is_ok() {
        result = encoding.finish();
    }
    debug!(segment, packets = encoding.packets, "Encoder flushed");
    let _ = ack.send(result);
}

/// Copy a tightly packed, non-empty frame into a `width` x `height` RGB24 plane
///
/// Columns and rows beyond the image repeat its last column and row, so the
/// picture keeps its pixels and aspect ratio.
fn pad_rgb(image: &RgbFrame, width: u32, height: u32) -> VideoFrame {
    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_len = image.row_len();
    let last_row = image.height().saturating_sub(1) as usize;
    let bytes = image.as_bytes();
    let plane = frame.data_mut(0);

    for y in 0..height as usize {
        let src = y.min(last_row) * row_len;
        let start = y * stride;
        plane[start..start + row_len].copy_from_slice(&bytes[src..src + row_len]);
        for x in image.width() as usize..width as usize {
            plane.copy_within(start + row_len - 3..start + row_len, start + x * 3);
        }
    }
    frame
}

/// Smallest even value not below `value`
fn even(value: u32) -> u32 {
    value + (value & 1)
}
