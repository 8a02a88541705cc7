// LibAV source adapter - Decodes a video file into RGB24 frames

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ffmpeg_next::format::Pixel;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::domain::model::*;
use crate::error::{SplitError, SplitResult};
use crate::ports::{FrameSource, Playback};

/// Decoded frames buffered ahead of the playback clock
const FRAME_QUEUE_DEPTH: usize = 8;
/// Tolerance when comparing frame times against a playback target
const CLOCK_EPSILON: f64 = 1e-6;

enum DecodeEvent {
    Metadata(VideoMetadata),
    Frame { time: f64, image: RgbFrame },
    End,
    Failed(String),
}

/// Read metadata of the best video stream without decoding
pub fn probe(path: &Path) -> SplitResult<VideoMetadata> {
    let input = ffmpeg_next::format::input(&path)
        .map_err(|e| SplitError::source(format!("Failed to open {}: {}", path.display(), e)))?;
    let (_, decoder) = open_video_decoder(&input)?;
    Ok(read_metadata(&input, &decoder))
}

/// Video file played through libavformat and libavcodec
///
/// Decoding runs on a dedicated thread that opens the file immediately,
/// publishes metadata and then waits for `start` before producing frames.
/// A source plays once; open the file again for another run.
pub struct LibavSource {
    metadata: Option<VideoMetadata>,
    events: mpsc::Receiver<DecodeEvent>,
    start: Option<oneshot::Sender<()>>,
    lookahead: Option<(f64, RgbFrame)>,
    frame: Option<RgbFrame>,
    time: f64,
    exhausted: bool,
}

impl LibavSource {
    pub fn open(path: impl Into<PathBuf>) -> SplitResult<Self> {
        let path = path.into();
        let (event_tx, events) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (start, start_rx) = oneshot::channel();

        info!("Opened source {}", path.display());
        thread::Builder::new()
            .name("gridsplit-decode".to_string())
            .spawn(move || decode_worker(path, event_tx, start_rx))?;

        Ok(Self {
            metadata: None,
            events,
            start: Some(start),
            lookahead: None,
            frame: None,
            time: 0.0,
            exhausted: false,
        })
    }

    async fn next_event(&mut self) -> SplitResult<DecodeEvent> {
        match self.events.recv().await {
            Some(DecodeEvent::Failed(message)) => Err(SplitError::source(message)),
            Some(event) => Ok(event),
            None => Err(SplitError::source("decoder stopped unexpectedly")),
        }
    }

    /// Next decoded frame, or None once the stream is exhausted
    async fn next_frame(&mut self) -> SplitResult<Option<(f64, RgbFrame)>> {
        if let Some(frame) = self.lookahead.take() {
            return Ok(Some(frame));
        }
        if self.exhausted {
            return Ok(None);
        }
        loop {
            match self.next_event().await? {
                DecodeEvent::Frame { time, image } => return Ok(Some((time, image))),
                DecodeEvent::End => {
                    self.exhausted = true;
                    return Ok(None);
                }
                DecodeEvent::Metadata(_) => continue,
                DecodeEvent::Failed(message) => return Err(SplitError::source(message)),
            }
        }
    }
}

#[async_trait]
impl FrameSource for LibavSource {
    fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata.clone()
    }

    async fn wait_for_metadata(&mut self) -> SplitResult<VideoMetadata> {
        if let Some(metadata) = &self.metadata {
            return Ok(metadata.clone());
        }
        match self.next_event().await? {
            DecodeEvent::Metadata(metadata) => {
                debug!(?metadata, "Source metadata loaded");
                self.metadata = Some(metadata.clone());
                Ok(metadata)
            }
            _ => Err(SplitError::source("decoder produced frames before metadata")),
        }
    }

    async fn start(&mut self) -> SplitResult<()> {
        let start = self
            .start
            .take()
            .ok_or_else(|| SplitError::source("source already played; open the file again"))?;
        start
            .send(())
            .map_err(|_| SplitError::source("decoder stopped before playback started"))
    }

    async fn advance(&mut self, target: Option<f64>) -> SplitResult<Playback> {
        if self.start.is_some() {
            return Err(SplitError::source("advance called before start"));
        }

        let Some(target) = target else {
            return match self.next_frame().await? {
                Some((time, image)) => {
                    self.time = time;
                    self.frame = Some(image);
                    Ok(Playback::Playing)
                }
                None => Ok(Playback::Ended),
            };
        };

        let mut moved = false;
        while let Some((time, image)) = self.next_frame().await? {
            if self.frame.is_some() && time > target + CLOCK_EPSILON {
                self.lookahead = Some((time, image));
                break;
            }
            self.time = time;
            self.frame = Some(image);
            moved = true;
        }

        if moved || self.lookahead.is_some() {
            Ok(Playback::Playing)
        } else {
            Ok(Playback::Ended)
        }
    }

    fn current_frame(&self) -> Option<&RgbFrame> {
        self.frame.as_ref()
    }

    fn current_time(&self) -> f64 {
        self.time
    }
}

fn decode_worker(path: PathBuf, events: mpsc::Sender<DecodeEvent>, start: oneshot::Receiver<()>) {
    if let Err(e) = decode(&path, &events, start) {
        warn!("Decoding {} failed: {}", path.display(), e);
        let _ = events.blocking_send(DecodeEvent::Failed(e.to_string()));
    }
}

fn decode(
    path: &Path,
    events: &mpsc::Sender<DecodeEvent>,
    start: oneshot::Receiver<()>,
) -> SplitResult<()> {
    let mut input = ffmpeg_next::format::input(&path)
        .map_err(|e| SplitError::source(format!("Failed to open {}: {}", path.display(), e)))?;
    let (stream_index, mut decoder) = open_video_decoder(&input)?;
    let time_base = input
        .stream(stream_index)
        .map(|stream| f64::from(stream.time_base()))
        .unwrap_or(0.0);

    if events
        .blocking_send(DecodeEvent::Metadata(read_metadata(&input, &decoder)))
        .is_err()
        || start.blocking_recv().is_err()
    {
        debug!("Source dropped before playback");
        return Ok(());
    }

    let mut scaler = Scaler::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    )?;
    let mut clock = FrameClock::new(time_base);
    let mut decoded = VideoFrame::empty();

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            if !emit(&mut scaler, &mut clock, &decoded, events)? {
                return Ok(());
            }
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded).is_ok() {
        if !emit(&mut scaler, &mut clock, &decoded, events)? {
            return Ok(());
        }
    }

    debug!(frames = clock.frames, "Decoder reached end of stream");
    let _ = events.blocking_send(DecodeEvent::End);
    Ok(())
}

/// Convert and send one decoded frame; false once the source is gone
fn emit(
    scaler: &mut Scaler,
    clock: &mut FrameClock,
    decoded: &VideoFrame,
    events: &mpsc::Sender<DecodeEvent>,
) -> SplitResult<bool> {
    let mut rgb = VideoFrame::empty();
    scaler.run(decoded, &mut rgb)?;
    let time = clock.time_of(decoded.timestamp().or(decoded.pts()));
    let image = pack_rgb(&rgb)?;
    Ok(events
        .blocking_send(DecodeEvent::Frame { time, image })
        .is_ok())
}

/// Copy a possibly padded RGB24 plane into a tightly packed frame
fn pack_rgb(frame: &VideoFrame) -> SplitResult<RgbFrame> {
    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let row_len = width as usize * 3;
    let plane = frame.data(0);

    let mut data = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        data.extend_from_slice(&plane[start..start + row_len]);
    }
    Ok(RgbFrame::from_raw(width, height, data)?)
}

/// Presentation time of decoded frames, relative to the first frame
struct FrameClock {
    time_base: f64,
    origin: Option<i64>,
    last: f64,
    frames: u64,
}

impl FrameClock {
    fn new(time_base: f64) -> Self {
        Self {
            time_base,
            origin: None,
            last: 0.0,
            frames: 0,
        }
    }

    fn time_of(&mut self, timestamp: Option<i64>) -> f64 {
        self.frames += 1;
        let time = match timestamp {
            Some(ts) if self.time_base > 0.0 => {
                let origin = *self.origin.get_or_insert(ts);
                (ts - origin) as f64 * self.time_base
            }
            _ => self.last,
        };
        // Playback time never runs backwards
        self.last = time.max(self.last);
        self.last
    }
}

fn open_video_decoder(
    input: &ffmpeg_next::format::context::Input,
) -> SplitResult<(usize, ffmpeg_next::decoder::Video)> {
    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| SplitError::source("No video stream found in input file"))?;
    let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()?;
    Ok((stream.index(), decoder))
}

fn read_metadata(
    input: &ffmpeg_next::format::context::Input,
    decoder: &ffmpeg_next::decoder::Video,
) -> VideoMetadata {
    let stream = input.streams().best(Type::Video);

    let mut duration = if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
    } else {
        0.0
    };
    if duration <= 0.0 {
        if let Some(stream) = &stream {
            if stream.duration() > 0 {
                duration = stream.duration() as f64 * f64::from(stream.time_base());
            }
        }
    }

    let mut metadata = VideoMetadata::new(decoder.width(), decoder.height(), duration)
        .with_codec(decoder.id().name());
    if let Some(stream) = &stream {
        let rate = stream.avg_frame_rate();
        if rate.numerator() > 0 && rate.denominator() > 0 {
            metadata = metadata.with_frame_rate(f64::from(rate));
        }
    }
    metadata
}
