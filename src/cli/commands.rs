//! Command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adapters::libav_source::{self, LibavSource};
use crate::adapters::{
    FreeRunningRefresh, LibavEncoderFactory, PacedRefresh, RawVideoEncoderFactory,
};
use crate::cli::args::{InspectArgs, SplitArgs};
use crate::config::{Codec, SplitterConfig};
use crate::domain::model::*;
use crate::domain::rules::{IntakeRules, NamingRules};
use crate::engine::{
    forward_progress, ConsoleProgressCallback, GridSplitter, JsonProgressCallback,
    ProgressCallback,
};
use crate::error::{SplitError, SplitResult};
use crate::output::{ExportRecord, SegmentWriter};
use crate::ports::{EncoderFactory, FrameSource, RefreshClock};
use crate::utils::Utils;

/// Encoder factory for the configured codec
pub fn encoder_factory(config: &SplitterConfig) -> Arc<dyn EncoderFactory> {
    match config.encoder.codec {
        Codec::H264 => Arc::new(LibavEncoderFactory::new(config.h264_settings())),
        Codec::Rawvideo => Arc::new(RawVideoEncoderFactory),
    }
}

/// Execute the split command
pub async fn split(args: SplitArgs, config: SplitterConfig) -> Result<()> {
    if !IntakeRules::is_video_file(&args.input) {
        warn!("Ignoring {}: not a video file", args.input.display());
        return Ok(());
    }
    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let output_dir = args.resolved_output_dir();
    info!("Input: {}", args.input.display());
    info!("Output directory: {}", output_dir.display());
    info!(codec = ?config.encoder.codec, realtime = config.pipeline.realtime, "Starting split");

    let splitter = GridSplitter::new(config.engine_config(), encoder_factory(&config));
    let callback: Arc<dyn ProgressCallback> = if args.json {
        Arc::new(JsonProgressCallback)
    } else {
        Arc::new(ConsoleProgressCallback::new(true))
    };
    let reporter = tokio::spawn(forward_progress(splitter.subscribe(), callback));

    let started = Instant::now();
    let mut source = LibavSource::open(&args.input).context("Failed to open input file")?;
    let outcome = if config.pipeline.realtime {
        let mut refresh = PacedRefresh::new(config.pipeline.refresh_hz);
        run_until_interrupted(&splitter, &mut source, &mut refresh).await
    } else {
        run_until_interrupted(&splitter, &mut source, &mut FreeRunningRefresh).await
    };

    // A failure before the first state change leaves the reporter waiting
    if outcome.is_err() && !splitter.state().status.is_terminal() {
        reporter.abort();
    }
    let _ = reporter.await;

    let segments = match outcome {
        Ok(segments) => segments,
        Err(SplitError::Cancelled) => anyhow::bail!("Split cancelled"),
        Err(e) => return Err(e).context("Split failed"),
    };

    let records = SegmentWriter::new(&output_dir)
        .export_all(&segments)
        .context("Failed to export segments")?;
    report_exports(&records, args.json)?;

    info!(
        "Split completed in {}",
        Utils::format_duration(started.elapsed())
    );
    Ok(())
}

/// Run the splitter; Ctrl-C resets the run instead of killing the process
async fn run_until_interrupted<S, R>(
    splitter: &GridSplitter,
    source: &mut S,
    refresh: &mut R,
) -> SplitResult<Vec<Segment>>
where
    S: FrameSource + ?Sized,
    R: RefreshClock + ?Sized,
{
    let run = splitter.split(source, refresh);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, resetting run");
            splitter.reset();
            run.await
        }
    }
}

fn report_exports(records: &[ExportRecord], json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "event": "exported",
            "files": records,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        println!("{}", line);
        return Ok(());
    }

    println!("Exported {} segments:", records.len());
    for record in records {
        println!(
            "  {} ({})",
            record.path.display(),
            Utils::format_file_size(record.bytes)
        );
    }
    Ok(())
}

/// Layout of one cell as reported by `inspect`
#[derive(Debug, Serialize)]
struct CellReport {
    index: usize,
    row: u32,
    col: u32,
    file_name: String,
    rect: CellRect,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    input: PathBuf,
    metadata: VideoMetadata,
    geometry: GridGeometry,
    cells: Vec<CellReport>,
}

/// Execute the inspect command
pub fn inspect(args: InspectArgs, config: SplitterConfig) -> Result<()> {
    info!("Inspecting video file: {}", args.input.display());

    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let metadata = libav_source::probe(&args.input).context("Failed to inspect input file")?;
    let geometry = GridGeometry::from_metadata(&metadata);
    let extension = encoder_factory(&config).extension();

    let cells = SegmentIndex::all()
        .map(|index| CellReport {
            index: index.value(),
            row: index.row() + 1,
            col: index.col() + 1,
            file_name: NamingRules::download_name(index, extension),
            rect: geometry.cell_rect(index),
        })
        .collect();
    let report = InspectReport {
        input: args.input,
        metadata,
        geometry,
        cells,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let metadata = &report.metadata;
    println!("File: {}", report.input.display());
    println!("Resolution: {}x{}", metadata.width, metadata.height);
    println!(
        "Duration: {}",
        Utils::format_duration(Duration::from_secs_f64(metadata.duration.max(0.0)))
    );
    if let Some(rate) = metadata.frame_rate {
        println!("Frame rate: {:.3} fps", rate);
    }
    if let Some(codec) = &metadata.codec {
        println!("Codec: {}", codec);
    }
    println!(
        "Cell size: {}x{}",
        report.geometry.cell_width, report.geometry.cell_height
    );
    if report.geometry.is_empty() {
        println!("Warning: the video is too small to split into a 3x3 grid");
    }
    for cell in &report.cells {
        println!(
            "  {} <- {}x{} at ({}, {})",
            cell.file_name, cell.rect.width, cell.rect.height, cell.rect.x, cell.rect.y
        );
    }
    Ok(())
}
