//! Command-line argument definitions

use clap::Args;
use clap_num::number_range;
use std::path::{Path, PathBuf};

use crate::config::{Codec, SplitterConfig, MAX_CRF};

fn parse_crf(s: &str) -> Result<u8, String> {
    number_range(s, 0, MAX_CRF)
}

/// Arguments for the split command
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory receiving the nine segment files (default: <input>_segments)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Per-cell output codec
    #[arg(long, value_enum)]
    pub codec: Option<Codec>,

    /// Constant Rate Factor (0-51)
    #[arg(long, value_parser = parse_crf)]
    pub crf: Option<u8>,

    /// Encoding preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Play the source in real time instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Wait for encoders without flush acknowledgement, in milliseconds
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Report progress as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl SplitArgs {
    /// Apply flags given on the command line over the resolved configuration
    pub fn apply(&self, config: &mut SplitterConfig) {
        if let Some(codec) = self.codec {
            config.encoder.codec = codec;
        }
        if let Some(crf) = self.crf {
            config.encoder.crf = crf;
        }
        if let Some(preset) = &self.preset {
            config.encoder.preset = preset.clone();
        }
        if self.realtime {
            config.pipeline.realtime = true;
        }
        if let Some(grace_ms) = self.grace_ms {
            config.pipeline.grace_period_ms = grace_ms;
        }
    }

    /// Output directory, defaulting to `<stem>_segments` beside the input
    pub fn resolved_output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        self.input
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{}_segments", stem))
    }
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
