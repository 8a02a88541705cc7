//! Configuration loading and precedence
//!
//! Values are resolved in the order CLI > environment (`GRIDSPLIT_*`) >
//! config file > defaults. This module covers the file, environment and
//! default layers; the CLI applies its flags on top.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::domain::model::SEGMENT_COUNT;
use crate::engine::EngineConfig;
use crate::error::{SplitError, SplitResult};
use crate::utils::logging::{LogFormat, LogLevel, LoggingConfig};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "GRIDSPLIT_";

/// Config files searched when none is given explicitly
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["gridsplit.toml", "config/gridsplit.toml"];

/// Highest constant rate factor accepted by x264
pub const MAX_CRF: u8 = 51;

/// Output codec of the per-cell encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 elementary stream via libx264
    H264,
    /// Uncompressed RGB24 frames
    Rawvideo,
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// Complete splitter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SplitterConfig {
    pub pipeline: PipelineConfig,
    pub encoder: EncoderConfig,
    pub logging: LoggingConfig,
}

/// Frame pump and assembly settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capture rate of every cell stream
    pub capture_fps: u32,
    /// Wait for encoders without flush acknowledgement
    pub grace_period_ms: u64,
    /// Upper bound on waiting for flush acknowledgements
    pub flush_timeout_ms: u64,
    /// Upper bound on waiting for source metadata
    pub metadata_timeout_ms: u64,
    /// Pace playback to the wall clock instead of running flat out
    pub realtime: bool,
    /// Refresh rate of the paced clock
    pub refresh_hz: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            capture_fps: engine.capture_fps,
            grace_period_ms: engine.grace_period.as_millis() as u64,
            flush_timeout_ms: engine.flush_timeout.as_millis() as u64,
            metadata_timeout_ms: engine.metadata_timeout.as_millis() as u64,
            realtime: false,
            refresh_hz: 60,
        }
    }
}

/// Per-cell encoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub codec: Codec,
    /// Constant rate factor, 0 to 51
    pub crf: u8,
    /// x264 preset name
    pub preset: String,
    /// Encoder threads per cell
    pub threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            crf: 23,
            preset: "medium".to_string(),
            threads: default_threads(),
        }
    }
}

/// Spread the available cores over the nine encoders
fn default_threads() -> usize {
    (num_cpus::get() / SEGMENT_COUNT).max(1)
}

impl SplitterConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> SplitResult<Self> {
        toml::from_str(content).map_err(|e| SplitError::Config {
            message: format!("Failed to parse TOML config: {}", e),
        })
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> SplitResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SplitError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the explicit file, else the first default file found, else defaults
    pub fn discover(explicit: Option<&Path>) -> SplitResult<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                return Ok((Self::load(path)?, Some(path.to_path_buf())));
            }
        }

        Ok((Self::default(), None))
    }

    /// Apply `GRIDSPLIT_*` overrides from the process environment
    pub fn apply_env(&mut self) -> SplitResult<usize> {
        self.apply_env_from(std::env::vars())
    }

    /// Apply `GRIDSPLIT_*` overrides from the given variables
    ///
    /// Returns the number of overrides applied. Unknown `GRIDSPLIT_*`
    /// variables are ignored.
    pub fn apply_env_from<I>(&mut self, vars: I) -> SplitResult<usize>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let known = match key {
                "CAPTURE_FPS" => set(&mut self.pipeline.capture_fps, &name, &value)?,
                "GRACE_PERIOD_MS" => set(&mut self.pipeline.grace_period_ms, &name, &value)?,
                "FLUSH_TIMEOUT_MS" => set(&mut self.pipeline.flush_timeout_ms, &name, &value)?,
                "METADATA_TIMEOUT_MS" => {
                    set(&mut self.pipeline.metadata_timeout_ms, &name, &value)?
                }
                "REALTIME" => set(&mut self.pipeline.realtime, &name, &value)?,
                "REFRESH_HZ" => set(&mut self.pipeline.refresh_hz, &name, &value)?,
                "CODEC" => set(&mut self.encoder.codec, &name, &value)?,
                "CRF" => set(&mut self.encoder.crf, &name, &value)?,
                "PRESET" => set(&mut self.encoder.preset, &name, &value)?,
                "THREADS" => set(&mut self.encoder.threads, &name, &value)?,
                "LOG_LEVEL" => set::<LogLevel>(&mut self.logging.level, &name, &value)?,
                "LOG_FORMAT" => set::<LogFormat>(&mut self.logging.format, &name, &value)?,
                _ => false,
            };
            if known {
                debug!("Environment override: {} = {}", name, value);
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> SplitResult<()> {
        if self.pipeline.capture_fps == 0 {
            return Err(config_error("capture_fps must be greater than zero"));
        }
        if self.pipeline.refresh_hz == 0 {
            return Err(config_error("refresh_hz must be greater than zero"));
        }
        if self.pipeline.flush_timeout_ms == 0 {
            return Err(config_error("flush_timeout_ms must be greater than zero"));
        }
        if self.pipeline.metadata_timeout_ms == 0 {
            return Err(config_error("metadata_timeout_ms must be greater than zero"));
        }
        if self.encoder.crf > MAX_CRF {
            return Err(config_error(format!(
                "crf must be between 0 and {}, got {}",
                MAX_CRF, self.encoder.crf
            )));
        }
        if self.encoder.preset.trim().is_empty() {
            return Err(config_error("preset must not be empty"));
        }
        if self.encoder.threads == 0 {
            return Err(config_error("threads must be greater than zero"));
        }
        Ok(())
    }

    /// Engine settings derived from the pipeline section
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            capture_fps: self.pipeline.capture_fps,
            grace_period: Duration::from_millis(self.pipeline.grace_period_ms),
            flush_timeout: Duration::from_millis(self.pipeline.flush_timeout_ms),
            metadata_timeout: Duration::from_millis(self.pipeline.metadata_timeout_ms),
        }
    }

    /// libx264 settings derived from the encoder section
    #[cfg(feature = "libav")]
    pub fn h264_settings(&self) -> crate::adapters::H264Settings {
        crate::adapters::H264Settings {
            crf: self.encoder.crf,
            preset: self.encoder.preset.clone(),
            threads: self.encoder.threads,
        }
    }
}

fn config_error(message: impl Into<String>) -> SplitError {
    SplitError::Config {
        message: message.into(),
    }
}

fn set<T>(slot: &mut T, name: &str, value: &str) -> SplitResult<bool>
where
    T: FromStr,
    T::Err: Display,
{
    *slot = value
        .trim()
        .parse()
        .map_err(|e| config_error(format!("{} has invalid value '{}': {}", name, value, e)))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = SplitterConfig::default();
        assert_eq!(config.pipeline.capture_fps, 30);
        assert_eq!(config.pipeline.grace_period_ms, 500);
        assert_eq!(config.pipeline.refresh_hz, 60);
        assert!(!config.pipeline.realtime);
        assert_eq!(config.encoder.codec, Codec::H264);
        assert_eq!(config.encoder.crf, 23);
        assert!(config.encoder.threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SplitterConfig::from_toml_str(
            r#"
            [pipeline]
            grace_period_ms = 250

            [encoder]
            codec = "rawvideo"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.grace_period_ms, 250);
        assert_eq!(config.pipeline.capture_fps, 30);
        assert_eq!(config.encoder.codec, Codec::Rawvideo);
        assert_eq!(config.encoder.preset, "medium");
        assert_eq!(config.engine_config().grace_period, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            SplitterConfig::from_toml_str("[pipeline\ncapture_fps = 30"),
            Err(SplitError::Config { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SplitterConfig::default();
        let applied = config
            .apply_env_from(vars(&[
                ("GRIDSPLIT_CRF", "18"),
                ("GRIDSPLIT_CODEC", "RAWVIDEO"),
                ("GRIDSPLIT_REALTIME", "true"),
                ("GRIDSPLIT_LOG_FORMAT", "json"),
                ("GRIDSPLIT_UNKNOWN", "1"),
                ("HOME", "/root"),
            ]))
            .unwrap();
        assert_eq!(applied, 4);
        assert_eq!(config.encoder.crf, 18);
        assert_eq!(config.encoder.codec, Codec::Rawvideo);
        assert!(config.pipeline.realtime);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = SplitterConfig::default();
        let err = config
            .apply_env_from(vars(&[("GRIDSPLIT_CAPTURE_FPS", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("GRIDSPLIT_CAPTURE_FPS"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SplitterConfig::default();
        config.pipeline.capture_fps = 0;
        assert!(config.validate().is_err());

        let mut config = SplitterConfig::default();
        config.encoder.crf = 52;
        assert!(config.validate().is_err());

        let mut config = SplitterConfig::default();
        config.pipeline.refresh_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridsplit.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let (config, source) = SplitterConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(SplitterConfig::discover(Some(&missing)).is_err());
    }
}
