//! CLI module for GridSplit
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::config::SplitterConfig;
use crate::error::SplitResult;
use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

pub use args::{InspectArgs, SplitArgs};

/// GridSplit
///
/// Splits a video composed as a 3x3 grid into nine independent per-cell videos.
#[derive(Parser, Debug)]
#[command(name = "gridsplit")]
#[command(about = "GridSplit - Split a 3x3 grid video into nine videos")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Logging format
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    /// Configuration file (default: gridsplit.toml or config/gridsplit.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a grid video into nine segment files
    Split(SplitArgs),
    /// Show video metadata and the cell layout
    Inspect(InspectArgs),
}

/// Configuration resolved before logging is up, with where it came from
#[derive(Debug)]
pub struct ResolvedConfig {
    pub config: SplitterConfig,
    pub file: Option<PathBuf>,
    pub env_overrides: usize,
}

impl ResolvedConfig {
    /// Report the configuration sources; call once logging is initialized
    pub fn log_sources(&self) {
        match &self.file {
            Some(path) => info!("Configuration file: {}", path.display()),
            None => info!("No configuration file found, using defaults"),
        }
        if self.env_overrides > 0 {
            info!("Applied {} environment variable overrides", self.env_overrides);
        }
    }
}

impl Cli {
    /// Resolve configuration with precedence CLI > environment > file > defaults
    pub fn resolve_config(&self) -> SplitResult<ResolvedConfig> {
        let (mut config, file) = SplitterConfig::discover(self.config.as_deref())?;
        let env_overrides = config.apply_env()?;

        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Commands::Split(args) = &self.command {
            args.apply(&mut config);
        }

        config.validate()?;
        Ok(ResolvedConfig {
            config,
            file,
            env_overrides,
        })
    }
}
