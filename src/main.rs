//! GridSplit
//!
//! Splits a video composed as a 3x3 grid into nine independent per-cell videos.
//!
//! # Usage
//!
//! ```bash
//! gridsplit split --input grid.mp4 --output-dir cells
//! gridsplit split --input grid.mp4 --codec rawvideo --json
//! gridsplit inspect --input grid.mp4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gridsplit::cli::{commands, Cli, Commands};
use gridsplit::utils::logging::LoggingSystem;

/// Main entry point for the GridSplit CLI application
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();
    let resolved = cli.resolve_config().context("Invalid configuration")?;

    // Initialize logging
    let logging = LoggingSystem::new(resolved.config.logging.clone());
    logging.initialize()?;
    logging.log_system_info();
    resolved.log_sources();
    let config = resolved.config;

    gridsplit::init()?;

    // Execute the requested command
    match cli.command {
        Commands::Split(args) => {
            info!("Executing split command");
            commands::split(args, config).await?;
        }
        Commands::Inspect(args) => {
            info!("Executing inspect command");
            commands::inspect(args, config)?;
        }
    }

    info!("GridSplit completed successfully");
    Ok(())
}
