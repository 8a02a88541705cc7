//! Error handling module for GridSplit

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for splitting operations
#[derive(Error, Debug)]
pub enum SplitError {
    /// Drawing surface or encoder could not be allocated
    #[error("Setup failed: {message}")]
    Setup { message: String },

    /// Source metadata never became available
    #[error("Source metadata not ready after {waited_ms} ms")]
    MetadataTimeout { waited_ms: u64 },

    /// Source could not be opened or decoded
    #[error("Source error: {message}")]
    Source { message: String },

    /// Encoder failed while running or flushing
    #[error("Encoder error on segment {segment}: {message}")]
    Encoder { segment: usize, message: String },

    /// Encoders did not acknowledge their flush in time
    #[error("Encoder flush not acknowledged after {waited_ms} ms")]
    FlushTimeout { waited_ms: u64 },

    /// Segment export failed
    #[error("Failed to export segment: {message}")]
    Export { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The run was abandoned by a reset
    #[error("Run cancelled by reset")]
    Cancelled,

    /// Domain invariant violated
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[cfg(feature = "libav")]
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

impl SplitError {
    pub(crate) fn setup(message: impl Into<String>) -> Self {
        SplitError::Setup {
            message: message.into(),
        }
    }

    pub(crate) fn source(message: impl Into<String>) -> Self {
        SplitError::Source {
            message: message.into(),
        }
    }

    pub(crate) fn encoder(segment: usize, message: impl Into<String>) -> Self {
        SplitError::Encoder {
            segment,
            message: message.into(),
        }
    }
}

/// Result type alias for splitting operations
pub type SplitResult<T> = std::result::Result<T, SplitError>;
