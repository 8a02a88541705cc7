// Domain errors - Error types for the domain layer

use std::fmt;

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Segment index outside the 3x3 grid
    InvalidSegmentIndex(usize),
    /// Pixel buffer does not match its declared dimensions
    InvalidFrameBuffer(String),
    /// Rectangle does not fit inside the frame it is read from
    RegionOutOfBounds(String),
    /// Completion attempted with an incomplete segment set
    IncompleteSegments(usize),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::InvalidSegmentIndex(index) => {
                write!(f, "Invalid segment index: {} (expected 0-8)", index)
            }
            DomainError::InvalidFrameBuffer(msg) => write!(f, "Invalid frame buffer: {}", msg),
            DomainError::RegionOutOfBounds(msg) => write!(f, "Region out of bounds: {}", msg),
            DomainError::IncompleteSegments(count) => {
                write!(f, "Incomplete segment set: {} of 9 segments finished", count)
            }
        }
    }
}

impl std::error::Error for DomainError {}
