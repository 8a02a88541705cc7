// Domain rules - Progress, naming and intake policies

use std::path::Path;

use crate::domain::model::*;

/// Extensions accepted as video input
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "wmv", "flv", "mpg", "mpeg", "ts", "mts", "m2ts",
    "3gp", "ogv",
];

/// Rules for computing the published progress percentage
pub struct ProgressRules;

impl ProgressRules {
    /// `round(current / duration * 100)`, clamped to 0..=100
    pub fn percent(current_time: f64, duration: f64) -> u8 {
        if !duration.is_finite() || duration <= 0.0 || !current_time.is_finite() {
            return 0;
        }
        (current_time / duration * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Progress while processing never reaches 100; that value is reserved for completion
    pub fn while_processing(current_time: f64, duration: f64) -> u8 {
        Self::percent(current_time, duration).min(99)
    }
}

/// Rules for naming exported files
pub struct NamingRules;

impl NamingRules {
    /// `segment_{row}_{col}.{ext}` with 1-indexed row and column
    pub fn download_name(index: SegmentIndex, extension: &str) -> String {
        format!("segment_{}_{}.{}", index.row() + 1, index.col() + 1, extension)
    }
}

/// Rules for accepting input files
pub struct IntakeRules;

impl IntakeRules {
    /// Whether the path names a file with a video media type
    pub fn is_video_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                VIDEO_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}
