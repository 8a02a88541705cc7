//! Segment file writer

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::model::Segment;
use crate::error::{SplitError, SplitResult};
use crate::output::{prepare_download, Download, ExportRecord};

/// Writes segment downloads into an output directory
pub struct SegmentWriter {
    output_dir: PathBuf,
}

impl SegmentWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save one segment; a segment without artifact is skipped
    pub fn export_segment(&self, segment: &Segment) -> SplitResult<Option<ExportRecord>> {
        let Some(download) = prepare_download(segment) else {
            debug!(segment = segment.index.value(), "No artifact to export");
            return Ok(None);
        };

        let path = self.write_atomic(&download)?;
        info!(
            segment = segment.index.value(),
            bytes = download.bytes.len(),
            "Exported {}",
            path.display()
        );
        Ok(Some(ExportRecord {
            segment: segment.index.value(),
            row: segment.row() + 1,
            col: segment.col() + 1,
            file_name: download.file_name,
            path,
            bytes: download.bytes.len() as u64,
        }))
    }

    /// Save every segment in increasing index order
    pub fn export_all(&self, segments: &[Segment]) -> SplitResult<Vec<ExportRecord>> {
        let mut ordered: Vec<&Segment> = segments.iter().collect();
        ordered.sort_by_key(|segment| segment.index);

        let mut records = Vec::with_capacity(ordered.len());
        for segment in ordered {
            if let Some(record) = self.export_segment(segment)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Write to a temporary file in the target directory, then rename over the target
    fn write_atomic(&self, download: &Download) -> SplitResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| SplitError::Export {
            message: format!(
                "Failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ),
        })?;

        let target = self.output_dir.join(&download.file_name);
        let mut temp = NamedTempFile::new_in(&self.output_dir).map_err(|e| SplitError::Export {
            message: format!("Failed to create temporary file: {}", e),
        })?;
        temp.write_all(&download.bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| SplitError::Export {
            message: format!("Failed to move file into place at {}: {}", target.display(), e),
        })?;
        Ok(target)
    }
}
