//! Segment download and export module

use serde::Serialize;

use crate::domain::model::Segment;
use crate::domain::rules::NamingRules;

pub mod writer;

pub use writer::SegmentWriter;

/// A finished segment ready to be saved under its download name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    /// `segment_{row}_{col}.<ext>`, 1-indexed
    pub file_name: String,
    pub media_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Build the download for a segment; None if it has no artifact
pub fn prepare_download(segment: &Segment) -> Option<Download> {
    let artifact = segment.artifact.as_ref()?;
    Some(Download {
        file_name: NamingRules::download_name(segment.index, artifact.extension),
        media_type: artifact.media_type,
        bytes: artifact.bytes.clone(),
    })
}

/// Summary of one exported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    pub segment: usize,
    pub row: u32,
    pub col: u32,
    pub file_name: String,
    pub path: std::path::PathBuf,
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Artifact, SegmentIndex};

    #[test]
    fn test_download_name_and_content() {
        let index = SegmentIndex::new(5).unwrap();
        let segment = Segment::finished(
            index,
            Artifact {
                media_type: "video/h264",
                extension: "h264",
                bytes: vec![0, 0, 0, 1, 0x67],
            },
        );
        let download = prepare_download(&segment).unwrap();
        assert_eq!(download.file_name, "segment_2_3.h264");
        assert_eq!(download.media_type, "video/h264");
        assert_eq!(download.bytes, vec![0, 0, 0, 1, 0x67]);
    }

    #[test]
    fn test_pending_segment_has_no_download() {
        let segment = Segment::pending(SegmentIndex::new(0).unwrap());
        assert!(prepare_download(&segment).is_none());
    }
}
