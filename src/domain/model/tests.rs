// Unit tests for domain models

use super::*;
use std::collections::HashSet;

#[test]
fn test_geometry_truncates_to_thirds() {
    for (w, h) in [(1920, 1080), (1280, 720), (1000, 1001), (3, 3), (2, 2), (641, 359)] {
        let geometry = GridGeometry::from_dimensions(w, h);
        assert_eq!(geometry.cell_width, w / 3);
        assert_eq!(geometry.cell_height, h / 3);
        assert!(geometry.cell_width * 3 <= w && w - geometry.cell_width * 3 < 3);
        assert!(geometry.cell_height * 3 <= h && h - geometry.cell_height * 3 < 3);
    }
}

#[test]
fn test_geometry_empty_below_three_pixels() {
    assert!(GridGeometry::from_dimensions(2, 900).is_empty());
    assert!(GridGeometry::from_dimensions(900, 2).is_empty());
    assert!(!GridGeometry::from_dimensions(3, 3).is_empty());
}

#[test]
fn test_segment_index_row_col() {
    for i in 0..SEGMENT_COUNT {
        let index = SegmentIndex::new(i).unwrap();
        assert_eq!(index.row(), (i / 3) as u32);
        assert_eq!(index.col(), (i % 3) as u32);
        assert_eq!(SegmentIndex::from_position(index.row(), index.col()).unwrap(), index);
    }
}

#[test]
fn test_segment_index_is_bijection_onto_grid() {
    let positions: HashSet<(u32, u32)> = SegmentIndex::all().map(|i| (i.row(), i.col())).collect();
    assert_eq!(positions.len(), SEGMENT_COUNT);
    for row in 0..3 {
        for col in 0..3 {
            assert!(positions.contains(&(row, col)));
        }
    }
}

#[test]
fn test_segment_index_rejects_out_of_range() {
    assert_eq!(SegmentIndex::new(9), Err(DomainError::InvalidSegmentIndex(9)));
    assert!(SegmentIndex::from_position(3, 0).is_err());
    assert!(SegmentIndex::from_position(0, 3).is_err());
    assert!(SegmentIndex::from_position(u32::MAX, 0).is_err());
    assert!(SegmentIndex::from_position(u32::MAX, u32::MAX).is_err());
}

#[test]
fn test_cell_rects_tile_source_without_overlap() {
    let geometry = GridGeometry::from_dimensions(91, 62);
    let mut covered = HashSet::new();
    for index in SegmentIndex::all() {
        let rect = geometry.cell_rect(index);
        assert_eq!(rect.width, 30);
        assert_eq!(rect.height, 20);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                assert!(covered.insert((x, y)), "pixel ({}, {}) covered twice", x, y);
            }
        }
    }
    assert_eq!(covered.len(), 90 * 60);
}

#[test]
fn test_rgb_frame_from_raw_checks_length() {
    assert!(RgbFrame::from_raw(2, 2, vec![0; 12]).is_ok());
    assert!(matches!(
        RgbFrame::from_raw(2, 2, vec![0; 11]),
        Err(DomainError::InvalidFrameBuffer(_))
    ));
}

#[test]
fn test_crop_into_copies_exact_region() {
    let mut frame = RgbFrame::new(9, 6);
    let geometry = GridGeometry::from_dimensions(9, 6);
    for index in SegmentIndex::all() {
        let shade = index.value() as u8 * 20;
        frame.fill_rect(geometry.cell_rect(index), [shade, 255 - shade, 7]);
    }

    for index in SegmentIndex::all() {
        let mut cell = RgbFrame::new(geometry.cell_width, geometry.cell_height);
        frame.crop_into(geometry.cell_rect(index), &mut cell).unwrap();
        let shade = index.value() as u8 * 20;
        for y in 0..cell.height() {
            for x in 0..cell.width() {
                assert_eq!(cell.pixel(x, y), Some([shade, 255 - shade, 7]));
            }
        }
    }
}

#[test]
fn test_crop_into_rejects_bad_regions() {
    let frame = RgbFrame::new(6, 6);
    let mut target = RgbFrame::new(4, 4);
    let outside = CellRect { x: 3, y: 3, width: 4, height: 4 };
    assert!(matches!(
        frame.crop_into(outside, &mut target),
        Err(DomainError::RegionOutOfBounds(_))
    ));

    let mismatched = CellRect { x: 0, y: 0, width: 2, height: 2 };
    assert!(matches!(
        frame.crop_into(mismatched, &mut target),
        Err(DomainError::InvalidFrameBuffer(_))
    ));
}

#[test]
fn test_status_terminal_states() {
    assert!(!ProcessingStatus::Idle.is_terminal());
    assert!(!ProcessingStatus::Processing.is_terminal());
    assert!(ProcessingStatus::Completed.is_terminal());
    assert!(ProcessingStatus::Error.is_terminal());
    assert_eq!(ProcessingStatus::Processing.to_string(), "processing");
}

#[test]
fn test_segment_lifecycle() {
    let index = SegmentIndex::new(5).unwrap();
    let pending = Segment::pending(index);
    assert!(!pending.is_finished());

    let artifact = Artifact {
        media_type: "video/h264",
        extension: "h264",
        bytes: vec![1, 2, 3],
    };
    let finished = Segment::finished(index, artifact);
    assert!(finished.is_finished());
    assert_eq!((finished.row(), finished.col()), (1, 2));
}
