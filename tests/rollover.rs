//! Part rollover tests
//!
//! A payload added with `add_file` never spans two parts, parts only grow
//! past the limit when a single payload is larger than it, and every part
//! but the last is sealed with a non-final trailer.

mod common;

use common::part_path;
use parcel_rs::core::io::read_trailer;
use parcel_rs::{Exporter, FileRecord, Importer, Result, TRAILER_SIZE};
use proptest::prelude::*;
use tempfile::TempDir;

const LIMIT: u64 = 1 << 20;

fn export_sizes(dir: &TempDir, limit: u64, sizes: &[usize]) -> Result<Vec<FileRecord>> {
    let mut exporter = Exporter::new(dir.path(), limit)?;
    let mut records = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let data = common::payload(i as u8, *size);
        records.push(exporter.add_bytes(&format!("source-{}", i + 1), &data, None)?);
    }
    exporter.commit()?;
    Ok(records)
}

fn assert_all_verify(importer: &Importer, sizes: &[usize]) -> Result<()> {
    for (i, size) in sizes.iter().enumerate() {
        let content = importer.read_file(&format!("source-{}", i + 1))?;
        assert_eq!(content, common::payload(i as u8, *size));
    }
    assert!(importer.verify_all()?.is_empty());
    Ok(())
}

#[test]
fn test_sources_filling_first_part_then_rolling() -> Result<()> {
    // 10 + (L - 15) leaves room for nothing else in part 1
    let sizes = [10, LIMIT as usize - 15, 4096];
    let dir = TempDir::new().unwrap();
    let records = export_sizes(&dir, LIMIT, &sizes)?;

    assert_eq!((records[0].part, records[0].offset), (1, 0));
    assert_eq!((records[1].part, records[1].offset), (1, 10));
    assert_eq!((records[2].part, records[2].offset), (2, 0));

    let importer = Importer::open(dir.path())?;
    assert_eq!(importer.part_count(), 2);

    let first = read_trailer(part_path(dir.path(), 1))?;
    assert!(!first.trailer.is_last);
    assert_eq!(first.len, LIMIT - 5 + TRAILER_SIZE as u64);

    let last = read_trailer(part_path(dir.path(), 2))?;
    assert!(last.trailer.is_last);
    assert_eq!(last.trailer.part_number, 2);

    assert_all_verify(&importer, &sizes)
}

#[test]
fn test_source_crossing_limit_starts_new_part() -> Result<()> {
    // 10 + (L - 5) exceeds L, so source 2 must start part 2
    let sizes = [10, LIMIT as usize - 5, 4096];
    let dir = TempDir::new().unwrap();
    let records = export_sizes(&dir, LIMIT, &sizes)?;

    assert_eq!((records[0].part, records[0].offset), (1, 0));
    assert_eq!((records[1].part, records[1].offset), (2, 0));
    assert_eq!((records[2].part, records[2].offset), (3, 0));

    let importer = Importer::open(dir.path())?;
    assert_eq!(importer.part_count(), 3);

    for number in 1..3 {
        let info = read_trailer(part_path(dir.path(), number))?;
        assert_eq!(info.trailer.part_number, number);
        assert!(!info.trailer.is_last);
    }
    assert!(read_trailer(part_path(dir.path(), 3))?.trailer.is_last);

    assert_all_verify(&importer, &sizes)
}

#[test]
fn test_exact_fit_does_not_roll() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let records = export_sizes(&dir, 100, &[40, 60])?;
    assert_eq!((records[1].part, records[1].offset), (1, 40));
    Ok(())
}

#[test]
fn test_metadata_rolls_into_its_own_part() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let records = export_sizes(&dir, 64, &[64])?;
    assert_eq!(records[0].part, 1);

    // The metadata block did not fit after a full part
    let importer = Importer::open(dir.path())?;
    assert_eq!(importer.part_count(), 2);
    assert_eq!(importer.read_file("source-1")?, common::payload(0, 64));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_parts_respect_limit(
        sizes in prop::collection::vec(0usize..600, 1..20),
        limit in 1u64..1024
    ) {
        let dir = TempDir::new().unwrap();
        let records = export_sizes(&dir, limit, &sizes).unwrap();
        let importer = Importer::open(dir.path()).unwrap();

        for number in 1..=importer.part_count() as u32 {
            let info = read_trailer(importer.part_path(number).unwrap()).unwrap();
            let in_part: Vec<&FileRecord> =
                records.iter().filter(|r| r.part == number).collect();
            let payload: u64 = in_part.iter().map(|r| r.length).sum();

            // Oversized payloads sit alone at the start of their part
            if in_part.iter().any(|r| r.length > limit) {
                let non_empty: Vec<_> = in_part.iter().filter(|r| r.length > 0).collect();
                prop_assert_eq!(non_empty.len(), 1);
                prop_assert_eq!(non_empty[0].offset, 0);
            } else if !info.trailer.is_last {
                prop_assert!(payload <= limit);
                prop_assert_eq!(info.payload_len(), payload);
            }
            prop_assert_eq!(info.trailer.is_last, number as usize == importer.part_count());
        }

        // Records in one part are laid out back to back
        for pair in records.windows(2) {
            if pair[0].part == pair[1].part {
                prop_assert_eq!(pair[1].offset, pair[0].end());
            } else {
                prop_assert_eq!(pair[1].part, pair[0].part + 1);
                prop_assert_eq!(pair[1].offset, 0);
            }
        }
    }
}
