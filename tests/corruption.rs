//! Integrity failure handling
//!
//! A damaged payload only marks the affected file as corrupted; the rest of
//! the archive stays readable. A damaged metadata block is fatal.

mod common;

use common::{flip_byte, part_path};
use parcel_rs::{Exporter, Importer, ParcelError, Result, TRAILER_SIZE};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::TempDir;

fn export_sample(dir: &TempDir) -> Result<()> {
    let mut exporter = Exporter::new(dir.path(), 4096)?;
    exporter.add_bytes("alpha", &common::payload(1, 300), None)?;
    exporter.add_bytes("beta", &common::payload(2, 300), None)?;
    exporter.add_bytes("gamma", &common::payload(3, 300), None)?;
    exporter.commit()?;
    Ok(())
}

#[test]
fn test_flipped_byte_marks_only_that_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;

    let importer = Importer::open(dir.path())?;
    let beta = importer.record("beta").unwrap().clone();
    flip_byte(&part_path(dir.path(), beta.part), beta.offset + 17);

    for key in ["alpha", "beta", "gamma"] {
        let mut reader = importer.start_file(key, &format!("{} payload", key))?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        assert_eq!(content.len(), 300);
        reader.finish();
    }

    assert_eq!(importer.corrupted_files(), vec!["beta payload".to_string()]);
    Ok(())
}

#[test]
fn test_read_file_fails_on_mismatch() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;
    let importer = Importer::open(dir.path())?;
    let alpha = importer.record("alpha").unwrap().clone();
    flip_byte(&part_path(dir.path(), alpha.part), alpha.offset);

    assert!(matches!(
        importer.read_file("alpha"),
        Err(ParcelError::DigestMismatch(k)) if k == "alpha"
    ));
    assert_eq!(importer.read_file("gamma")?, common::payload(3, 300));
    assert_eq!(importer.corrupted_files(), vec!["alpha".to_string()]);
    Ok(())
}

#[test]
fn test_verify_all_reports_every_corrupted_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;
    let importer = Importer::open(dir.path())?;
    assert!(importer.verify_all()?.is_empty());

    for key in ["alpha", "gamma"] {
        let record = importer.record(key).unwrap().clone();
        flip_byte(&part_path(dir.path(), record.part), record.end() - 1);
    }

    let mut corrupted = importer.verify_all()?;
    corrupted.sort();
    assert_eq!(corrupted, vec!["alpha", "gamma"]);
    Ok(())
}

#[test]
fn test_dropped_reader_still_verifies() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;
    let importer = Importer::open(dir.path())?;
    let gamma = importer.record("gamma").unwrap().clone();
    flip_byte(&part_path(dir.path(), gamma.part), gamma.offset + 1);

    {
        let mut reader = importer.start_file("gamma", "gamma")?;
        reader.read_chunk(None)?;
    }
    assert_eq!(importer.corrupted_files(), vec!["gamma".to_string()]);
    Ok(())
}

#[test]
fn test_garbage_metadata_is_fatal() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;

    // First byte of the JSON block: '{' becomes something else
    let path = part_path(dir.path(), 1);
    let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len - TRAILER_SIZE as u64 - 8))?;
    let mut raw = [0u8; 8];
    file.read_exact(&mut raw)?;
    let json_start = len - TRAILER_SIZE as u64 - 8 - u64::from_be_bytes(raw);
    file.seek(SeekFrom::Start(json_start))?;
    file.write_all(b"#")?;
    drop(file);

    assert!(matches!(
        Importer::open(dir.path()),
        Err(ParcelError::CorruptMetadata(_))
    ));
    Ok(())
}

#[test]
fn test_oversized_metadata_length_is_fatal() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_sample(&dir)?;

    let path = part_path(dir.path(), 1);
    let mut file = OpenOptions::new().write(true).open(&path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len - TRAILER_SIZE as u64 - 8))?;
    file.write_all(&u64::MAX.to_be_bytes())?;
    drop(file);

    let err = Importer::open(dir.path()).unwrap_err();
    assert!(matches!(err, ParcelError::CorruptMetadata(_)));
    assert!(err.is_structural());
    Ok(())
}
