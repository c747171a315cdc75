//! Many threads reading one archive at once
//!
//! Each reader owns its file handle; the corrupted list is the only shared
//! mutable state.

mod common;

use common::{flip_byte, part_path};
use parcel_rs::{Exporter, Importer, Result};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const FILES: usize = 24;

fn export_many(dir: &TempDir) -> Result<()> {
    let mut exporter = Exporter::new(dir.path(), 2048)?;
    for i in 0..FILES {
        exporter.add_bytes(&format!("file-{:02}", i), &common::payload(i as u8, 700), None)?;
    }
    exporter.commit()?;
    Ok(())
}

#[test]
fn test_parallel_reads_are_independent() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_many(&dir)?;
    let importer = Arc::new(Importer::open(dir.path())?);
    assert!(importer.part_count() > 1);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let importer = Arc::clone(&importer);
            thread::spawn(move || {
                for round in 0..4 {
                    let i = (t * 3 + round * 5) % FILES;
                    let content = importer.read_file(&format!("file-{:02}", i)).unwrap();
                    assert_eq!(content, common::payload(i as u8, 700));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(importer.corrupted_files().is_empty());
    Ok(())
}

#[test]
fn test_corruption_collected_across_threads() -> Result<()> {
    let dir = TempDir::new().unwrap();
    export_many(&dir)?;
    let importer = Importer::open(dir.path())?;

    let bad = ["file-03", "file-11", "file-20"];
    for key in bad {
        let record = importer.record(key).unwrap().clone();
        flip_byte(&part_path(dir.path(), record.part), record.offset + 5);
    }

    let keys: Vec<&str> = importer.keys().collect();
    thread::scope(|scope| {
        for chunk in keys.chunks(6) {
            let importer = &importer;
            scope.spawn(move || {
                for key in chunk {
                    let mut reader = importer.start_file(key, key).unwrap();
                    reader.read_chunk(None).unwrap();
                    reader.finish();
                }
            });
        }
    });

    let mut corrupted = importer.corrupted_files();
    corrupted.sort();
    assert_eq!(corrupted, bad);
    Ok(())
}
