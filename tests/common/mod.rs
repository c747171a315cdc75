//! Shared helpers for the integration tests

#![allow(dead_code)]

use parcel_rs::core::format::part_file_name;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub fn part_path(dir: &Path, number: u32) -> PathBuf {
    dir.join(part_file_name(number))
}

/// Helper: XOR one byte of a part file at `offset`
pub fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
}

/// Helper: overwrite the version field of a part's trailer
pub fn set_trailer_version(path: &Path, version: u32) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    let len = file.metadata().unwrap().len();
    file.seek(SeekFrom::Start(len - 5)).unwrap();
    file.write_all(&version.to_be_bytes()).unwrap();
}

/// Helper: truncate a file to `size` bytes
pub fn truncate(path: &Path, size: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(size).unwrap();
}

/// Deterministic filler so payload corruption is never a no-op
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}
