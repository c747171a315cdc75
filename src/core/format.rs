//! On-disk layout shared by the exporter and importer
//!
//! An archive is a directory of part files named `part-0001.parcel`,
//! `part-0002.parcel`, ... Every part ends with a fixed 9-byte trailer. The
//! final part additionally carries the JSON metadata block and its length
//! right before the trailer:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ part-0001.parcel             │
//! │  file payloads ...           │
//! │  trailer (1, version, false) │
//! ├──────────────────────────────┤
//! │ part-000N.parcel             │
//! │  file payloads ...           │
//! │  metadata JSON (UTF-8)       │
//! │  metadata length (u64 BE)    │
//! │  trailer (N, version, true)  │
//! └──────────────────────────────┘
//! ```

use crate::error::{ParcelError, Result};
use std::path::Path;

/// Highest trailer format version this crate writes and reads
pub const FORMAT_VERSION: u32 = 1;

/// Extension shared by every part file
pub const PART_EXT: &str = ".parcel";

/// Trailer size in bytes: part number (u32) + version (u32) + is_last (u8)
pub const TRAILER_SIZE: usize = 4 + 4 + 1;

/// Size of the big-endian metadata length that precedes the final trailer
pub const METADATA_LEN_SIZE: usize = 8;

/// Default per-part size limit (1 GiB)
pub const DEFAULT_PART_SIZE: u64 = 1 << 30;

/// Reserved metadata key holding the file-record table
pub const FILE_RECORDS_KEY: &str = "file_metadata";

/// File name of the part with the given 1-based number
pub fn part_file_name(number: u32) -> String {
    format!("part-{:04}{}", number, PART_EXT)
}

/// Whether a directory entry looks like a part file (extension match is case-insensitive)
pub fn is_part_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_lowercase().ends_with(PART_EXT))
        .unwrap_or(false)
}

/// Fixed-size footer written as the last bytes of every part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// 1-based position of this part in the archive
    pub part_number: u32,

    /// Format version the part was written with
    pub version: u32,

    /// True only for the final part, which also holds the metadata
    pub is_last: bool,
}

impl Trailer {
    pub fn new(part_number: u32, is_last: bool) -> Self {
        Trailer {
            part_number,
            version: FORMAT_VERSION,
            is_last,
        }
    }

    /// Serialize to the big-endian on-disk form
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut bytes = [0u8; TRAILER_SIZE];
        bytes[0..4].copy_from_slice(&self.part_number.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_be_bytes());
        bytes[8] = self.is_last as u8;
        bytes
    }

    /// Parse a trailer read from `path`
    ///
    /// Anything other than exactly `TRAILER_SIZE` bytes is a truncated trailer.
    /// Any non-zero flag byte reads as `is_last`.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() != TRAILER_SIZE {
            return Err(ParcelError::TruncatedTrailer(path.to_path_buf()));
        }

        let part_number = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        Ok(Trailer {
            part_number,
            version,
            is_last: bytes[8] != 0,
        })
    }

    /// Reject trailers written by a newer format
    pub fn check_version(&self, path: &Path) -> Result<()> {
        if self.version > FORMAT_VERSION {
            return Err(ParcelError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: self.version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(())
    }
}
