//! Bounded, digest-checked read handle for one archived file

use crate::digest::ContentHasher;
use crate::manifest::FileRecord;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use tracing::warn;

/// Shared list of descriptions whose digest did not verify
pub(crate) type CorruptedList = Arc<Mutex<Vec<String>>>;

/// Read cursor over `[offset, offset + length)` of one part
///
/// Reads never cross the record boundary. When the reader is finished or
/// dropped, the digest of everything returned is compared with the stored
/// one; a mismatch adds the description to the importer's
/// `corrupted_files` list instead of raising an error.
///
/// Read the whole window before closing: a partially consumed reader
/// digests only the bytes returned and will be reported as corrupted.
pub struct FileReader {
    file: File,
    record: FileRecord,
    description: String,
    remaining: u64,
    hasher: ContentHasher,
    corrupted: CorruptedList,
    verdict: Option<bool>,
}

impl FileReader {
    pub(crate) fn new(
        file: File,
        record: FileRecord,
        description: String,
        corrupted: CorruptedList,
    ) -> Self {
        FileReader {
            file,
            remaining: record.length,
            record,
            description,
            hasher: ContentHasher::new(),
            corrupted,
            verdict: None,
        }
    }

    /// Read up to `size` bytes, or the whole remainder when `size` is `None`
    ///
    /// Returns an empty buffer once the window is exhausted.
    pub fn read_chunk(&mut self, size: Option<usize>) -> std::io::Result<Vec<u8>> {
        let wanted = match size {
            Some(n) => (n as u64).min(self.remaining),
            None => self.remaining,
        };
        if wanted == 0 {
            return Ok(Vec::new());
        }

        let mut buf = Vec::with_capacity(wanted as usize);
        self.by_ref().take(wanted).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Bytes left in the window
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Total payload length
    pub fn len(&self) -> u64 {
        self.record.length
    }

    pub fn is_empty(&self) -> bool {
        self.record.length == 0
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn mtime(&self) -> Option<f64> {
        self.record.mtime
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Verify the digest and close; returns true when it matched
    pub fn finish(mut self) -> bool {
        self.verify()
    }

    fn verify(&mut self) -> bool {
        if let Some(verdict) = self.verdict {
            return verdict;
        }

        let ok = self.hasher.hex_digest() == self.record.digest;
        if !ok {
            warn!(
                "Digest mismatch for {} ({} of {} bytes read)",
                self.description,
                self.hasher.bytes(),
                self.record.length
            );
            self.corrupted.lock().push(self.description.clone());
        }
        self.verdict = Some(ok);
        ok
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let amt = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.file.read(&mut buf[..amt])?;
        if n == 0 {
            warn!(
                "Part ended early while reading {}: {} bytes missing",
                self.description, self.remaining
            );
            self.remaining = 0;
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        self.verify();
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("description", &self.description)
            .field("record", &self.record)
            .field("remaining", &self.remaining)
            .finish()
    }
}
