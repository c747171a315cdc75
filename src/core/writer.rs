//! Scoped write handle for payloads produced incrementally

use crate::digest::ContentHasher;
use crate::error::{ParcelError, Result};
use crate::exporter::Exporter;
use crate::manifest::FileRecord;
use std::io::Write;
use tracing::{debug, warn};

/// Write cursor bound to one key of an open [`Exporter`]
///
/// The file record is created when the writer is finished or dropped,
/// including when the scope is left through `?` or a panic. Call
/// [`discard`](FileWriter::discard) to abandon the key instead.
///
/// Reserve the full expected size with [`ensure_space`](FileWriter::ensure_space)
/// before the first write. Once bytes have been written, a reservation that
/// needs a new part fails with `SplitWrite` rather than splitting the file.
pub struct FileWriter<'a> {
    exporter: &'a mut Exporter,
    key: String,
    mtime: Option<f64>,
    hasher: ContentHasher,
    part: u32,
    start: u64,
    discarded: bool,
    finished: bool,
}

impl<'a> FileWriter<'a> {
    pub(crate) fn new(exporter: &'a mut Exporter, key: String, mtime: Option<f64>) -> Self {
        let (part, start) = exporter.current_position().unwrap_or((0, 0));
        FileWriter {
            exporter,
            key,
            mtime,
            hasher: ContentHasher::new(),
            part,
            start,
            discarded: false,
            finished: false,
        }
    }

    /// Reserve room for `size` more bytes of this file
    pub fn ensure_space(&mut self, size: u64) -> Result<()> {
        if self.hasher.bytes() == 0 {
            if self.exporter.ensure_space(size)? {
                let (part, start) = self
                    .exporter
                    .current_position()
                    .ok_or(ParcelError::AlreadyCommitted)?;
                self.part = part;
                self.start = start;
            }
            return Ok(());
        }

        if self.exporter.needs_rollover(size)? {
            return Err(ParcelError::SplitWrite {
                key: self.key.clone(),
                written: self.hasher.bytes(),
            });
        }
        Ok(())
    }

    /// Append bytes to this file
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.exporter.tail()?.write_all(data)?;
        self.hasher.update(data);
        Ok(())
    }

    /// Abandon this key: no record is created on close
    pub fn discard(&mut self) {
        self.discarded = true;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.hasher.bytes()
    }

    /// Close the writer, returning the new record (`None` when discarded)
    pub fn finish(mut self) -> Result<Option<FileRecord>> {
        self.close()
    }

    fn close(&mut self) -> Result<Option<FileRecord>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        if self.discarded {
            debug!("Discarded {} after {} bytes", self.key, self.hasher.bytes());
            return Ok(None);
        }

        let end = self.exporter.tail()?.position();
        let record = FileRecord {
            part: self.part,
            offset: self.start,
            length: end - self.start,
            digest: self.hasher.hex_digest(),
            mtime: self.mtime,
        };
        debug!(
            "Finished {} ({} bytes) in part {} at offset {}",
            self.key, record.length, record.part, record.offset
        );
        self.exporter.insert_record(&self.key, record.clone())?;
        Ok(Some(record))
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for FileWriter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to record {} on close: {}", self.key, e);
        }
    }
}
