//! Write side of the container: allocates parts, places payloads, commits metadata
//!
//! An `Exporter` owns exactly one mutable part at a time. Earlier parts are
//! sealed with a trailer and closed as soon as the next payload no longer
//! fits. An exporter is single-writer: share it across threads only behind
//! external synchronization.

use crate::digest::ContentHasher;
use crate::error::{ParcelError, Result};
use crate::format::{is_part_file, DEFAULT_PART_SIZE, METADATA_LEN_SIZE};
use crate::io::PartFile;
use crate::manifest::{system_time_to_mtime, FileRecord, Metadata};
use crate::source::{walk_files, ExportSource};
use crate::writer::FileWriter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COPY_CHUNK_SIZE: usize = 1 << 20;

/// Multi-part archive writer
///
/// # Examples
///
/// ```rust,no_run
/// use parcel_rs::Exporter;
///
/// # fn main() -> parcel_rs::Result<()> {
/// let mut exporter = Exporter::new("/backups/today", 64 * 1024 * 1024)?;
/// exporter.set_metadata("libraries", &vec!["/books"])?;
/// exporter.add_bytes("greeting", b"hello", None)?;
///
/// let mut writer = exporter.start_file("generated", None)?;
/// writer.ensure_space(6)?;
/// writer.write_bytes(b"stream")?;
/// writer.finish()?;
///
/// let parts = exporter.commit()?;
/// println!("wrote {} parts", parts.len());
/// # Ok(())
/// # }
/// ```
pub struct Exporter {
    base: PathBuf,
    part_size: u64,
    /// Paths of sealed parts, in order
    sealed: Vec<PathBuf>,
    /// Current tail part; `None` once committed
    current: Option<PartFile>,
    metadata: Metadata,
}

impl Exporter {
    /// Start an export session in an existing directory
    ///
    /// The directory must not already hold part files: a stale part left by
    /// an earlier export would make the new archive unreadable.
    ///
    /// `part_size` bounds the size of each part. A part only grows past it
    /// when a single file is larger than the limit.
    pub fn new<P: AsRef<Path>>(dir: P, part_size: u64) -> Result<Self> {
        if part_size == 0 {
            return Err(ParcelError::Config("part size must be positive".to_string()));
        }

        let base = dir.as_ref().to_path_buf();
        if let Some(existing) = find_part_file(&base)? {
            debug!("Refusing export over existing part {:?}", existing);
            return Err(ParcelError::DestinationNotEmpty(base));
        }
        info!(
            "Starting export to {:?} with part size {} bytes",
            base, part_size
        );
        let current = PartFile::create(&base, 1)?;

        Ok(Exporter {
            base,
            part_size,
            sealed: Vec::new(),
            current: Some(current),
            metadata: Metadata::new(),
        })
    }

    /// Start an export session with the default 1 GiB part size
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::new(dir, DEFAULT_PART_SIZE)
    }

    /// Store an auxiliary metadata entry; every key may be set once
    pub fn set_metadata<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.check_open()?;
        let value = serde_json::to_value(value)?;
        self.metadata.set(key, value)
    }

    /// Make room for `size` more bytes, rolling over to a new part if needed
    ///
    /// Returns true when a new part was started. A part that holds no
    /// payload yet is never sealed, so an oversized request lands in it.
    pub fn ensure_space(&mut self, size: u64) -> Result<bool> {
        if !self.needs_rollover(size)? {
            return Ok(false);
        }

        let full = self.current.take().ok_or(ParcelError::AlreadyCommitted)?;
        let used = full.position();
        let path = full.seal(false)?;
        self.sealed.push(path);

        let number = self.sealed.len() as u32 + 1;
        info!(
            "Part {} full ({} bytes used, {} requested), starting part {}",
            number - 1,
            used,
            size,
            number
        );
        self.current = Some(PartFile::create(&self.base, number)?);
        Ok(true)
    }

    /// Whether `ensure_space(size)` would start a new part
    pub fn needs_rollover(&self, size: u64) -> Result<bool> {
        let part = self.current.as_ref().ok_or(ParcelError::AlreadyCommitted)?;
        let used = part.position();
        Ok(used > 0 && used.saturating_add(size) > self.part_size)
    }

    /// Copy a seekable source into the archive under `key`
    ///
    /// The full length is reserved up front, so the payload never straddles
    /// two parts.
    pub fn add_file<R: Read + Seek>(
        &mut self,
        source: &mut R,
        key: &str,
        mtime: Option<f64>,
    ) -> Result<FileRecord> {
        self.check_new_key(key)?;

        let size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        self.ensure_space(size)?;

        let part = self.tail()?;
        let number = part.number();
        let offset = part.position();

        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; COPY_CHUNK_SIZE.min(size.max(1) as usize)];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            part.write_all(&buf[..n])?;
        }

        let length = part.position() - offset;
        if length != size {
            warn!(
                "Source for {} changed while exporting: expected {} bytes, copied {}",
                key, size, length
            );
        }

        let record = FileRecord {
            part: number,
            offset,
            length,
            digest: hasher.hex_digest(),
            mtime,
        };
        debug!(
            "Added {} ({} bytes) to part {} at offset {}",
            key, length, number, offset
        );
        self.metadata.insert_record(key, record.clone())?;
        Ok(record)
    }

    /// Copy a file from disk, recording its modification time
    pub fn add_path<P: AsRef<Path>>(&mut self, path: P, key: &str) -> Result<FileRecord> {
        let mut file = File::open(path.as_ref())?;
        let mtime = file
            .metadata()?
            .modified()
            .ok()
            .map(system_time_to_mtime);
        self.add_file(&mut file, key, mtime)
    }

    /// Copy an in-memory buffer
    pub fn add_bytes(&mut self, key: &str, data: &[u8], mtime: Option<f64>) -> Result<FileRecord> {
        self.add_file(&mut std::io::Cursor::new(data), key, mtime)
    }

    /// Open a scoped writer for a payload produced incrementally
    ///
    /// The record is created when the writer is finished or dropped.
    pub fn start_file(&mut self, key: &str, mtime: Option<f64>) -> Result<FileWriter<'_>> {
        self.check_new_key(key)?;
        Ok(FileWriter::new(self, key.to_string(), mtime))
    }

    /// Add every regular file under `path`, keyed by `"<hex(dir_key)>:<relative/path>"`
    ///
    /// The `[key, relative_path]` pairs are stored as metadata under `dir_key`.
    /// Returns the number of files added.
    pub fn export_dir<P: AsRef<Path>>(&mut self, path: P, dir_key: &str) -> Result<usize> {
        self.export_dir_with(path, dir_key, |_, _| {})
    }

    /// `export_dir` that calls `on_file` after each file is added
    pub fn export_dir_with<P, F>(&mut self, path: P, dir_key: &str, mut on_file: F) -> Result<usize>
    where
        P: AsRef<Path>,
        F: FnMut(&str, &FileRecord),
    {
        self.check_open()?;
        if self.metadata.contains_key(dir_key) {
            return Err(ParcelError::DuplicateMetadataKey(dir_key.to_string()));
        }

        let prefix = dir_key_prefix(dir_key);
        let mut files = Vec::new();
        for (full_path, relative) in walk_files(path.as_ref())? {
            let key = format!("{}:{}", prefix, relative);
            let record = self.add_path(&full_path, &key)?;
            on_file(&relative, &record);
            files.push((key, relative));
        }

        info!(
            "Exported {} files from {:?} under {}",
            files.len(),
            path.as_ref(),
            dir_key
        );
        let count = files.len();
        self.set_metadata(dir_key, &files)?;
        Ok(count)
    }

    /// Drain an injected source of `(key, length, stream, mtime)` entries
    ///
    /// Returns the number of files added.
    pub fn export_source<S: ExportSource + ?Sized>(&mut self, source: &mut S) -> Result<usize> {
        let mut count = 0;
        while let Some(mut entry) = source.next_entry()? {
            let mut writer = self.start_file(&entry.key, entry.mtime)?;
            writer.ensure_space(entry.length)?;
            if let Err(e) = std::io::copy(&mut entry.reader, &mut writer) {
                writer.discard();
                return Err(e.into());
            }
            let written = writer.written();
            if written != entry.length {
                warn!(
                    "Source entry {} declared {} bytes but produced {}",
                    entry.key, entry.length, written
                );
            }
            writer.finish()?;
            count += 1;
        }
        Ok(count)
    }

    /// Write the metadata block and seal the final part
    ///
    /// Returns the paths of all parts. Every later write fails with
    /// `AlreadyCommitted`.
    pub fn commit(&mut self) -> Result<Vec<PathBuf>> {
        self.check_open()?;

        let raw = self.metadata.to_json_bytes()?;
        self.ensure_space((raw.len() + METADATA_LEN_SIZE) as u64)?;

        let mut last = self.current.take().ok_or(ParcelError::AlreadyCommitted)?;
        last.write_all(&raw)?;
        last.write_all(&(raw.len() as u64).to_be_bytes())?;
        let path = last.seal(true)?;
        self.sealed.push(path);

        info!(
            "Committed export to {:?}: {} files, {} parts, {} metadata bytes",
            self.base,
            self.metadata.records().len(),
            self.sealed.len(),
            raw.len()
        );
        Ok(self.sealed.clone())
    }

    pub fn is_committed(&self) -> bool {
        self.current.is_none()
    }

    /// Number of parts created so far, the open one included
    pub fn part_count(&self) -> usize {
        self.sealed.len() + usize::from(self.current.is_some())
    }

    /// Paths of every part created so far, the open one included
    pub fn part_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.sealed.clone();
        if let Some(part) = &self.current {
            paths.push(part.path().to_path_buf());
        }
        paths
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// `(part number, write offset)` of the open part
    pub fn current_position(&self) -> Option<(u32, u64)> {
        self.current
            .as_ref()
            .map(|part| (part.number(), part.position()))
    }

    /// File records created so far
    pub fn records(&self) -> &BTreeMap<String, FileRecord> {
        self.metadata.records()
    }

    pub fn directory(&self) -> &Path {
        &self.base
    }

    pub(crate) fn tail(&mut self) -> Result<&mut PartFile> {
        let part = self.current.as_mut().ok_or(ParcelError::AlreadyCommitted)?;
        part.check_usable()?;
        Ok(part)
    }

    pub(crate) fn insert_record(&mut self, key: &str, record: FileRecord) -> Result<()> {
        self.metadata.insert_record(key, record)
    }

    fn check_open(&self) -> Result<()> {
        if self.current.is_none() {
            return Err(ParcelError::AlreadyCommitted);
        }
        Ok(())
    }

    fn check_new_key(&self, key: &str) -> Result<()> {
        self.check_open()?;
        if self.metadata.has_record(key) {
            return Err(ParcelError::DuplicateFileKey(key.to_string()));
        }
        Ok(())
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        if let Some(part) = &self.current {
            warn!(
                "Export to {:?} dropped before commit; part {} was left unsealed",
                self.base,
                part.number()
            );
        }
    }
}

/// First entry of `dir` that looks like a part file
fn find_part_file(dir: &Path) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_part_file(&path) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Key prefix used by `export_dir`: the hex encoding of the directory key
pub fn dir_key_prefix(dir_key: &str) -> String {
    hex::encode(dir_key.as_bytes())
}
