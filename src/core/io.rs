//! Disk I/O for part files

use crate::error::{ParcelError, Result};
use crate::format::{part_file_name, Trailer, METADATA_LEN_SIZE, TRAILER_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// The exporter's current, still-mutable tail part
pub struct PartFile {
    writer: BufWriter<File>,
    path: PathBuf,
    number: u32,
    position: u64,
    /// Set after a failed write: the on-disk length no longer matches `position`
    poisoned: bool,
}

impl PartFile {
    /// Create (or truncate) part `number` inside `dir`
    pub fn create<P: AsRef<Path>>(dir: P, number: u32) -> Result<Self> {
        let path = dir.as_ref().join(part_file_name(number));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self::from_file(file, path, number))
    }

    fn from_file(file: File, path: PathBuf, number: u32) -> Self {
        PartFile {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            path,
            number,
            position: 0,
            poisoned: false,
        }
    }

    /// Append bytes at the current write position
    ///
    /// A failed write may leave part of `data` on disk, so the part refuses
    /// every later write and cannot be sealed.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;
        if let Err(e) = self.writer.write_all(data) {
            self.poisoned = true;
            return Err(e.into());
        }
        self.position += data.len() as u64;
        Ok(())
    }

    pub(crate) fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(ParcelError::PartWriteFailed(self.path.clone()));
        }
        Ok(())
    }

    /// Write the trailer, flush and close the part, returning its path
    pub fn seal(mut self, is_last: bool) -> Result<PathBuf> {
        self.check_usable()?;
        let trailer = Trailer::new(self.number, is_last);
        self.writer.write_all(&trailer.to_bytes())?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.path)
    }

    /// Bytes written so far (the trailer is not counted until sealed)
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A sealed part as discovered on disk
#[derive(Debug, Clone)]
pub struct PartInfo {
    pub path: PathBuf,
    pub trailer: Trailer,
    /// Total file length, trailer included
    pub len: u64,
}

impl PartInfo {
    /// Bytes available to file payloads (everything before the trailer)
    pub fn payload_len(&self) -> u64 {
        self.len - TRAILER_SIZE as u64
    }
}

/// Read just the trailer of a part file
pub fn read_trailer<P: AsRef<Path>>(path: P) -> Result<PartInfo> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let tail = len.min(TRAILER_SIZE as u64);
    file.seek(SeekFrom::End(-(tail as i64)))?;
    let mut raw = Vec::with_capacity(TRAILER_SIZE);
    file.read_to_end(&mut raw)?;

    let trailer = Trailer::from_bytes(&raw, path)?;
    Ok(PartInfo {
        path: path.to_path_buf(),
        trailer,
        len,
    })
}

/// Read the length-prefixed metadata block stored before the final trailer
///
/// Returns the raw JSON bytes and the offset where the block starts, which
/// is also where the final part's payload region ends.
pub fn read_metadata_block(part: &PartInfo) -> Result<(Vec<u8>, u64)> {
    let framing = (TRAILER_SIZE + METADATA_LEN_SIZE) as u64;
    if part.len < framing {
        return Err(ParcelError::CorruptMetadata(format!(
            "final part {} is too short to hold a metadata block",
            part.path.display()
        )));
    }

    let mut file = File::open(&part.path)?;
    file.seek(SeekFrom::Start(part.len - framing))?;
    let mut len_bytes = [0u8; METADATA_LEN_SIZE];
    file.read_exact(&mut len_bytes)?;
    let metadata_len = u64::from_be_bytes(len_bytes);

    let available = part.len - framing;
    if metadata_len > available {
        return Err(ParcelError::CorruptMetadata(format!(
            "metadata length {} exceeds the {} bytes available in {}",
            metadata_len,
            available,
            part.path.display()
        )));
    }

    let start = available - metadata_len;
    file.seek(SeekFrom::Start(start))?;
    let mut raw = vec![0u8; metadata_len as usize];
    file.read_exact(&mut raw)?;

    Ok((raw, start))
}
