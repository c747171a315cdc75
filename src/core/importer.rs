//! Read side of the container: part discovery, validation, and read handles
//!
//! Opening an archive validates its structure up front. Every structural
//! problem (truncated trailer, newer format, missing or duplicated parts,
//! unreadable metadata) is fatal. Payload corruption is not: it is detected
//! per file when a [`FileReader`] closes and collected in
//! [`Importer::corrupted_files`].

use crate::error::{ParcelError, Result};
use crate::format::is_part_file;
use crate::io::{read_metadata_block, read_trailer, PartInfo};
use crate::manifest::{mtime_to_system_time, FileRecord, Metadata};
use crate::reader::{CorruptedList, FileReader};
use crate::validation::resolve_under;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A validated archive, ready for reading
///
/// `Importer` is `Sync`: several threads may open readers on the same
/// archive at once, since each reader owns its own file handle.
///
/// # Examples
///
/// ```rust,no_run
/// use parcel_rs::Importer;
/// use std::io::Read;
///
/// # fn main() -> parcel_rs::Result<()> {
/// let importer = Importer::open("/backups/today")?;
///
/// let mut reader = importer.start_file("greeting", "the greeting")?;
/// let mut content = Vec::new();
/// reader.read_to_end(&mut content)?;
/// reader.finish();
///
/// if !importer.corrupted_files().is_empty() {
///     eprintln!("corrupted: {:?}", importer.corrupted_files());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Importer {
    root: PathBuf,
    parts: BTreeMap<u32, PartInfo>,
    metadata: Metadata,
    corrupted: CorruptedList,
}

impl Importer {
    /// Discover and validate the archive stored in `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let parts = discover_parts(&root)?;
        let last = check_sequence(&root, &parts)?;

        let final_part = &parts[&last];
        let (raw, payload_end) = read_metadata_block(final_part)?;
        let metadata = Metadata::from_json_bytes(&raw)?;
        check_records(&metadata, &parts, last, payload_end)?;

        info!(
            "Opened archive {:?}: {} parts, {} files",
            root,
            parts.len(),
            metadata.records().len()
        );

        Ok(Importer {
            root,
            parts,
            metadata,
            corrupted: CorruptedList::default(),
        })
    }

    /// Open a bounded reader for `key`
    ///
    /// `description` is what gets reported in
    /// [`corrupted_files`](Importer::corrupted_files) if the digest fails.
    pub fn start_file(&self, key: &str, description: &str) -> Result<FileReader> {
        let record = self
            .metadata
            .record(key)
            .ok_or_else(|| ParcelError::MissingKey(key.to_string()))?
            .clone();
        let path = self.part_path(record.part).ok_or_else(|| {
            ParcelError::CorruptMetadata(format!("{} points at missing part {}", key, record.part))
        })?;

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(record.offset))?;
        debug!(
            "Reading {} ({} bytes) from part {} at offset {}",
            key, record.length, record.part, record.offset
        );

        Ok(FileReader::new(
            file,
            record,
            description.to_string(),
            self.corrupted.clone(),
        ))
    }

    /// Read a whole file into memory, failing on a digest mismatch
    ///
    /// The mismatch is also added to `corrupted_files`.
    pub fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let mut reader = self.start_file(key, key)?;
        let content = reader.read_chunk(None)?;
        if !reader.finish() {
            return Err(ParcelError::DigestMismatch(key.to_string()));
        }
        Ok(content)
    }

    /// Read every file once and return the descriptions that failed
    pub fn verify_all(&self) -> Result<Vec<String>> {
        for key in self.metadata.records().keys() {
            let mut reader = self.start_file(key, key)?;
            std::io::copy(&mut reader, &mut std::io::sink())?;
            reader.finish();
        }
        Ok(self.corrupted_files())
    }

    /// Descriptions of every reader whose digest did not match so far
    pub fn corrupted_files(&self) -> Vec<String> {
        self.corrupted.lock().clone()
    }

    /// `[key, relative_path]` pairs stored by `Exporter::export_dir`
    pub fn dir_entries(&self, dir_key: &str) -> Result<Vec<(String, String)>> {
        let value = self
            .metadata
            .get(dir_key)
            .ok_or_else(|| ParcelError::MissingDirManifest(dir_key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ParcelError::CorruptMetadata(format!("malformed directory manifest {}: {}", dir_key, e))
        })
    }

    /// Restore a directory exported with `Exporter::export_dir` into `dest`
    ///
    /// Stored modification times are applied when present. Corrupted files
    /// are still written and reported through `corrupted_files`. Returns the
    /// number of files restored.
    pub fn import_dir<P: AsRef<Path>>(&self, dir_key: &str, dest: P) -> Result<usize> {
        self.import_dir_with(dir_key, dest, |_, _| {})
    }

    /// `import_dir` that calls `on_file` after each file is written and closed
    pub fn import_dir_with<P, F>(&self, dir_key: &str, dest: P, mut on_file: F) -> Result<usize>
    where
        P: AsRef<Path>,
        F: FnMut(&str, &FileRecord),
    {
        let dest = dest.as_ref();
        let entries = self.dir_entries(dir_key)?;

        for (key, relative) in &entries {
            let record = self
                .record(key)
                .ok_or_else(|| ParcelError::MissingKey(key.clone()))?;
            let target = resolve_under(dest, relative)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut reader = self.start_file(key, &format!("{}: {}", dir_key, relative))?;
            let mut out = File::create(&target)?;
            std::io::copy(&mut reader, &mut out)?;

            if let Some(time) = reader.mtime().and_then(mtime_to_system_time) {
                if let Err(e) = out.set_modified(time) {
                    warn!("Could not set modification time on {:?}: {}", target, e);
                }
            }
            reader.finish();
            drop(out);
            on_file(relative, record);
        }

        info!(
            "Restored {} files from {} into {:?}",
            entries.len(),
            dir_key,
            dest
        );
        Ok(entries.len())
    }

    /// Caller-defined metadata (the file-record table excluded)
    pub fn metadata(&self) -> &Map<String, Value> {
        self.metadata.entries()
    }

    /// Deserialize one caller-defined metadata entry
    pub fn metadata_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.metadata.get_as(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.metadata.records().keys().map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.metadata.has_record(key)
    }

    pub fn record(&self, key: &str) -> Option<&FileRecord> {
        self.metadata.record(key)
    }

    pub fn records(&self) -> &BTreeMap<String, FileRecord> {
        self.metadata.records()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn part_path(&self, number: u32) -> Option<&Path> {
        self.parts.get(&number).map(|p| p.path.as_path())
    }

    pub fn directory(&self) -> &Path {
        &self.root
    }
}

/// Read the trailer of every part file in `root`
fn discover_parts(root: &Path) -> Result<BTreeMap<u32, PartInfo>> {
    let mut parts: BTreeMap<u32, PartInfo> = BTreeMap::new();

    let mut paths: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_part_file(path) && path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let info = read_trailer(&path)?;
        info.trailer.check_version(&path)?;

        let number = info.trailer.part_number;
        debug!(
            "Found part {} at {:?} (last: {})",
            number, path, info.trailer.is_last
        );
        if let Some(existing) = parts.get(&number) {
            return Err(ParcelError::DuplicatePart {
                number,
                first: existing.path.clone(),
                second: path,
            });
        }
        parts.insert(number, info);
    }

    Ok(parts)
}

/// Check the part numbers form `1..=N` with only part N flagged last; returns N
fn check_sequence(root: &Path, parts: &BTreeMap<u32, PartInfo>) -> Result<u32> {
    let (&first, _) = parts
        .iter()
        .next()
        .ok_or_else(|| ParcelError::NoArchive(root.to_path_buf()))?;
    if first != 1 {
        return Err(ParcelError::MissingFirstPart);
    }

    let (&last, last_info) = parts
        .iter()
        .next_back()
        .ok_or_else(|| ParcelError::NoArchive(root.to_path_buf()))?;
    if !last_info.trailer.is_last {
        return Err(ParcelError::MissingLastPart(last));
    }

    if let Some((&flagged, _)) = parts
        .iter()
        .find(|(&number, info)| number != last && info.trailer.is_last)
    {
        return Err(ParcelError::InconsistentLastFlag {
            flagged,
            highest: last,
        });
    }

    if parts.len() as u64 != last as u64 {
        let missing = (1..=last)
            .find(|n| !parts.contains_key(n))
            .unwrap_or(last);
        return Err(ParcelError::MissingPart(missing));
    }

    Ok(last)
}

/// Every record must lie inside the payload region of an existing part
fn check_records(
    metadata: &Metadata,
    parts: &BTreeMap<u32, PartInfo>,
    last: u32,
    last_payload_end: u64,
) -> Result<()> {
    for (key, record) in metadata.records() {
        let part = parts.get(&record.part).ok_or_else(|| {
            ParcelError::CorruptMetadata(format!("{} points at missing part {}", key, record.part))
        })?;
        let limit = if record.part == last {
            last_payload_end
        } else {
            part.payload_len()
        };

        match record.offset.checked_add(record.length) {
            Some(end) if end <= limit => {}
            _ => {
                return Err(ParcelError::CorruptMetadata(format!(
                    "{} spans [{}, +{}) beyond the {} payload bytes of part {}",
                    key, record.offset, record.length, limit, record.part
                )))
            }
        }
    }
    Ok(())
}
