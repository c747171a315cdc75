//! Archive metadata: the file-record table plus caller-defined entries
//!
//! The whole mapping is serialized once, at commit time, as a single JSON
//! object. The reserved `file_metadata` key holds one array per file:
//!
//! ```text
//! { "file_metadata": { "<key>": [part, offset, length, "sha1hex", mtime|null], ... },
//!   "libraries": [...],
//!   "config_dir": [["<key>", "relative/path"], ...] }
//! ```

use crate::digest::is_valid_hex_digest;
use crate::error::{ParcelError, Result};
use crate::format::FILE_RECORDS_KEY;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Location and digest of one archived file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecord", into = "RawRecord")]
pub struct FileRecord {
    /// 1-based part holding the payload
    pub part: u32,

    /// Byte offset of the payload inside the part
    pub offset: u64,

    /// Payload length in bytes
    pub length: u64,

    /// Lowercase hex SHA-1 of the payload
    pub digest: String,

    /// Modification time as Unix seconds
    pub mtime: Option<f64>,
}

/// Positional JSON form: `[part, offset, length, digest, mtime]`
#[derive(Serialize, Deserialize)]
struct RawRecord(u32, u64, u64, String, Option<f64>);

impl From<RawRecord> for FileRecord {
    fn from(raw: RawRecord) -> Self {
        FileRecord {
            part: raw.0,
            offset: raw.1,
            length: raw.2,
            digest: raw.3,
            mtime: raw.4,
        }
    }
}

impl From<FileRecord> for RawRecord {
    fn from(record: FileRecord) -> Self {
        RawRecord(
            record.part,
            record.offset,
            record.length,
            record.digest,
            record.mtime,
        )
    }
}

impl FileRecord {
    /// End offset (exclusive) of the payload inside its part
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Modification time as a UTC timestamp
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.mtime.and_then(mtime_to_datetime)
    }
}

/// Convert fractional Unix seconds to a timestamp
pub fn mtime_to_datetime(mtime: f64) -> Option<DateTime<Utc>> {
    if !mtime.is_finite() {
        return None;
    }
    let secs = mtime.floor();
    let nanos = ((mtime - secs) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single()
}

/// Convert a filesystem timestamp to fractional Unix seconds
pub fn system_time_to_mtime(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Convert fractional Unix seconds back to a filesystem timestamp
pub fn mtime_to_system_time(mtime: f64) -> Option<SystemTime> {
    if !mtime.is_finite() {
        return None;
    }
    let offset = Duration::try_from_secs_f64(mtime.abs()).ok()?;
    if mtime >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    }
}

/// The metadata mapping written at the end of the final part
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Map<String, Value>,
    files: BTreeMap<String, FileRecord>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a caller-defined entry; each key may be set once
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(ParcelError::DuplicateMetadataKey(key));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        key == FILE_RECORDS_KEY || self.entries.contains_key(key)
    }

    /// Caller-defined entry by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Deserialize a caller-defined entry
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// All caller-defined entries (the file-record table excluded)
    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn insert_record(&mut self, key: impl Into<String>, record: FileRecord) -> Result<()> {
        let key = key.into();
        if self.files.contains_key(&key) {
            return Err(ParcelError::DuplicateFileKey(key));
        }
        self.files.insert(key, record);
        Ok(())
    }

    pub fn record(&self, key: &str) -> Option<&FileRecord> {
        self.files.get(key)
    }

    pub fn has_record(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn records(&self) -> &BTreeMap<String, FileRecord> {
        &self.files
    }

    /// Serialize the full mapping, file records included
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut map = self.entries.clone();
        map.insert(
            FILE_RECORDS_KEY.to_string(),
            serde_json::to_value(&self.files)?,
        );
        Ok(serde_json::to_vec(&Value::Object(map))?)
    }

    /// Parse a metadata block read back from an archive
    ///
    /// A missing or malformed file-record table makes the archive unusable,
    /// so it is reported as corruption rather than an empty table.
    pub fn from_json_bytes(raw: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ParcelError::CorruptMetadata(format!("invalid JSON: {}", e)))?;

        let mut entries = match value {
            Value::Object(map) => map,
            other => {
                return Err(ParcelError::CorruptMetadata(format!(
                    "expected a JSON object, found {}",
                    json_type_name(&other)
                )))
            }
        };

        let table = entries.remove(FILE_RECORDS_KEY).ok_or_else(|| {
            ParcelError::CorruptMetadata(format!("missing the {} table", FILE_RECORDS_KEY))
        })?;

        let files: BTreeMap<String, FileRecord> = serde_json::from_value(table).map_err(|e| {
            ParcelError::CorruptMetadata(format!("malformed {} table: {}", FILE_RECORDS_KEY, e))
        })?;

        for (key, record) in &files {
            if record.part == 0 || !is_valid_hex_digest(&record.digest) {
                return Err(ParcelError::CorruptMetadata(format!(
                    "malformed record for {}",
                    key
                )));
            }
        }

        Ok(Metadata { entries, files })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
