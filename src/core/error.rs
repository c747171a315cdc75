use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParcelError {
    #[error("Archive corrupt: truncated trailer in {}", .0.display())]
    TruncatedTrailer(PathBuf),

    #[error("Unsupported format version {found} in {} (max supported: {supported})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("No archive found in {}", .0.display())]
    NoArchive(PathBuf),

    #[error("Missing first part of the archive")]
    MissingFirstPart,

    #[error("Missing last part of the archive (part {0} is not flagged as last)")]
    MissingLastPart(u32),

    #[error("Inconsistent last-part flags: part {flagged} is flagged as last but part {highest} exists")]
    InconsistentLastFlag { flagged: u32, highest: u32 },

    #[error("Missing part {0} of the archive")]
    MissingPart(u32),

    #[error("Part {number} appears twice: {} and {}", first.display(), second.display())]
    DuplicatePart {
        number: u32,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Archive corrupt: invalid metadata: {0}")]
    CorruptMetadata(String),

    #[error("Metadata already contains the key: {0}")]
    DuplicateMetadataKey(String),

    #[error("Archive already contains a file with key {0}")]
    DuplicateFileKey(String),

    #[error("Export session already committed, cannot add to it")]
    AlreadyCommitted,

    #[error("No file with key {0} in archive")]
    MissingKey(String),

    #[error("Cannot roll over to a new part after {written} bytes of {key} were written")]
    SplitWrite { key: String, written: u64 },

    #[error("No directory manifest stored under {0}")]
    MissingDirManifest(String),

    #[error("Unsafe relative path in archive: {0}")]
    UnsafePath(String),

    #[error("Digest mismatch for {0}")]
    DigestMismatch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Destination {} already holds part files", .0.display())]
    DestinationNotEmpty(PathBuf),

    #[error("Earlier write to {} failed, part is unusable", .0.display())]
    PartWriteFailed(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ParcelError {
    /// True for the errors raised while validating an archive's part layout
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ParcelError::TruncatedTrailer(_)
                | ParcelError::UnsupportedVersion { .. }
                | ParcelError::NoArchive(_)
                | ParcelError::MissingFirstPart
                | ParcelError::MissingLastPart(_)
                | ParcelError::InconsistentLastFlag { .. }
                | ParcelError::MissingPart(_)
                | ParcelError::DuplicatePart { .. }
                | ParcelError::CorruptMetadata(_)
        )
    }
}

impl From<toml::de::Error> for ParcelError {
    fn from(err: toml::de::Error) -> Self {
        ParcelError::Config(err.to_string())
    }
}

impl From<ParcelError> for std::io::Error {
    fn from(err: ParcelError) -> Self {
        match err {
            ParcelError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParcelError>;
