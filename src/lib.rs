//! # Parcel - Multi-Part Archival Container
//!
//! `parcel-rs` exports an arbitrary set of named byte blobs into a sequence of
//! size-bounded part files and imports them back with integrity checks:
//!
//! - **Size-bounded parts** named `part-0001.parcel`, `part-0002.parcel`, ...
//! - **Self-describing**: every part ends with a trailer carrying its number,
//!   the format version, and whether it is the last part, so file names and
//!   directory order do not matter on import
//! - **Per-file SHA-1 digests**, verified when a read handle closes
//! - **JSON metadata block** in the final part, holding the file table and
//!   any caller data
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parcel_rs::{Exporter, Importer, Result};
//!
//! # fn main() -> Result<()> {
//! let mut exporter = Exporter::new("/backups/today", 64 * 1024 * 1024)?;
//! exporter.add_bytes("notes.txt", b"Hello, World!", None)?;
//! exporter.export_dir("/home/me/.config/app", "config_dir")?;
//! exporter.commit()?;
//!
//! let importer = Importer::open("/backups/today")?;
//! let content = importer.read_file("notes.txt")?;
//! importer.import_dir("config_dir", "/tmp/restored-config")?;
//! assert!(importer.corrupted_files().is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use parcel_rs::{ParcelConfig, Result};
//!
//! # fn main() -> Result<()> {
//! let config = ParcelConfig::from_file("parcel.toml")?;
//! let exporter = config.exporter_builder().create_dir(true).build()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    config, digest, error, exporter, format, importer, io, manifest, reader, session, source,
    writer,
};

pub use crate::core::validation;

// Re-export core types that users need
pub use crate::core::{
    config::{ExporterBuilder, ParcelConfig},
    error::{ParcelError, Result},
    exporter::Exporter,
    format::{Trailer, DEFAULT_PART_SIZE, FORMAT_VERSION, PART_EXT, TRAILER_SIZE},
    importer::Importer,
    manifest::{FileRecord, Metadata},
    reader::FileReader,
    session::{
        export_session, import_session, DirLibraryExporter, ImportSummary, LibraryExporter,
        NoProgress, Progress,
    },
    source::{DirSource, ExportSource, MemorySource, SourceEntry},
    writer::FileWriter,
};
