//! Whole-session drivers: export a set of libraries plus a configuration
//! directory, and restore them again
//!
//! What a "library" contains is up to the caller through
//! [`LibraryExporter`]. The drivers only sequence the work, keep the
//! `libraries` metadata list, and report progress.

use crate::error::{ParcelError, Result};
use crate::exporter::Exporter;
use crate::importer::Importer;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Metadata key listing the exported library keys
pub const LIBRARIES_KEY: &str = "libraries";

/// Metadata key (and directory key) of the configuration directory
pub const CONFIG_DIR_KEY: &str = "config_dir";

/// Progress sink for export and import sessions
///
/// `stage` is coarse: one call per library plus the configuration step and
/// a final `(total, total, "Completed")`. `file` is fine grained: one call
/// per archived or restored file.
pub trait Progress {
    fn stage(&mut self, _current: usize, _total: usize, _label: &str) {}

    fn file(&mut self, _name: &str, _bytes: u64) {}
}

/// Progress sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Exports the contents of one library into an open session
pub trait LibraryExporter {
    /// Archive the library at `path`, storing its manifest under `key`
    fn export_library(
        &mut self,
        path: &Path,
        key: &str,
        exporter: &mut Exporter,
        progress: &mut dyn Progress,
    ) -> Result<()>;
}

/// Library exporter that archives a plain directory tree
#[derive(Debug, Default, Clone, Copy)]
pub struct DirLibraryExporter;

impl LibraryExporter for DirLibraryExporter {
    fn export_library(
        &mut self,
        path: &Path,
        key: &str,
        exporter: &mut Exporter,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        exporter.export_dir_with(path, key, |relative, record| {
            progress.file(relative, record.length)
        })?;
        Ok(())
    }
}

/// Key under which a library is stored: its canonical absolute path
pub fn library_key(path: &Path) -> Result<String> {
    let canonical = std::fs::canonicalize(path)?;
    canonical
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| ParcelError::Config(format!("library path {:?} is not UTF-8", canonical)))
}

/// Export every library, then the configuration directory, then commit
///
/// Returns the paths of the parts written.
pub fn export_session(
    mut exporter: Exporter,
    libraries: &[PathBuf],
    config_dir: Option<&Path>,
    library_exporter: &mut dyn LibraryExporter,
    progress: &mut dyn Progress,
) -> Result<Vec<PathBuf>> {
    let total = libraries.len() + 2;
    let mut keys = Vec::with_capacity(libraries.len());

    for (i, path) in libraries.iter().enumerate() {
        progress.stage(i + 1, total, &path.display().to_string());
        let key = library_key(path)?;
        library_exporter.export_library(path, &key, &mut exporter, progress)?;
        keys.push(key);
    }
    exporter.set_metadata(LIBRARIES_KEY, &keys)?;

    progress.stage(total - 1, total, "Settings and plugins");
    if let Some(dir) = config_dir {
        exporter.export_dir_with(dir, CONFIG_DIR_KEY, |relative, record| {
            progress.file(relative, record.length)
        })?;
    }

    let parts = exporter.commit()?;
    progress.stage(total, total, "Completed");
    Ok(parts)
}

/// What `import_session` restored
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    /// `(library key, restored directory)` pairs
    pub libraries: Vec<(String, PathBuf)>,

    /// Where the configuration directory went, if the archive had one
    pub config_dir: Option<PathBuf>,

    /// Number of files restored
    pub files: usize,

    /// Descriptions of files whose digest did not verify
    pub corrupted: Vec<String>,
}

/// Restore every library and the configuration directory under `dest`
///
/// Libraries go to `dest/libraries/<name>` (deduplicated with a numeric
/// suffix), the configuration directory to `dest/config_dir`.
pub fn import_session(
    importer: &Importer,
    dest: &Path,
    progress: &mut dyn Progress,
) -> Result<ImportSummary> {
    let keys: Vec<String> = importer.metadata_value(LIBRARIES_KEY)?.unwrap_or_default();
    let total = keys.len() + 2;
    let mut summary = ImportSummary::default();
    let mut used = HashSet::new();

    for (i, key) in keys.iter().enumerate() {
        progress.stage(i + 1, total, key);
        let target = dest.join("libraries").join(unique_name(key, &mut used));
        summary.files += restore_dir(importer, key, &target, progress)?;
        summary.libraries.push((key.clone(), target));
    }

    progress.stage(total - 1, total, "Settings and plugins");
    if importer.metadata().contains_key(CONFIG_DIR_KEY) {
        let target = dest.join(CONFIG_DIR_KEY);
        summary.files += restore_dir(importer, CONFIG_DIR_KEY, &target, progress)?;
        summary.config_dir = Some(target);
    }

    summary.corrupted = importer.corrupted_files();
    info!(
        "Imported {} libraries ({} files) into {:?}, {} corrupted",
        summary.libraries.len(),
        summary.files,
        dest,
        summary.corrupted.len()
    );
    progress.stage(total, total, "Completed");
    Ok(summary)
}

fn restore_dir(
    importer: &Importer,
    dir_key: &str,
    target: &Path,
    progress: &mut dyn Progress,
) -> Result<usize> {
    std::fs::create_dir_all(target)?;
    importer.import_dir_with(dir_key, target, |relative, record| {
        progress.file(relative, record.length)
    })
}

/// Last path component of a library key, made unique among `used`
fn unique_name(key: &str, used: &mut HashSet<String>) -> String {
    let base = key
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("library")
        .to_string();

    let mut name = base.clone();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{}-{}", base, n);
        n += 1;
    }
    name
}
