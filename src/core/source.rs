//! Injected producers of archive entries
//!
//! The exporter never decides *what* to export. Callers hand it an
//! [`ExportSource`] that yields `(key, length, stream, mtime)` entries, so
//! application-specific traversal (databases, preference stores, config
//! directories) stays outside the container format.

use crate::error::Result;
use crate::manifest::system_time_to_mtime;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One payload to be archived
pub struct SourceEntry {
    /// Archive key, unique within one export
    pub key: String,

    /// Expected payload length, reserved before writing
    pub length: u64,

    /// Payload bytes
    pub reader: Box<dyn Read>,

    /// Modification time as Unix seconds
    pub mtime: Option<f64>,
}

impl SourceEntry {
    pub fn new(key: impl Into<String>, length: u64, reader: Box<dyn Read>) -> Self {
        SourceEntry {
            key: key.into(),
            length,
            reader,
            mtime: None,
        }
    }

    pub fn with_mtime(mut self, mtime: f64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Entry for a file on disk, using its size and modification time
    pub fn from_path<P: AsRef<Path>>(key: impl Into<String>, path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let meta = file.metadata()?;
        Ok(SourceEntry {
            key: key.into(),
            length: meta.len(),
            reader: Box::new(file),
            mtime: meta.modified().ok().map(system_time_to_mtime),
        })
    }
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("key", &self.key)
            .field("length", &self.length)
            .field("mtime", &self.mtime)
            .finish()
    }
}

/// A producer of entries for [`Exporter::export_source`](crate::Exporter::export_source)
pub trait ExportSource {
    /// Next entry, or `None` when the source is exhausted
    fn next_entry(&mut self) -> Result<Option<SourceEntry>>;
}

impl<I> ExportSource for I
where
    I: Iterator<Item = Result<SourceEntry>>,
{
    fn next_entry(&mut self) -> Result<Option<SourceEntry>> {
        self.next().transpose()
    }
}

/// In-memory source, mostly useful for tests and small generated payloads
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: VecDeque<(String, Vec<u8>, Option<f64>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push_back((key.into(), data.into(), None));
        self
    }

    pub fn push_with_mtime(
        &mut self,
        key: impl Into<String>,
        data: impl Into<Vec<u8>>,
        mtime: f64,
    ) -> &mut Self {
        self.entries.push_back((key.into(), data.into(), Some(mtime)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExportSource for MemorySource {
    fn next_entry(&mut self) -> Result<Option<SourceEntry>> {
        Ok(self.entries.pop_front().map(|(key, data, mtime)| SourceEntry {
            key,
            length: data.len() as u64,
            reader: Box::new(Cursor::new(data)),
            mtime,
        }))
    }
}

/// Every regular file under a directory, keyed by `"<prefix><relative/path>"`
#[derive(Debug)]
pub struct DirSource {
    prefix: String,
    files: VecDeque<(PathBuf, String)>,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P, prefix: impl Into<String>) -> Result<Self> {
        Ok(DirSource {
            prefix: prefix.into(),
            files: walk_files(root.as_ref())?.into(),
        })
    }

    /// Files still to be yielded, as `(full path, relative path)`
    pub fn pending(&self) -> impl Iterator<Item = &(PathBuf, String)> {
        self.files.iter()
    }
}

impl ExportSource for DirSource {
    fn next_entry(&mut self) -> Result<Option<SourceEntry>> {
        match self.files.pop_front() {
            Some((path, relative)) => {
                let key = format!("{}{}", self.prefix, relative);
                Ok(Some(SourceEntry::from_path(key, path)?))
            }
            None => Ok(None),
        }
    }
}

/// Regular files under `root` in sorted order, as `(full path, relative path)`
///
/// Relative paths always use `/` separators. Symlinks are not followed.
/// Unreadable directories and non-UTF-8 names are skipped with a warning.
pub fn walk_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    // Surface a missing root as an error rather than an empty export
    std::fs::metadata(root)?;

    let mut files = Vec::new();
    for entry_result in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        match relative_to_slash(relative) {
            Some(rel) => files.push((entry.path().to_path_buf(), rel)),
            None => warn!("Skipping non UTF-8 path {:?}", entry.path()),
        }
    }
    Ok(files)
}

fn relative_to_slash(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_files_sorted_with_slashes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        std::fs::write(dir.path().join("b/nested/deep.txt"), b"deep").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"c").unwrap();

        let files = walk_files(dir.path()).unwrap();
        let relative: Vec<_> = files.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(relative, vec!["a.txt", "b/nested/deep.txt", "c.txt"]);
    }

    #[test]
    fn test_walk_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(walk_files(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_memory_source_yields_in_order() {
        let mut source = MemorySource::new();
        source.push("one", b"1".to_vec()).push_with_mtime("two", b"22".to_vec(), 3.0);
        assert_eq!(source.len(), 2);

        let first = source.next_entry().unwrap().unwrap();
        assert_eq!((first.key.as_str(), first.length, first.mtime), ("one", 1, None));

        let second = source.next_entry().unwrap().unwrap();
        assert_eq!(second.length, 2);
        assert_eq!(second.mtime, Some(3.0));

        assert!(source.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_dir_source_keys_and_lengths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/x.bin"), [1u8; 10]).unwrap();

        let mut source = DirSource::new(dir.path(), "pfx:").unwrap();
        assert_eq!(source.pending().count(), 1);

        let entry = source.next_entry().unwrap().unwrap();
        assert_eq!(entry.key, "pfx:sub/x.bin");
        assert_eq!(entry.length, 10);
        assert!(entry.mtime.is_some());
        assert!(source.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_iterator_is_a_source() {
        let entries = vec![Ok(SourceEntry::new(
            "k",
            3,
            Box::new(Cursor::new(b"abc".to_vec())),
        ))];
        let mut source = entries.into_iter();
        let entry = source.next_entry().unwrap().unwrap();
        assert_eq!(entry.key, "k");
        assert!(source.next_entry().unwrap().is_none());
    }
}
