//! Validation for relative paths stored in directory manifests
//!
//! Directory manifests come from the archive, which may have been produced
//! elsewhere or tampered with. Before a stored relative path is joined onto a
//! restore destination it must be proven to stay inside that destination.

use crate::error::{ParcelError, Result};
use std::path::{Path, PathBuf};

/// Resolve a stored `/`-separated relative path under `root`
///
/// # Rules
/// - Must not be empty
/// - Must not be absolute (leading `/` or `\`)
/// - Must not contain `..` segments
/// - `.` and empty segments are ignored
/// - On Windows, segments must not contain `:` (drive or stream prefixes)
///
/// # Examples
///
/// ```
/// use parcel_rs::validation::resolve_under;
/// use std::path::Path;
///
/// let path = resolve_under(Path::new("/restore"), "plugins/a.zip").unwrap();
/// assert_eq!(path, Path::new("/restore/plugins/a.zip"));
///
/// assert!(resolve_under(Path::new("/restore"), "../etc/passwd").is_err());
/// assert!(resolve_under(Path::new("/restore"), "/etc/passwd").is_err());
/// ```
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(ParcelError::UnsafePath(relative.to_string()));
    }

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(ParcelError::UnsafePath(relative.to_string())),
            s if cfg!(windows) && s.contains(':') => {
                return Err(ParcelError::UnsafePath(relative.to_string()))
            }
            s => {
                resolved.push(s);
                depth += 1;
            }
        }
    }

    if depth == 0 {
        return Err(ParcelError::UnsafePath(relative.to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_relative_paths() {
        let root = Path::new("/r");
        assert_eq!(resolve_under(root, "a.txt").unwrap(), Path::new("/r/a.txt"));
        assert_eq!(
            resolve_under(root, "a/b/c.txt").unwrap(),
            Path::new("/r/a/b/c.txt")
        );
        assert_eq!(
            resolve_under(root, "./a//b.txt").unwrap(),
            Path::new("/r/a/b.txt")
        );
    }

    #[test]
    fn test_unsafe_relative_paths() {
        let root = Path::new("/r");
        assert!(resolve_under(root, "").is_err()); // empty
        assert!(resolve_under(root, ".").is_err()); // resolves to root itself
        assert!(resolve_under(root, "/abs").is_err()); // absolute
        assert!(resolve_under(root, "\\abs").is_err()); // absolute (windows style)
        assert!(resolve_under(root, "../up").is_err()); // parent
        assert!(resolve_under(root, "a/../../up").is_err()); // nested parent
        assert!(resolve_under(root, "a\\..\\up").is_err()); // backslash parent
    }
}
