use std::path::{Component, Path, PathBuf};

use crate::error::{IndexError, Result};

/// Sandboxes caller-supplied paths against the configured source root.
///
/// Both roots are canonicalized once at construction, so later checks are
/// plain component-prefix comparisons. Symlinked targets are resolved
/// before the containment check, which is what catches link-based escapes.
#[derive(Debug, Clone)]
pub struct PathValidator {
    source_root: PathBuf,
    index_dir: PathBuf,
}

impl PathValidator {
    /// Build a validator for `source_root` with `index_dir` excluded.
    ///
    /// Creates the index directory if missing (the database lands there
    /// before the first scan).
    ///
    /// # Errors
    /// Returns `IndexError::Io` if either directory cannot be
    /// created/canonicalized.
    pub fn new(source_root: &Path, index_dir: &Path) -> Result<Self> {
        let source_root = source_root.canonicalize()?;
        std::fs::create_dir_all(index_dir)?;
        let index_dir = index_dir.canonicalize()?;
        Ok(Self { source_root, index_dir })
    }

    /// Resolve a caller-supplied path and check it against the sandbox.
    ///
    /// Relative paths are taken relative to the source root. Existing
    /// paths are fully canonicalized (resolving symlinks); missing paths
    /// are normalized lexically so a not-yet-existing target can still be
    /// rejected for traversal before any I/O happens.
    ///
    /// # Errors
    /// - `IndexError::PathOutsideRoot` if the resolved path escapes the
    ///   source root
    /// - `IndexError::PathInIndexDir` if it lands in the index directory
    pub fn resolve(&self, raw: &Path) -> Result<PathBuf> {
        let absolute =
            if raw.is_absolute() { raw.to_path_buf() } else { self.source_root.join(raw) };

        let resolved = match absolute.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => normalize_lexically(&absolute),
        };

        if !contained_in(&resolved, &self.source_root) {
            return Err(IndexError::PathOutsideRoot { path: raw.display().to_string() });
        }
        if resolved.starts_with(&self.index_dir) {
            return Err(IndexError::PathInIndexDir { path: raw.display().to_string() });
        }

        Ok(resolved)
    }

    /// Derive the canonical-relative form stored in FileRecords.
    ///
    /// # Errors
    /// Returns `IndexError::PathOutsideRoot` if `path` is not under the
    /// source root.
    pub fn relative(&self, path: &Path) -> Result<String> {
        let rel = path
            .strip_prefix(&self.source_root)
            .map_err(|_| IndexError::PathOutsideRoot { path: path.display().to_string() })?;
        Ok(rel.to_string_lossy().into_owned())
    }

    /// True if `path` sits inside the excluded index directory.
    #[must_use]
    pub fn is_inside_index_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.index_dir)
    }

    /// Canonicalized source root.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Canonicalized index directory.
    #[must_use]
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }
}

/// Prefix containment with an explicit guard against lingering `..`
/// components (lexically-normalized paths can still carry them).
fn contained_in(path: &Path, root: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) => rel.components().all(|c| c != Component::ParentDir),
        Err(_) => false,
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn validator(root: &Path) -> PathValidator {
        PathValidator::new(root, &root.join("indexes")).unwrap()
    }

    #[test]
    fn test_accepts_relative_path_inside_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let v = validator(dir.path());

        let resolved = v.resolve(Path::new("notes.txt")).unwrap();
        assert!(resolved.ends_with("notes.txt"));
        assert_eq!(v.relative(&resolved).unwrap(), "notes.txt");
    }

    #[test]
    fn test_rejects_traversal() {
        let dir = tempdir().unwrap();
        let v = validator(dir.path());

        let err = v.resolve(Path::new("../outside.txt")).unwrap_err();
        assert!(matches!(err, IndexError::PathOutsideRoot { .. }));
    }

    #[test]
    fn test_rejects_absolute_path_outside_root() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let v = validator(dir.path());

        let err = v.resolve(&other.path().join("file.txt")).unwrap_err();
        assert!(matches!(err, IndexError::PathOutsideRoot { .. }));
    }

    #[test]
    fn test_rejects_path_in_index_dir() {
        let dir = tempdir().unwrap();
        let v = validator(dir.path());
        fs::write(dir.path().join("indexes").join("search.db"), b"x").unwrap();

        let err = v.resolve(Path::new("indexes/search.db")).unwrap_err();
        assert!(matches!(err, IndexError::PathInIndexDir { .. }));
    }

    #[test]
    fn test_missing_target_is_still_sandboxed() {
        let dir = tempdir().unwrap();
        let v = validator(dir.path());

        // Does not exist yet; validation must work without I/O.
        let resolved = v.resolve(Path::new("future/file.txt")).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));

        let err = v.resolve(Path::new("future/../../escape.txt")).unwrap_err();
        assert!(matches!(err, IndexError::PathOutsideRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();
        let v = validator(dir.path());

        let err = v.resolve(Path::new("link.txt")).unwrap_err();
        assert!(matches!(err, IndexError::PathOutsideRoot { .. }));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/./c/../d")),
            PathBuf::from("/a/b/d")
        );
        assert_eq!(normalize_lexically(Path::new("/a/../../b")), PathBuf::from("/../b"));
    }
}
