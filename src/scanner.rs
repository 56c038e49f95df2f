use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::config::IndexConfig;
use crate::paths::PathValidator;
use crate::text;

/// One candidate file yielded by a scan pass: the on-disk path, the
/// canonical-relative form stored in records, and the stat pair change
/// detection compares.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub abs: PathBuf,
    pub rel: String,
    pub size: u64,
    pub mtime: f64,
}

/// Walks the source tree yielding candidate descriptors in stable path
/// order.
///
/// Symlinks are never followed, the index output directory is pruned
/// (even when nested under the source root), and extension filters apply
/// before any file is opened. Unreadable entries are logged and skipped;
/// a walk never aborts over one bad subtree.
pub struct FileScanner<'a> {
    config: &'a IndexConfig,
    validator: &'a PathValidator,
}

impl<'a> FileScanner<'a> {
    pub const fn new(config: &'a IndexConfig, validator: &'a PathValidator) -> Self {
        Self { config, validator }
    }

    /// Run one scan pass.
    pub fn scan(&self) -> Vec<ScanEntry> {
        let index_dir = self.validator.index_dir().to_path_buf();
        let walk = WalkBuilder::new(self.validator.source_root())
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(move |entry| !entry.path().starts_with(&index_dir))
            .build();

        let mut entries = Vec::new();

        for result in walk {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "directory walk error");
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else { continue };
            if file_type.is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symlink");
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            if !self.extension_allowed(entry.path()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "cannot stat file");
                    continue;
                }
            };

            let mtime = match metadata.modified() {
                Ok(modified) => {
                    modified.duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64())
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "cannot read mtime");
                    continue;
                }
            };

            let Ok(rel) = self.validator.relative(entry.path()) else { continue };

            entries.push(ScanEntry { rel, size: metadata.len(), mtime, abs: entry.into_path() });
        }

        entries
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        let ext = text::extension_of(path);

        if !self.config.included_extensions.is_empty() {
            let included = ext
                .as_deref()
                .is_some_and(|e| {
                    self.config.included_extensions.iter().any(|i| i.eq_ignore_ascii_case(e))
                });
            if !included {
                return false;
            }
        }

        if let Some(e) = ext.as_deref() {
            if self.config.excluded_extensions.iter().any(|x| x.eq_ignore_ascii_case(e)) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn scan_root(root: &Path, config: &IndexConfig) -> Vec<ScanEntry> {
        let validator = PathValidator::new(root, &config.index_output_directory).unwrap();
        FileScanner::new(config, &validator).scan()
    }

    fn config_for(root: &Path) -> IndexConfig {
        let mut config = IndexConfig::new(root);
        config.index_output_directory = root.join("indexes");
        config
    }

    #[test]
    fn test_scan_yields_stable_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.txt"), "c").unwrap();

        let config = config_for(dir.path());
        let rels: Vec<String> = scan_root(dir.path(), &config).into_iter().map(|e| e.rel).collect();
        assert_eq!(rels, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_extension_include_filter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.md"), "md").unwrap();
        fs::write(dir.path().join("skip.log"), "log").unwrap();
        fs::write(dir.path().join("noext"), "bare").unwrap();

        let config = config_for(dir.path());
        let rels: Vec<String> = scan_root(dir.path(), &config).into_iter().map(|e| e.rel).collect();
        assert_eq!(rels, vec!["keep.md"]);
    }

    #[test]
    fn test_empty_include_admits_all_but_excluded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.log"), "log").unwrap();
        fs::write(dir.path().join("b.tmp"), "tmp").unwrap();
        fs::write(dir.path().join("noext"), "bare").unwrap();

        let mut config = config_for(dir.path());
        config.included_extensions = Vec::new();
        config.excluded_extensions = vec![".tmp".to_string()];

        let rels: Vec<String> = scan_root(dir.path(), &config).into_iter().map(|e| e.rel).collect();
        assert_eq!(rels, vec!["a.log", "noext"]);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("UPPER.TXT"), "shouty").unwrap();

        let config = config_for(dir.path());
        let entries = scan_root(dir.path(), &config);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel, "UPPER.TXT");
    }

    #[test]
    fn test_index_subtree_is_never_scanned() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "real").unwrap();
        let index_dir = dir.path().join("indexes");
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(index_dir.join("planted.txt"), "should not appear").unwrap();

        let config = config_for(dir.path());
        let rels: Vec<String> = scan_root(dir.path(), &config).into_iter().map(|e| e.rel).collect();
        assert_eq!(rels, vec!["real.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), "target").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt"))
            .unwrap();

        let config = config_for(dir.path());
        let rels: Vec<String> = scan_root(dir.path(), &config).into_iter().map(|e| e.rel).collect();
        assert_eq!(rels, vec!["target.txt"]);
    }

    #[test]
    fn test_descriptor_carries_stat_pair() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sized.txt"), "12345").unwrap();

        let config = config_for(dir.path());
        let entries = scan_root(dir.path(), &config);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 5);
        assert!(entries[0].mtime > 0.0);
    }
}
