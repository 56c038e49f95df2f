use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::DB_NAME;
use crate::error::{IndexError, Result};

fn default_index_dir() -> PathBuf {
    PathBuf::from("./indexes")
}

fn default_included_extensions() -> Vec<String> {
    vec![".txt".to_string(), ".md".to_string(), ".rst".to_string()]
}

const fn default_scan_interval() -> u64 {
    300
}

const fn default_max_file_size_mb() -> f64 {
    10.0
}

/// Indexing configuration.
///
/// The calling layer acquires these values (file, env, flags; not this
/// crate's concern) and hands them to [`crate::IndexService::open`], which
/// runs [`IndexConfig::validate`] before touching the filesystem.
///
/// An empty `included_extensions` list admits every extension not named in
/// `excluded_extensions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory tree to index.
    pub source_directory: PathBuf,
    /// Where the search database lives; always excluded from scanning.
    #[serde(default = "default_index_dir")]
    pub index_output_directory: PathBuf,
    /// Dot-prefixed extensions to index (empty = all).
    #[serde(default = "default_included_extensions")]
    pub included_extensions: Vec<String>,
    /// Dot-prefixed extensions to skip.
    #[serde(default)]
    pub excluded_extensions: Vec<String>,
    /// Interval for the caller's periodic scan scheduler.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,
    /// Per-file size cap; larger files are recorded as errored, not read.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,
}

impl IndexConfig {
    /// Config for `source_directory` with every other field defaulted.
    pub fn new(source_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_directory: source_directory.into(),
            index_output_directory: default_index_dir(),
            included_extensions: default_included_extensions(),
            excluded_extensions: Vec::new(),
            scan_interval_seconds: default_scan_interval(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }

    /// Validate the configuration.
    ///
    /// The process must not run against an invalid config, so the service
    /// facade calls this before opening storage.
    ///
    /// # Errors
    /// Returns `IndexError::ConfigInvalid` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.source_directory.exists() {
            return Err(self.invalid("source_directory", "does not exist"));
        }
        if !self.source_directory.is_dir() {
            return Err(self.invalid("source_directory", "not a directory"));
        }

        // Source and index trees must stay disjoint at the top; the index
        // directory may not exist yet, so compare best-effort canonical forms.
        let source = canonical_or_owned(&self.source_directory);
        let index = canonical_or_owned(&self.index_output_directory);
        if source == index {
            return Err(IndexError::ConfigInvalid {
                field: "index_output_directory".to_string(),
                value: self.index_output_directory.display().to_string(),
                reason: "must differ from source_directory".to_string(),
            });
        }

        if self.scan_interval_seconds < 60 {
            return Err(IndexError::ConfigInvalid {
                field: "scan_interval_seconds".to_string(),
                value: self.scan_interval_seconds.to_string(),
                reason: "must be at least 60".to_string(),
            });
        }

        if self.max_file_size_mb <= 0.0 || self.max_file_size_mb > 100.0 {
            return Err(IndexError::ConfigInvalid {
                field: "max_file_size_mb".to_string(),
                value: self.max_file_size_mb.to_string(),
                reason: "must be between 0 and 100".to_string(),
            });
        }

        for ext in self.included_extensions.iter().chain(&self.excluded_extensions) {
            if !ext.starts_with('.') {
                return Err(IndexError::ConfigInvalid {
                    field: "extensions".to_string(),
                    value: ext.clone(),
                    reason: "must start with '.'".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Size cap in bytes.
    #[must_use]
    pub fn max_file_size_bytes(&self) -> u64 {
        // Validated range keeps this well inside u64.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = (self.max_file_size_mb * 1024.0 * 1024.0) as u64;
        bytes
    }

    /// Path of the search database inside the index output directory.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.index_output_directory.join(DB_NAME)
    }

    fn invalid(&self, field: &str, reason: &str) -> IndexError {
        IndexError::ConfigInvalid {
            field: field.to_string(),
            value: self.source_directory.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

fn canonical_or_owned(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
