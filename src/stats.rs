use serde::Serialize;

use crate::error::Result;
use crate::storage::{self, Storage};

/// Snapshot of index health.
///
/// `indexed_files` counts error-free files, `total_documents` counts
/// searchable rows; the two can differ transiently while a scan is
/// mid-flight. `last_scan` is `"Never"` for a virgin index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub indexed_files: u64,
    pub last_scan: String,
    pub index_size_mb: f64,
    pub total_documents: u64,
    pub errors_encountered: u64,
}

/// Read-only aggregate reporting over one open store.
///
/// Never takes the indexing guard; the figures are eventually consistent
/// with any in-flight scan.
pub struct StatsReporter<'a> {
    storage: &'a Storage,
}

impl<'a> StatsReporter<'a> {
    pub const fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Collect current index statistics.
    ///
    /// # Errors
    /// Storage errors pass through, including the corruption signal.
    pub fn get_stats(&self) -> Result<IndexStats> {
        let indexed_files = self.storage.indexed_file_count()?;
        let total_documents = self.storage.document_count()?;
        let errors_encountered = self.storage.error_count()?;

        let last_scan = self
            .storage
            .last_indexed_at()?
            .map_or_else(|| "Never".to_string(), storage::format_timestamp);

        #[allow(clippy::cast_precision_loss)]
        let size_mb = self.storage.database_size_bytes()? as f64 / (1024.0 * 1024.0);

        Ok(IndexStats {
            indexed_files,
            last_scan,
            index_size_mb: storage::round2(size_mb),
            total_documents,
            errors_encountered,
        })
    }
}
