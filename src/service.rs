use std::path::PathBuf;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::indexer::{Indexer, RefreshOutcome};
use crate::paths::PathValidator;
use crate::search::SearchEngine;
use crate::stats::{IndexStats, StatsReporter};
use crate::storage::{PragmaConfig, SearchResult, Storage};

/// Long-lived facade over config, validation, indexing and search.
///
/// Every operation opens its own storage connection; WAL isolation lets
/// readers run while a scan writes. The facade is `Send + Sync`, so a
/// protocol layer may call it from concurrent tasks; writer exclusivity
/// comes from the indexing lane, not from connection sharing.
pub struct IndexService {
    indexer: Indexer,
    pragmas: PragmaConfig,
    db_path: PathBuf,
}

impl IndexService {
    /// Validate the config, open (healing if necessary) the store, and
    /// return the ready facade.
    ///
    /// Startup integrity gate: a store that fails `integrity_check` is
    /// rebuilt from empty before the facade is handed out. The initial
    /// full scan is the caller's first `refresh_index(None, ..)`.
    ///
    /// # Errors
    /// Returns `IndexError::ConfigInvalid` for bad configuration and
    /// storage errors if the database cannot be created.
    pub fn open(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let validator =
            PathValidator::new(&config.source_directory, &config.index_output_directory)?;
        let db_path = config.db_path();
        let pragmas = PragmaConfig::default();

        let storage = Storage::open(&db_path, &pragmas)?;
        if !storage.health_check()? {
            tracing::error!(path = %db_path.display(), "integrity check failed, rebuilding index");
            drop(storage);
            Storage::rebuild(&db_path, &pragmas)?;
        }

        tracing::info!(
            source = %validator.source_root().display(),
            database = %db_path.display(),
            "index service ready"
        );

        Ok(Self { indexer: Indexer::new(config, validator), pragmas, db_path })
    }

    /// Configuration the service was opened with.
    pub const fn config(&self) -> &IndexConfig {
        self.indexer.config()
    }

    /// Ranked full-text search.
    ///
    /// On a corruption signal the store is rebuilt and the query retried
    /// once against the now-empty store, so a damaged index degrades to
    /// empty results instead of a permanent failure.
    ///
    /// # Errors
    /// Returns `IndexError::EmptyQuery` for blank queries; storage errors
    /// if even the rebuilt store cannot be read.
    pub fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<SearchResult>> {
        self.read_with_recovery(|storage| SearchEngine::new(storage).search(query, limit))
    }

    /// Substring lookup on indexed paths (SQL LIKE pattern).
    ///
    /// # Errors
    /// Storage errors pass through after the one rebuild attempt.
    pub fn search_by_path(&self, pattern: &str, limit: Option<u32>) -> Result<Vec<SearchResult>> {
        self.read_with_recovery(|storage| SearchEngine::new(storage).search_by_path(pattern, limit))
    }

    /// Current index statistics.
    ///
    /// # Errors
    /// Storage errors pass through after the one rebuild attempt.
    pub fn get_index_stats(&self) -> Result<IndexStats> {
        self.read_with_recovery(|storage| StatsReporter::new(storage).get_stats())
    }

    /// Refresh the index: full scan when `target` is `None`, exactly one
    /// file otherwise (single-file refresh bypasses change detection).
    ///
    /// Mirrors the wire contract: validation and batch failures come back
    /// as `RefreshOutcome { success: false, errors }`. Only the busy
    /// signal is a Rust error, so callers can tell fail-fast apart from a
    /// completed-with-errors pass. A corruption signal triggers a rebuild
    /// followed by one more attempt, restoring the index from the source
    /// tree.
    ///
    /// # Errors
    /// Returns `IndexError::ScanInProgress` when another refresh holds
    /// the lane.
    pub fn refresh_index(&self, target: Option<&str>, force: bool) -> Result<RefreshOutcome> {
        match self.run_refresh(target, force) {
            Ok(outcome) => Ok(outcome),
            Err(IndexError::ScanInProgress) => Err(IndexError::ScanInProgress),
            Err(IndexError::IndexCorrupted) => {
                tracing::error!(
                    path = %self.db_path.display(),
                    "index corrupted mid-refresh, rebuilding and rescanning"
                );
                Storage::rebuild(&self.db_path, &self.pragmas)?;
                match self.run_refresh(target, force) {
                    Ok(outcome) => Ok(outcome),
                    Err(IndexError::ScanInProgress) => Err(IndexError::ScanInProgress),
                    Err(e) => Ok(failure_outcome(&e)),
                }
            }
            Err(e) => Ok(failure_outcome(&e)),
        }
    }

    fn run_refresh(&self, target: Option<&str>, force: bool) -> Result<RefreshOutcome> {
        let mut storage = Storage::open(&self.db_path, &self.pragmas)?;
        match target {
            Some(path) => self.indexer.refresh_one(&mut storage, path),
            None => self.indexer.run_full_scan(&mut storage, force),
        }
    }

    /// Run a read against a fresh connection; on the corruption signal,
    /// rebuild once and retry against the empty store.
    fn read_with_recovery<T>(&self, operation: impl Fn(&Storage) -> Result<T>) -> Result<T> {
        let storage = Storage::open(&self.db_path, &self.pragmas)?;
        match operation(&storage) {
            Err(IndexError::IndexCorrupted) => {
                tracing::error!(path = %self.db_path.display(), "index corrupted, rebuilding");
                drop(storage);
                let fresh = Storage::rebuild(&self.db_path, &self.pragmas)?;
                operation(&fresh)
            }
            result => result,
        }
    }
}

fn failure_outcome(error: &IndexError) -> RefreshOutcome {
    RefreshOutcome {
        success: false,
        files_processed: 0,
        files_added: 0,
        files_updated: 0,
        files_removed: 0,
        duration_seconds: 0.0,
        errors: vec![error.to_string()],
    }
}
