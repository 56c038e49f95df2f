use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Instant, UNIX_EPOCH};

use crate::changes::{self, Change};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::paths::PathValidator;
use crate::scanner::FileScanner;
use crate::storage::{self, Storage};
use crate::text::{self, Classification, Decoded};

/// Result of one refresh pass, full scan or single file.
///
/// `files_processed` counts successful indexing only; files that failed
/// land in `errors` instead. `success` is simply `errors.is_empty()`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub success: bool,
    pub files_processed: u64,
    pub files_added: u64,
    pub files_updated: u64,
    pub files_removed: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
}

impl RefreshOutcome {
    fn start() -> Self {
        Self {
            success: false,
            files_processed: 0,
            files_added: 0,
            files_updated: 0,
            files_removed: 0,
            duration_seconds: 0.0,
            errors: Vec::new(),
        }
    }

    fn seal(mut self, started: Instant) -> Self {
        self.success = self.errors.is_empty();
        self.duration_seconds = storage::round2(started.elapsed().as_secs_f64());
        self
    }
}

/// How one file left the per-file processing pipeline.
enum Disposition {
    /// Content indexed, metadata and document both replaced.
    Indexed,
    /// Not indexable; an error record was written instead.
    Recorded(String),
}

/// Incremental indexing engine.
///
/// Owns the single-writer discipline: every scan or single-file refresh
/// runs inside a non-reentrant lane, and a second caller fails fast with
/// `ScanInProgress` instead of queueing behind a long walk.
pub struct Indexer {
    config: IndexConfig,
    validator: PathValidator,
    scan_lane: Mutex<()>,
}

impl Indexer {
    #[must_use]
    pub const fn new(config: IndexConfig, validator: PathValidator) -> Self {
        Self { config, validator, scan_lane: Mutex::new(()) }
    }

    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub const fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// Scan the whole source tree and reconcile the index with it.
    ///
    /// Unchanged files are skipped unless `force` is set; files whose
    /// size or mtime moved are reprocessed; records for paths missing
    /// from the walk are pruned. One bad file is captured in the outcome
    /// and never aborts the batch.
    ///
    /// # Errors
    /// Returns `IndexError::ScanInProgress` if another pass holds the
    /// lane, `IndexError::IndexCorrupted` if the store trips mid-batch,
    /// `IndexError::Database` for other storage failures.
    pub fn run_full_scan(&self, storage: &mut Storage, force: bool) -> Result<RefreshOutcome> {
        let _lane = self.acquire_lane()?;
        let started = Instant::now();
        let mut outcome = RefreshOutcome::start();

        tracing::info!(
            root = %self.validator.source_root().display(),
            force,
            "starting full directory scan"
        );

        let entries = FileScanner::new(&self.config, &self.validator).scan();
        let known = storage.metadata_map()?;

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            seen.insert(entry.rel.clone());

            let change = changes::classify(known.get(&entry.rel), entry, force);
            if change == Change::Unchanged {
                continue;
            }

            match self.index_one(storage, &entry.abs, &entry.rel) {
                Ok(Disposition::Indexed) => {
                    outcome.files_processed += 1;
                    if change == Change::Added {
                        outcome.files_added += 1;
                    } else {
                        outcome.files_updated += 1;
                    }
                }
                Ok(Disposition::Recorded(reason)) => {
                    outcome.errors.push(format!("Failed to index {}: {reason}", entry.rel));
                }
                Err(IndexError::IndexCorrupted) => return Err(IndexError::IndexCorrupted),
                Err(e) => {
                    tracing::warn!(path = entry.rel.as_str(), error = %e, "failed to index file");
                    outcome.errors.push(format!("Failed to index {}: {e}", entry.rel));
                }
            }
        }

        for rel in changes::removed_paths(&known, &seen) {
            storage.delete_document(&rel)?;
            tracing::info!(path = rel.as_str(), "removed deleted file from index");
            outcome.files_removed += 1;
        }

        let outcome = outcome.seal(started);
        tracing::info!(
            processed = outcome.files_processed,
            added = outcome.files_added,
            updated = outcome.files_updated,
            removed = outcome.files_removed,
            errors = outcome.errors.len(),
            "scan complete"
        );
        Ok(outcome)
    }

    /// Reprocess exactly one file, bypassing the walk and change
    /// detection (a targeted refresh is always forced).
    ///
    /// The target is validated against the source root and the index
    /// subtree before any I/O. A validated path that no longer exists on
    /// disk is reported in the outcome's errors, not as a Rust error.
    ///
    /// # Errors
    /// Returns `IndexError::PathOutsideRoot` / `IndexError::PathInIndexDir`
    /// for invalid targets, `IndexError::ScanInProgress` if the lane is
    /// held, and storage errors as in `run_full_scan`.
    pub fn refresh_one(&self, storage: &mut Storage, target: &str) -> Result<RefreshOutcome> {
        let _lane = self.acquire_lane()?;
        let started = Instant::now();
        let mut outcome = RefreshOutcome::start();

        let abs = self.validator.resolve(Path::new(target))?;
        let rel = self.validator.relative(&abs)?;

        if abs.exists() {
            let prior = storage.get_record(&rel)?;
            match self.index_one(storage, &abs, &rel) {
                Ok(Disposition::Indexed) => {
                    outcome.files_processed = 1;
                    if prior.is_some() {
                        outcome.files_updated = 1;
                    } else {
                        outcome.files_added = 1;
                    }
                }
                Ok(Disposition::Recorded(reason)) => {
                    outcome.errors.push(format!("Failed to index {rel}: {reason}"));
                }
                Err(IndexError::IndexCorrupted) => return Err(IndexError::IndexCorrupted),
                Err(e) => {
                    tracing::warn!(path = rel.as_str(), error = %e, "failed to index file");
                    outcome.errors.push(format!("Failed to index {rel}: {e}"));
                }
            }
        } else {
            let error = IndexError::FileMissing { path: abs.display().to_string() };
            outcome.errors.push(error.to_string());
        }

        Ok(outcome.seal(started))
    }

    /// Process one file end to end: re-stat, load, atomic upsert. Scan
    /// descriptors can be stale by the time the file is read, so the
    /// stored stat pair comes from here.
    ///
    /// Load failures (oversized, binary, unreadable) are an audit
    /// outcome, not a failure: the error text becomes the stored record
    /// for the path. Only stat and storage errors propagate.
    fn index_one(&self, storage: &mut Storage, abs: &Path, rel: &str) -> Result<Disposition> {
        let metadata = std::fs::metadata(abs)?;
        let size = metadata.len();
        let mtime =
            metadata.modified()?.duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64());

        match self.load_text(abs, rel, size) {
            Ok(decoded) => {
                storage.upsert_document(rel, &decoded.content, size, mtime, decoded.encoding)?;
                tracing::debug!(path = rel, size, encoding = decoded.encoding, "indexed file");
                Ok(Disposition::Indexed)
            }
            Err(error) => {
                let reason = error.to_string();
                storage.record_error(rel, size, mtime, &reason)?;
                Ok(Disposition::Recorded(reason))
            }
        }
    }

    /// Read and decode one file, rejecting oversized or binary content.
    /// Never touches storage; every error from here is a per-file
    /// condition whose text is stored as the path's audit record.
    fn load_text(&self, abs: &Path, rel: &str, size: u64) -> Result<Decoded> {
        let cap = self.config.max_file_size_bytes();
        if size > cap {
            tracing::warn!(path = rel, size, "skipping oversized file");
            return Err(IndexError::FileTooLarge { size, max: cap });
        }

        let bytes = match read_capped(abs, size, cap) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(path = rel, error = %error, "cannot read file");
                return Err(error);
            }
        };
        if bytes.len() as u64 > cap {
            // grew past the cap between stat and read
            return Err(IndexError::FileTooLarge { size: bytes.len() as u64, max: cap });
        }

        let sample = &bytes[..bytes.len().min(text::SAMPLE_SIZE)];
        if let Classification::Binary(detail) = text::classify(abs, sample) {
            tracing::debug!(path = rel, detail, "skipping binary file");
            return Err(IndexError::NotText { reason: detail.to_string() });
        }

        let decoded = text::decode(&bytes);
        if decoded.lossy {
            tracing::warn!(
                path = rel,
                encoding = decoded.encoding,
                "decoded with lossy single-byte fallback"
            );
        }
        Ok(decoded)
    }

    fn acquire_lane(&self) -> Result<MutexGuard<'_, ()>> {
        match self.scan_lane.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(IndexError::ScanInProgress),
            // The lane guards no data, so a poisoned lock is still usable.
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}

fn read_capped(path: &Path, size: u64, cap: u64) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    #[allow(clippy::cast_possible_truncation)]
    let mut bytes = Vec::with_capacity(size.min(cap) as usize);
    // One extra byte so concurrent growth past the cap is detectable.
    file.take(cap.saturating_add(1)).read_to_end(&mut bytes)?;
    Ok(bytes)
}
