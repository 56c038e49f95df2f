use chrono::{DateTime, Local};
use rusqlite::{OptionalExtension, ToSql};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{IndexError, Result};
use crate::{DB_SHM_SUFFIX, DB_WAL_SUFFIX};

/// Smallest byte count a real SQLite file can have.
const MIN_DB_FILE_SIZE: u64 = 100;

/// Magic bytes at the start of every SQLite database file.
const SQLITE_HEADER: [u8; 16] = *b"SQLite format 3\0";

/// Idempotent schema: an FTS5 document table plus a plain metadata table
/// keyed by relative path. `path` and `last_modified` ride along UNINDEXED
/// so only content participates in token matching.
const SCHEMA: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS documents USING fts5(
    path UNINDEXED,
    content,
    last_modified UNINDEXED,
    tokenize='porter'
);

CREATE TABLE IF NOT EXISTS file_metadata (
    path TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    mtime REAL NOT NULL,
    last_indexed REAL NOT NULL,
    encoding TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_mtime ON file_metadata(mtime);
";

/// One ranked match returned by full-text or path queries.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub path: String,
    pub snippet: String,
    pub score: f64,
    pub last_modified: String,
}

/// Stored per-file bookkeeping row.
///
/// `error` is non-null exactly when the last processing attempt failed;
/// such rows never have a document behind them.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub mtime: f64,
    pub last_indexed: f64,
    pub encoding: Option<String>,
    pub error: Option<String>,
}

/// Database configuration for PRAGMA settings.
#[derive(Debug, Clone)]
pub struct PragmaConfig {
    pub journal_mode: String,
    pub synchronous: String,
    pub busy_timeout_ms: i64,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// FTS5-backed document store.
///
/// Connections are scoped to one operation: each caller opens a `Storage`,
/// uses it, and drops it. WAL mode gives concurrent readers a committed
/// snapshot while a writer works, so no connection sharing is needed.
pub struct Storage {
    conn: rusqlite::Connection,
    path: PathBuf,
}

impl Storage {
    fn apply_pragma(conn: &rusqlite::Connection, name: &str, value: impl ToSql) -> Result<()> {
        conn.pragma_update(None, name, value).map_err(db_err)
    }

    /// Open the database at `db_path`, creating it if needed.
    ///
    /// A pre-existing file is validated first (minimum size, header magic,
    /// probe query). A file that fails validation is removed together with
    /// its WAL/SHM siblings and recreated empty, so a damaged index never
    /// blocks startup.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the file cannot be opened or a
    /// PRAGMA fails, `IndexError::Io` if stale files cannot be removed.
    pub fn open(db_path: &Path, config: &PragmaConfig) -> Result<Self> {
        if config.busy_timeout_ms < 0 {
            return Err(IndexError::ConfigInvalid {
                field: "busy_timeout_ms".to_string(),
                value: config.busy_timeout_ms.to_string(),
                reason: "must be >= 0".to_string(),
            });
        }

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if db_path.exists() && !file_is_valid_sqlite(db_path) {
            tracing::warn!(
                path = %db_path.display(),
                "existing database file failed validation, recreating"
            );
            Self::remove_database_files(db_path)?;
        }

        let conn = rusqlite::Connection::open(db_path).map_err(db_err)?;

        Self::apply_pragma(&conn, "journal_mode", &config.journal_mode)?;
        Self::apply_pragma(&conn, "synchronous", &config.synchronous)?;

        // Non-negative after the guard above.
        #[allow(clippy::cast_sign_loss)]
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        conn.busy_timeout(busy_timeout).map_err(db_err)?;

        conn.execute_batch(SCHEMA).map_err(db_err)?;

        Ok(Self { conn, path: db_path.to_path_buf() })
    }

    /// Delete the database files and reopen with a fresh schema.
    ///
    /// # Errors
    /// Returns `IndexError::Io` if the stale files cannot be removed, or
    /// any error `open` can return.
    pub fn rebuild(db_path: &Path, config: &PragmaConfig) -> Result<Self> {
        tracing::warn!(path = %db_path.display(), "rebuilding search index from scratch");
        Self::remove_database_files(db_path)?;
        Self::open(db_path, config)
    }

    /// Run `PRAGMA integrity_check` and report whether it passed.
    ///
    /// # Errors
    /// Returns `IndexError::IndexCorrupted` if the check itself cannot run
    /// against the file, `IndexError::Database` for other failures.
    pub fn health_check(&self) -> Result<bool> {
        let verdict: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(verdict.eq_ignore_ascii_case("ok"))
    }

    /// Path this store was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the document and metadata rows for `path`.
    ///
    /// Deletes then reinserts both rows in one transaction, so a concurrent
    /// reader sees either the fully-old or fully-new state.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if any statement fails.
    pub fn upsert_document(
        &mut self,
        path: &str,
        content: &str,
        size: u64,
        mtime: f64,
        encoding: &str,
    ) -> Result<()> {
        let size_i64 = checked_i64_from_u64(size, "file size")?;
        let last_modified = format_timestamp(mtime);
        let last_indexed = unix_now();

        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM documents WHERE path = ?1", [path]).map_err(db_err)?;
        tx.execute("DELETE FROM file_metadata WHERE path = ?1", [path]).map_err(db_err)?;
        tx.execute(
            "INSERT INTO documents (path, content, last_modified) VALUES (?1, ?2, ?3)",
            rusqlite::params![path, content, last_modified],
        )
        .map_err(db_err)?;
        tx.execute(
            "INSERT INTO file_metadata (path, size, mtime, last_indexed, encoding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![path, size_i64, mtime, last_indexed, encoding],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    /// Record a processing failure for `path`.
    ///
    /// Replaces the metadata row with one carrying the error message and
    /// removes any stale document, so failed files stay visible in stats
    /// but never in search results.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if any statement fails.
    pub fn record_error(&mut self, path: &str, size: u64, mtime: f64, message: &str) -> Result<()> {
        let size_i64 = checked_i64_from_u64(size, "file size")?;
        let last_indexed = unix_now();

        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM documents WHERE path = ?1", [path]).map_err(db_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO file_metadata (path, size, mtime, last_indexed, encoding, error)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            rusqlite::params![path, size_i64, mtime, last_indexed, message],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    /// Atomically remove the document and metadata rows for `path`.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if any statement fails.
    pub fn delete_document(&mut self, path: &str) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM documents WHERE path = ?1", [path]).map_err(db_err)?;
        tx.execute("DELETE FROM file_metadata WHERE path = ?1", [path]).map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    /// Load every metadata row keyed by path.
    ///
    /// One query per scan; change detection then runs against the in-memory
    /// map instead of a per-file SELECT.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn metadata_map(&self) -> Result<HashMap<String, FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, size, mtime, last_indexed, encoding, error FROM file_metadata",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_record).map_err(db_err)?;

        let mut map = HashMap::new();
        for row in rows {
            let record = row.map_err(db_err)?;
            map.insert(record.path.clone(), record);
        }
        Ok(map)
    }

    /// Fetch the metadata row for one path, if present.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn get_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, size, mtime, last_indexed, encoding, error
                 FROM file_metadata WHERE path = ?1",
            )
            .map_err(db_err)?;
        stmt.query_row([path], row_to_record).optional().map_err(db_err)
    }

    /// Ranked full-text query against the document table.
    ///
    /// `match_expr` must already be escaped; it is bound as a parameter so
    /// it can never splice into the SQL itself. BM25 scores negative-better,
    /// so ordering is ascending with path as deterministic tie-break, and
    /// the reported score is the absolute value. If FTS5 still rejects the
    /// expression, the query degrades to an empty result set with a warning.
    ///
    /// # Errors
    /// Returns `IndexError::IndexCorrupted` if the query trips on a damaged
    /// file, `IndexError::Database` for other failures.
    pub fn query(&self, match_expr: &str, limit: u32) -> Result<Vec<SearchResult>> {
        match self.run_match(match_expr, limit) {
            Ok(results) => Ok(results),
            Err(e) if is_match_syntax_error(&e) => {
                tracing::warn!(query = match_expr, error = %e, "FTS5 rejected match expression");
                Ok(Vec::new())
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn run_match(&self, match_expr: &str, limit: u32) -> rusqlite::Result<Vec<SearchResult>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path,
                    snippet(documents, 1, '<mark>', '</mark>', '...', 32),
                    bm25(documents),
                    last_modified
             FROM documents
             WHERE documents MATCH ?1
             ORDER BY bm25(documents), path
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![match_expr, limit], |row| {
            Ok(SearchResult {
                path: row.get(0)?,
                snippet: row.get(1)?,
                score: row.get::<_, f64>(2)?.abs(),
                last_modified: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Substring lookup on stored paths, ordered by path.
    ///
    /// The snippet is the first 200 content characters, ellipsis-suffixed
    /// when the content continues past the cut.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn query_by_path(&self, pattern: &str, limit: u32) -> Result<Vec<SearchResult>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, substr(content, 1, 200), last_modified
                 FROM documents
                 WHERE path LIKE ?1
                 ORDER BY path
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![pattern, limit], |row| {
                Ok(SearchResult {
                    path: row.get(0)?,
                    snippet: row.get(1)?,
                    score: 0.0,
                    last_modified: row.get(2)?,
                })
            })
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            let mut hit = row.map_err(db_err)?;
            if hit.snippet.chars().count() == 200 {
                hit.snippet.push_str("...");
            }
            results.push(hit);
        }
        Ok(results)
    }

    /// Count of files indexed without error.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn indexed_file_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM file_metadata WHERE error IS NULL")
    }

    /// Count of searchable documents.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn document_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM documents")
    }

    /// Count of files whose last processing attempt failed.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn error_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM file_metadata WHERE error IS NOT NULL")
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0)).map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Most recent `last_indexed` timestamp, `None` for an empty index.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if the query fails.
    pub fn last_indexed_at(&self) -> Result<Option<f64>> {
        self.conn
            .query_row("SELECT MAX(last_indexed) FROM file_metadata", [], |row| row.get(0))
            .map_err(db_err)
    }

    /// Logical database size in bytes (`page_count * page_size`).
    ///
    /// Stable under WAL, unlike the raw file length which lags behind
    /// un-checkpointed writes.
    ///
    /// # Errors
    /// Returns `IndexError::Database` if either PRAGMA fails.
    pub fn database_size_bytes(&self) -> Result<u64> {
        let page_count: i64 =
            self.conn.query_row("PRAGMA page_count", [], |row| row.get(0)).map_err(db_err)?;
        let page_size: i64 =
            self.conn.query_row("PRAGMA page_size", [], |row| row.get(0)).map_err(db_err)?;
        Ok(u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0))
    }

    fn remove_database_files(db_path: &Path) -> Result<()> {
        let wal = sibling(db_path, DB_WAL_SUFFIX);
        let shm = sibling(db_path, DB_SHM_SUFFIX);
        for path in [db_path, wal.as_path(), shm.as_path()] {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed database file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Map rusqlite failures, promoting the structural-corruption codes to the
/// dedicated variant so callers can trigger a rebuild.
fn db_err(e: rusqlite::Error) -> IndexError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if matches!(
            failure.code,
            rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
        ) {
            return IndexError::IndexCorrupted;
        }
    }
    IndexError::Database { source: e }
}

/// FTS5 grammar errors surface at step time as plain SQLITE_ERROR.
fn is_match_syntax_error(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(failure, _)
        if failure.code == rusqlite::ErrorCode::Unknown && failure.extended_code == 1)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(1)?;
    Ok(FileRecord {
        path: row.get(0)?,
        size: u64::try_from(size).unwrap_or(0),
        mtime: row.get(2)?,
        last_indexed: row.get(3)?,
        encoding: row.get(4)?,
        error: row.get(5)?,
    })
}

fn checked_i64_from_u64(value: u64, label: &'static str) -> Result<i64> {
    i64::try_from(value).map_err(|_| IndexError::Io {
        source: std::io::Error::other(format!("{label} out of range: {value}")),
    })
}

/// Three validation gates against a pre-existing file: plausible size,
/// header magic, and a probe query through a real connection.
fn file_is_valid_sqlite(db_path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(db_path) else { return false };
    if metadata.len() < MIN_DB_FILE_SIZE {
        tracing::warn!(
            path = %db_path.display(),
            size = metadata.len(),
            "database file too small to be valid"
        );
        return false;
    }

    let mut header = [0_u8; 16];
    let header_ok = std::fs::File::open(db_path)
        .and_then(|mut file| file.read_exact(&mut header))
        .is_ok()
        && header == SQLITE_HEADER;
    if !header_ok {
        tracing::warn!(path = %db_path.display(), "database file has an invalid header");
        return false;
    }

    let probe = rusqlite::Connection::open(db_path).and_then(|conn| {
        conn.query_row("SELECT name FROM sqlite_master WHERE type = 'table' LIMIT 1", [], |_| {
            Ok(())
        })
        .optional()
        .map(|_| ())
    });
    match probe {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %db_path.display(), error = %e, "database probe query failed");
            false
        }
    }
}

fn sibling(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Render an epoch-seconds timestamp as local ISO-8601 with microseconds,
/// the same shape stored in `last_modified` and reported in stats.
pub(crate) fn format_timestamp(epoch_seconds: f64) -> String {
    let secs = epoch_seconds.floor();
    #[allow(clippy::cast_possible_truncation)]
    let nanos = ((epoch_seconds - secs) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    #[allow(clippy::cast_possible_truncation)]
    let secs = secs as i64;
    DateTime::from_timestamp(secs, nanos).map_or_else(
        || epoch_seconds.to_string(),
        |utc| utc.with_timezone(&Local).format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    )
}

/// Current wall clock as fractional epoch seconds.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64())
}

/// Round to two decimals for reported figures.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
