//! dirindex - Incremental full-text directory indexing and search on `SQLite` FTS5
//!
//! This library keeps a searchable full-text index of the text files under
//! one source directory. Scans are incremental (size/mtime change
//! detection), per-file failures are recorded instead of aborting a scan,
//! and a corrupted index rebuilds itself from scratch rather than wedging
//! the service.
//!
//! # Example
//!
//! ```rust
//! use dirindex::{IndexConfig, IndexService};
//! use std::time::{SystemTime, UNIX_EPOCH};
//!
//! let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
//! let root = std::env::temp_dir().join(format!("dirindex-doctest-{unique}"));
//! std::fs::create_dir_all(&root)?;
//! std::fs::write(root.join("notes.txt"), "the quick brown fox")?;
//!
//! let mut config = IndexConfig::new(&root);
//! config.index_output_directory = root.join("indexes");
//! let service = IndexService::open(config)?;
//!
//! let outcome = service.refresh_index(None, false)?;
//! assert!(outcome.success);
//!
//! let results = service.search("fox", None)?;
//! assert_eq!(results.len(), 1);
//!
//! let _ = std::fs::remove_dir_all(&root);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Database filename inside the index output directory.
pub const DB_NAME: &str = "search.db";

/// WAL mode shm file suffix.
pub const DB_SHM_SUFFIX: &str = "-shm";

/// WAL mode wal file suffix.
pub const DB_WAL_SUFFIX: &str = "-wal";

pub mod changes;
pub mod config;
pub mod error;
pub mod indexer;
pub mod paths;
pub mod scanner;
pub mod search;
pub mod service;
pub mod stats;
pub mod storage;
pub mod text;

pub use changes::Change;
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use indexer::{Indexer, RefreshOutcome};
pub use paths::PathValidator;
pub use scanner::{FileScanner, ScanEntry};
pub use search::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT, SearchEngine};
pub use service::IndexService;
pub use stats::{IndexStats, StatsReporter};
pub use storage::{FileRecord, PragmaConfig, SearchResult, Storage};
pub use text::{Classification, Decoded};
