use thiserror::Error;

/// Centralized error types for the indexing core.
///
/// All errors are explicit enum variants (no Box<dyn Error>) so callers
/// can branch on the condition: per-file errors feed the audit trail,
/// validation errors are rejected outright, and the corruption variant
/// drives the rebuild path.
#[derive(Error, Debug)]
pub enum IndexError {
    /// `SQLite` database operation failed
    #[error("database error: {source}")]
    Database {
        #[from]
        source: rusqlite::Error,
    },

    /// File system I/O operation failed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Path escapes the configured source root
    #[error("path outside source directory: {path}")]
    PathOutsideRoot { path: String },

    /// Path points into the index output directory
    #[error("path inside index directory: {path}")]
    PathInIndexDir { path: String },

    // Display text for the next three is stored verbatim in
    // FileRecord.error entries and refresh outcomes.
    /// Refresh target does not exist on disk
    #[error("File not found: {path}")]
    FileMissing { path: String },

    /// File exceeds maximum allowed size
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    /// File classified as binary, content not indexable
    #[error("Not a text file: {reason}")]
    NotText { reason: String },

    /// Empty or whitespace-only search query
    #[error("empty query")]
    EmptyQuery,

    /// An indexing pass already holds the exclusive guard
    #[error("scan already in progress")]
    ScanInProgress,

    /// Storage integrity violation, store must be rebuilt
    #[error("index corrupted")]
    IndexCorrupted,

    /// Invalid configuration value
    #[error("invalid {field}: {value} ({reason})")]
    ConfigInvalid { field: String, value: String, reason: String },
}

impl IndexError {
    /// True for conditions that reject caller input before any I/O.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::PathOutsideRoot { .. }
                | Self::PathInIndexDir { .. }
                | Self::EmptyQuery
                | Self::ConfigInvalid { .. }
        )
    }
}

/// Result type alias for indexing operations.
pub type Result<T> = std::result::Result<T, IndexError>;
