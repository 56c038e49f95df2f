//! Change detection between a scan snapshot and stored file metadata.

use std::collections::{HashMap, HashSet};

use crate::scanner::ScanEntry;
use crate::storage::FileRecord;

/// Disposition of one scanned file relative to its stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Added,
    Modified,
}

/// Compare one scanned file against its stored record.
///
/// Size and mtime are compared exactly: the mtime travels as the f64 the
/// filesystem reported and round-trips bit-exact through a SQLite REAL
/// column, so equality detects every on-disk change without a tolerance
/// window. `force` reprocesses files that have a record; files without
/// one are additions either way.
#[must_use]
pub fn classify(prior: Option<&FileRecord>, entry: &ScanEntry, force: bool) -> Change {
    match prior {
        None => Change::Added,
        Some(record) => {
            #[allow(clippy::float_cmp)]
            let stat_changed = record.size != entry.size || record.mtime != entry.mtime;
            if force || stat_changed { Change::Modified } else { Change::Unchanged }
        }
    }
}

/// Paths that have a stored record but were absent from the latest scan,
/// in sorted order.
#[must_use]
pub fn removed_paths(known: &HashMap<String, FileRecord>, seen: &HashSet<String>) -> Vec<String> {
    let mut removed: Vec<String> =
        known.keys().filter(|path| !seen.contains(path.as_str())).cloned().collect();
    removed.sort_unstable();
    removed
}
