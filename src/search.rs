use crate::error::{IndexError, Result};
use crate::storage::{SearchResult, Storage};

/// Result count when the caller does not pass a limit.
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Hard cap on results per query regardless of caller input.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// FTS5 query front end over one open store.
///
/// Owns query validation, escaping, and limit clamping; ranking and
/// snippet generation happen in the storage layer.
pub struct SearchEngine<'a> {
    storage: &'a Storage,
}

impl<'a> SearchEngine<'a> {
    pub const fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Ranked full-text search, best match first.
    ///
    /// Multiple bare words combine with FTS5's implicit AND. Queries
    /// carrying FTS5 control characters are quoted whole, so users can
    /// search for literal text like `don't` or `3.14` without learning
    /// the match grammar.
    ///
    /// # Errors
    /// Returns `IndexError::EmptyQuery` for blank input; storage errors
    /// pass through.
    pub fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(IndexError::EmptyQuery);
        }

        let limit = clamp_limit(limit);
        let escaped = Self::escape_match_query(query);
        let results = self.storage.query(&escaped, limit)?;
        tracing::info!(query, count = results.len(), "search completed");
        Ok(results)
    }

    /// Substring lookup on indexed paths.
    ///
    /// `pattern` is a raw SQL LIKE pattern (caller supplies wildcards),
    /// bound as a parameter. Results come back in path order with a
    /// leading-content snippet and a zero score.
    ///
    /// # Errors
    /// Storage errors pass through.
    pub fn search_by_path(&self, pattern: &str, limit: Option<u32>) -> Result<Vec<SearchResult>> {
        self.storage.query_by_path(pattern, clamp_limit(limit))
    }

    /// Escape a raw query for FTS5 MATCH.
    ///
    /// A query already wrapped in double quotes is a deliberate phrase
    /// search and passes through. A query containing FTS5 control
    /// characters or an operator keyword is quoted whole (inner quotes
    /// doubled), turning it into a literal phrase. Everything else passes
    /// through untouched.
    #[inline]
    fn escape_match_query(query: &str) -> String {
        if query.starts_with('"') && query.ends_with('"') {
            return query.to_string();
        }

        let has_control_char = query
            .chars()
            .any(|c| matches!(c, '"' | '\'' | '-' | '*' | ':' | '.' | '(' | ')'));
        let has_operator = ["AND", "OR", "NOT"].iter().any(|op| query.contains(op));

        if has_control_char || has_operator {
            let escaped = query.replace('"', "\"\"");
            return format!("\"{escaped}\"");
        }

        query.to_string()
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT)
}
