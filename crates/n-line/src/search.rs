//! Incremental reverse history search (Ctrl-R).
//!
//! The controller only owns the query and the current match. The editor
//! decides which keys reach it and draws whatever [`SearchState::shown`]
//! returns behind the synthetic [`SearchState::prompt`].
//!
//! Matching is a literal, case-sensitive substring test. Scans run from
//! newer to older entries; a new character rescans from the current match
//! (which may still match), the repeat key from the entry before it.

use tracing::debug;

use crate::history::HistoryStore;

/// A history entry containing the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Reverse index in the store (0 = newest).
    pub index: usize,
    /// The entry.
    pub line: String,
    /// Byte offset of the query within `line`.
    pub offset: usize,
}

/// State of one search.
#[derive(Debug, Clone)]
pub struct SearchState {
    query: String,
    found: Option<Match>,
    failed: bool,
    saved_line: String,
    saved_cursor: usize,
}

impl SearchState {
    /// Start a search, remembering the line to restore on cancel.
    #[must_use]
    pub fn begin(saved_line: String, saved_cursor: usize) -> Self {
        debug!(target: "history", "search start");
        Self {
            query: String::new(),
            found: None,
            failed: false,
            saved_line,
            saved_cursor,
        }
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Match> {
        self.found.as_ref()
    }

    /// The last scan found nothing.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.failed
    }

    /// The pre-search line and cursor.
    #[must_use]
    pub fn saved(&self) -> (&str, usize) {
        (&self.saved_line, self.saved_cursor)
    }

    /// The prompt drawn in place of the user's.
    #[must_use]
    pub fn prompt(&self) -> String {
        if self.failed {
            format!("(failed reverse-i-search)'{}': ", self.query)
        } else {
            format!("(reverse-i-search)'{}': ", self.query)
        }
    }

    /// Line and cursor to show: the match, or the saved line before any
    /// match was found.
    #[must_use]
    pub fn shown(&self) -> (&str, usize) {
        match &self.found {
            Some(m) => (&m.line, m.offset),
            None => (&self.saved_line, self.saved_cursor),
        }
    }

    /// Append `text` to the query and rescan from the current match.
    /// Returns whether a match was found.
    pub fn push(&mut self, text: &str, store: &dyn HistoryStore) -> bool {
        self.query.push_str(text);
        let from = self.found.as_ref().map_or(0, |m| m.index);
        self.scan(store, from)
    }

    /// Drop the last character of the query and rescan from the newest
    /// entry.
    pub fn pop(&mut self, store: &dyn HistoryStore) -> bool {
        if self.query.pop().is_none() {
            return false;
        }
        if self.query.is_empty() {
            self.found = None;
            self.failed = false;
            return true;
        }
        self.scan(store, 0)
    }

    /// Find the next older match.
    pub fn repeat(&mut self, store: &dyn HistoryStore) -> bool {
        if self.query.is_empty() {
            return false;
        }
        let from = self.found.as_ref().map_or(0, |m| m.index + 1);
        self.scan(store, from)
    }

    /// Scan from reverse index `from` towards older entries. On a miss the
    /// previous match stays in place and `failed` is set.
    fn scan(&mut self, store: &dyn HistoryStore, from: usize) -> bool {
        if self.query.is_empty() {
            self.failed = false;
            return true;
        }
        for index in from..store.count() {
            let Some(line) = store.get(index) else {
                continue;
            };
            if let Some(offset) = line.find(&self.query) {
                debug!(target: "history", index, "search hit");
                self.found = Some(Match {
                    index,
                    line,
                    offset,
                });
                self.failed = false;
                return true;
            }
        }
        self.failed = true;
        false
    }
}
