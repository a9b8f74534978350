//! History storage and navigation.
//!
//! Storage and navigation are separate concerns. A [`HistoryStore`] holds
//! submitted lines and is shared across sessions; the shell wraps one to
//! persist it. A [`HistoryNav`] lives for one edit session and tracks which
//! entry the buffer currently shows.
//!
//! Navigation index 0 is the live line (what the user was typing before
//! pressing Up); index `i >= 1` is the `i`-th most recent entry. Edits to
//! a browsed entry are written back when the user moves away from it, so
//! coming back shows the edited text. The live line is saved separately in
//! the navigator and never touches the store.

use std::collections::VecDeque;

use tracing::debug;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ordered list of previously submitted lines.
pub trait HistoryStore {
    /// Number of entries.
    fn count(&self) -> usize;

    /// Entry `reverse_index` steps back from the newest (0 = newest).
    fn get(&self, reverse_index: usize) -> Option<String>;

    /// Append `line`. Returns `false` if it was rejected (empty, or equal
    /// to the newest entry).
    fn add(&mut self, line: &str) -> bool;

    /// Overwrite the entry `reverse_index` steps back from the newest.
    fn set(&mut self, reverse_index: usize, line: &str);
}

/// In-memory store with a size limit. The oldest entry is dropped when
/// the limit is reached.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: VecDeque<String>,
    max_len: usize,
}

impl MemoryHistory {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(1024)),
            max_len,
        }
    }

    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// Change the limit, dropping the oldest entries if needed. A limit of
    /// zero is ignored.
    pub fn set_max_len(&mut self, max_len: usize) -> bool {
        if max_len == 0 {
            return false;
        }
        while self.entries.len() > max_len {
            self.entries.pop_front();
        }
        self.max_len = max_len;
        true
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl HistoryStore for MemoryHistory {
    fn count(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, reverse_index: usize) -> Option<String> {
        let idx = self.entries.len().checked_sub(reverse_index + 1)?;
        self.entries.get(idx).cloned()
    }

    fn add(&mut self, line: &str) -> bool {
        if self.max_len == 0 || line.is_empty() {
            return false;
        }
        if self.entries.back().is_some_and(|last| last == line) {
            return false;
        }
        if self.entries.len() == self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_owned());
        true
    }

    fn set(&mut self, reverse_index: usize, line: &str) {
        let Some(idx) = self.entries.len().checked_sub(reverse_index + 1) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(idx) {
            line.clone_into(entry);
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Direction of a history step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Towards older entries (Up, Ctrl-P).
    Older,
    /// Towards the live line (Down, Ctrl-N).
    Newer,
}

/// Where navigation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    /// Editing the line that has not been submitted yet.
    Live,
    /// Showing the `n`-th most recent entry (1-based).
    Browsing(usize),
}

/// Per-session position within history.
#[derive(Debug, Clone, Default)]
pub struct HistoryNav {
    index: usize,
    live: Option<String>,
}

impl HistoryNav {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            index: 0,
            live: None,
        }
    }

    /// 0 for the live line, `i` for the `i`-th most recent entry.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn state(&self) -> NavState {
        if self.index == 0 {
            NavState::Live
        } else {
            NavState::Browsing(self.index)
        }
    }

    /// Whether the buffer currently shows the live line.
    #[must_use]
    pub const fn at_live(&self) -> bool {
        self.index == 0
    }

    /// Move one step. `current` is what the buffer shows now; it is saved
    /// at the index being left. Returns the text to show, or `None` when
    /// the move is clamped at either end.
    pub fn step(&mut self, store: &mut dyn HistoryStore, step: Step, current: &str) -> Option<String> {
        let target = match step {
            Step::Older if self.index < store.count() => self.index + 1,
            Step::Newer if self.index > 0 => self.index - 1,
            _ => return None,
        };

        if self.index == 0 {
            self.live = Some(current.to_owned());
        } else {
            store.set(self.index - 1, current);
        }

        self.index = target;
        debug!(target: "history", index = target, "navigate");
        if target == 0 {
            Some(self.live.take().unwrap_or_default())
        } else {
            store.get(target - 1)
        }
    }

    /// Move straight to the `index`-th most recent entry, as accepting a
    /// search match does. `current` is saved at the position being left,
    /// exactly as [`step`](Self::step) would save it.
    pub fn jump(&mut self, store: &mut dyn HistoryStore, index: usize, current: &str) {
        if index == 0 || index > store.count() || index == self.index {
            return;
        }
        if self.index == 0 {
            self.live = Some(current.to_owned());
        } else {
            store.set(self.index - 1, current);
        }
        self.index = index;
        debug!(target: "history", index, "jump");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store(lines: &[&str]) -> MemoryHistory {
        let mut h = MemoryHistory::new(100);
        for line in lines {
            h.add(line);
        }
        h
    }

    #[test]
    fn get_counts_back_from_newest() {
        let h = store(&["a", "b", "c"]);
        assert_eq!(h.get(0).as_deref(), Some("c"));
        assert_eq!(h.get(2).as_deref(), Some("a"));
        assert_eq!(h.get(3), None);
    }

    #[test]
    fn adjacent_duplicates_rejected() {
        let mut h = store(&["ls"]);
        assert!(!h.add("ls"));
        assert!(h.add("pwd"));
        assert!(h.add("ls"));
        assert_eq!(h.count(), 3);
    }

    #[test]
    fn empty_line_rejected() {
        let mut h = MemoryHistory::new(10);
        assert!(!h.add(""));
        assert_eq!(h.count(), 0);
    }

    #[test]
    fn oldest_dropped_at_limit() {
        let mut h = MemoryHistory::new(2);
        h.add("1");
        h.add("2");
        h.add("3");
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[test]
    fn shrinking_limit_drops_oldest() {
        let mut h = store(&["1", "2", "3", "4"]);
        assert!(h.set_max_len(2));
        assert_eq!(h.iter().collect::<Vec<_>>(), vec!["3", "4"]);
        assert!(!h.set_max_len(0));
        assert_eq!(h.max_len(), 2);
    }

    #[test]
    fn browse_and_edit_scenario() {
        let mut h = store(&["echo 1", "echo 2"]);
        let mut nav = HistoryNav::new();

        assert_eq!(nav.step(&mut h, Step::Older, "ec").as_deref(), Some("echo 2"));
        assert_eq!(nav.step(&mut h, Step::Older, "echo 2").as_deref(), Some("echo 1"));
        // Clamped at the oldest entry.
        assert_eq!(nav.step(&mut h, Step::Older, "echo 1"), None);
        assert_eq!(nav.state(), NavState::Browsing(2));

        assert_eq!(nav.step(&mut h, Step::Newer, "echo 1").as_deref(), Some("echo 2"));
        assert_eq!(nav.step(&mut h, Step::Newer, "echo 2").as_deref(), Some("ec"));
        assert!(nav.at_live());
        assert_eq!(nav.step(&mut h, Step::Newer, "ec"), None);
    }

    #[test]
    fn edits_to_browsed_entry_persist() {
        let mut h = store(&["make", "cargo"]);
        let mut nav = HistoryNav::new();
        nav.step(&mut h, Step::Older, "");
        // User edits "cargo" into "cargo test", then moves on.
        nav.step(&mut h, Step::Older, "cargo test");
        assert_eq!(nav.step(&mut h, Step::Newer, "make").as_deref(), Some("cargo test"));
        assert_eq!(h.get(0).as_deref(), Some("cargo test"));
    }

    #[test]
    fn empty_store_does_not_move() {
        let mut h = MemoryHistory::new(10);
        let mut nav = HistoryNav::new();
        assert_eq!(nav.step(&mut h, Step::Older, "x"), None);
        assert!(nav.at_live());
    }

    #[test]
    fn jump_saves_the_line_being_left() {
        let mut h = store(&["a", "b", "c"]);
        let mut nav = HistoryNav::new();
        nav.jump(&mut h, 3, "draft");
        assert_eq!(nav.state(), NavState::Browsing(3));
        assert_eq!(nav.step(&mut h, Step::Newer, "a"), Some("b".to_owned()));
        assert_eq!(nav.step(&mut h, Step::Newer, "b"), Some("c".to_owned()));
        assert_eq!(nav.step(&mut h, Step::Newer, "c"), Some("draft".to_owned()));
        nav.jump(&mut h, 9, "x");
        assert!(nav.at_live());
    }
}
