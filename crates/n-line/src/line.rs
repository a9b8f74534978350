//! Line buffer: the command line being edited.
//!
//! A `LineBuffer` is a byte vector with a cursor and a hard capacity. All
//! motion and deletion goes through the session's [`UnitAdapter`], so the
//! cursor always rests on a unit boundary and a multi-byte character is
//! never split: moving left over `漢` moves three bytes, deleting `é`
//! removes two.
//!
//! The buffer knows nothing about the screen. Every operation reports
//! whether it changed anything and leaves redrawing to the caller, which
//! keeps this module testable without a terminal.

use std::fmt;
use std::sync::Arc;

use n_term::unit::{Unit, UnitAdapter};

use crate::error::LineError;

/// What an insert did, as far as the refresh engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// Exactly one unit was appended at the end of the line.
    Append,
    /// Anything else: a mid-line insert, several units, or a merge with
    /// the preceding unit.
    Splice,
}

// ---------------------------------------------------------------------------
// Character classes
// ---------------------------------------------------------------------------

/// Whether the unit is whitespace (word-erase boundaries).
fn is_blank(unit: &[u8]) -> bool {
    unit.first().is_some_and(u8::is_ascii_whitespace)
}

/// Whether the unit belongs to a word for Alt-B / Alt-F motion. Non-ASCII
/// units count as word characters.
fn is_word(unit: &[u8]) -> bool {
    unit.first()
        .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80)
}

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// The in-progress line.
pub struct LineBuffer {
    content: Vec<u8>,
    cursor: usize,
    capacity: usize,
    adapter: Arc<dyn UnitAdapter>,
}

impl LineBuffer {
    /// An empty line holding at most `capacity` bytes.
    #[must_use]
    pub fn new(adapter: Arc<dyn UnitAdapter>, capacity: usize) -> Self {
        Self {
            content: Vec::with_capacity(capacity.min(4096)),
            cursor: 0,
            capacity,
            adapter,
        }
    }

    /// The line's bytes. The slice length is the line length; nothing is
    /// NUL-terminated.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Cursor byte offset, `0..=len`.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn UnitAdapter> {
        &self.adapter
    }

    /// The line as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    fn prev_unit(&self, pos: usize) -> Unit {
        self.adapter.prev_unit_len(&self.content, pos)
    }

    fn next_unit(&self, pos: usize) -> Unit {
        self.adapter.next_unit_len(&self.content, pos)
    }

    /// Move `pos` forward to the nearest unit boundary at or after it.
    fn snap_forward(&self, pos: usize) -> usize {
        let mut at = 0;
        while at < pos {
            let unit = self.next_unit(at);
            if unit.is_none() {
                return self.content.len();
            }
            at += unit.len;
        }
        at.min(self.content.len())
    }

    /// Put the cursor at `pos` after an edit. Removing or moving a unit can
    /// fuse its neighbours (regional indicators, Hangul jamo), leaving `pos`
    /// inside the new unit.
    fn settle(&mut self, pos: usize) {
        self.cursor = self.snap_forward(pos);
    }

    /// Whether `pos` is a unit boundary.
    #[must_use]
    pub fn is_boundary(&self, pos: usize) -> bool {
        pos <= self.content.len() && self.snap_forward(pos) == pos
    }

    // ── Insertion ───────────────────────────────────────────────────────

    /// Insert `bytes` at the cursor and advance past them.
    ///
    /// # Errors
    ///
    /// [`LineError::CapacityExceeded`] if the line would grow past its
    /// capacity. The buffer is left untouched.
    pub fn insert_at_cursor(&mut self, bytes: &[u8]) -> Result<Insert, LineError> {
        if bytes.is_empty() {
            return Ok(Insert::Splice);
        }
        if self.content.len() + bytes.len() > self.capacity {
            return Err(LineError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let at = self.cursor;
        let at_end = at == self.content.len();
        self.content.splice(at..at, bytes.iter().copied());
        self.cursor = at + bytes.len();

        // Combining marks and joiners can fuse with their neighbours.
        let snapped = self.snap_forward(self.cursor);
        let single = at_end && snapped == self.cursor && self.prev_unit(self.cursor).len == bytes.len();
        self.cursor = snapped;
        Ok(if single { Insert::Append } else { Insert::Splice })
    }

    /// Replace the whole line, cursor at the end. Content beyond the
    /// capacity is cut at the last unit that fits whole.
    pub fn replace(&mut self, bytes: &[u8]) {
        self.content.clear();
        if bytes.len() <= self.capacity {
            self.content.extend_from_slice(bytes);
        } else {
            let mut end = 0;
            while end < bytes.len() {
                let unit = self.adapter.next_unit_len(bytes, end);
                if unit.is_none() || end + unit.len > self.capacity {
                    break;
                }
                end += unit.len;
            }
            self.content.extend_from_slice(&bytes[..end]);
        }
        self.cursor = self.content.len();
    }

    /// Empty the line.
    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }

    /// Put the cursor at `pos`, clamped to the line and snapped to the
    /// next unit boundary.
    pub fn set_cursor(&mut self, pos: usize) {
        self.cursor = self.snap_forward(pos.min(self.content.len()));
    }

    // ── Deletion ────────────────────────────────────────────────────────

    /// Backspace: remove the unit before the cursor.
    pub fn delete_before_cursor(&mut self) -> bool {
        let unit = self.prev_unit(self.cursor);
        if unit.is_none() {
            return false;
        }
        let start = self.cursor - unit.len;
        self.content.drain(start..self.cursor);
        self.settle(start);
        true
    }

    /// Delete: remove the unit under the cursor.
    pub fn delete_at_cursor(&mut self) -> bool {
        let unit = self.next_unit(self.cursor);
        if unit.is_none() {
            return false;
        }
        self.content.drain(self.cursor..self.cursor + unit.len);
        self.settle(self.cursor);
        true
    }

    /// Word erase: skip whitespace backwards, then non-whitespace back to
    /// the previous whitespace or the start of the line.
    pub fn delete_word_before_cursor(&mut self) -> bool {
        let end = self.cursor;
        let mut start = end;
        while start > 0 {
            let unit = self.prev_unit(start);
            if unit.is_none() || !is_blank(&self.content[start - unit.len..start]) {
                break;
            }
            start -= unit.len;
        }
        while start > 0 {
            let unit = self.prev_unit(start);
            if unit.is_none() || is_blank(&self.content[start - unit.len..start]) {
                break;
            }
            start -= unit.len;
        }
        if start == end {
            return false;
        }
        self.content.drain(start..end);
        self.settle(start);
        true
    }

    /// Kill from the cursor to the end of the line.
    pub fn delete_to_end(&mut self) -> bool {
        if self.cursor == self.content.len() {
            return false;
        }
        self.content.truncate(self.cursor);
        true
    }

    /// Kill from the start of the line to the cursor.
    pub fn delete_to_start(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.content.drain(..self.cursor);
        self.settle(0);
        true
    }

    /// Swap the unit before the cursor with the one under it and step
    /// past both. At the end of the line the last two units are swapped.
    pub fn transpose(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let mid = if self.cursor == self.content.len() {
            self.cursor - self.prev_unit(self.cursor).len
        } else {
            self.cursor
        };
        let before = self.prev_unit(mid);
        let after = self.next_unit(mid);
        if before.is_none() || after.is_none() {
            return false;
        }
        let start = mid - before.len;
        let end = mid + after.len;
        self.content[start..end].rotate_left(before.len);
        self.settle(end);
        true
    }

    // ── Motion ──────────────────────────────────────────────────────────

    pub fn move_left(&mut self) -> bool {
        let unit = self.prev_unit(self.cursor);
        if unit.is_none() {
            return false;
        }
        self.cursor -= unit.len;
        true
    }

    pub fn move_right(&mut self) -> bool {
        let unit = self.next_unit(self.cursor);
        if unit.is_none() {
            return false;
        }
        self.cursor += unit.len;
        true
    }

    pub const fn move_home(&mut self) -> bool {
        let moved = self.cursor != 0;
        self.cursor = 0;
        moved
    }

    pub fn move_end(&mut self) -> bool {
        let moved = self.cursor != self.content.len();
        self.cursor = self.content.len();
        moved
    }

    /// Alt-B: back to the start of the current or previous word.
    pub fn move_word_left(&mut self) -> bool {
        let origin = self.cursor;
        let mut pos = origin;
        while pos > 0 {
            let unit = self.prev_unit(pos);
            if unit.is_none() || is_word(&self.content[pos - unit.len..pos]) {
                break;
            }
            pos -= unit.len;
        }
        while pos > 0 {
            let unit = self.prev_unit(pos);
            if unit.is_none() || !is_word(&self.content[pos - unit.len..pos]) {
                break;
            }
            pos -= unit.len;
        }
        self.cursor = pos;
        pos != origin
    }

    /// Alt-F: forward to the end of the current or next word.
    pub fn move_word_right(&mut self) -> bool {
        let origin = self.cursor;
        let len = self.content.len();
        let mut pos = origin;
        while pos < len {
            let unit = self.next_unit(pos);
            if unit.is_none() || is_word(&self.content[pos..pos + unit.len]) {
                break;
            }
            pos += unit.len;
        }
        while pos < len {
            let unit = self.next_unit(pos);
            if unit.is_none() || !is_word(&self.content[pos..pos + unit.len]) {
                break;
            }
            pos += unit.len;
        }
        self.cursor = pos;
        pos != origin
    }
}

impl fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineBuffer")
            .field("content", &String::from_utf8_lossy(&self.content))
            .field("cursor", &self.cursor)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use n_term::unit::{ByteUnits, Utf8Units};

    fn utf8(text: &str) -> LineBuffer {
        let mut line = LineBuffer::new(Arc::new(Utf8Units), 64);
        line.replace(text.as_bytes());
        line
    }

    fn bytes(text: &str) -> LineBuffer {
        let mut line = LineBuffer::new(Arc::new(ByteUnits), 64);
        line.replace(text.as_bytes());
        line
    }

    fn text(line: &LineBuffer) -> String {
        line.to_string_lossy()
    }

    // -- Scenario A and boundaries -------------------------------------------

    #[test]
    fn move_left_twice_then_delete() {
        let mut line = bytes("hello");
        assert_eq!(line.cursor(), 5);
        line.move_left();
        line.move_left();
        assert_eq!(line.cursor(), 3);
        assert!(line.delete_at_cursor());
        assert_eq!(text(&line), "helo");
        assert_eq!(line.cursor(), 3);
    }

    #[test]
    fn edges_are_noops() {
        let mut line = bytes("ab");
        assert!(!line.move_right());
        assert!(!line.delete_at_cursor());
        line.move_home();
        assert!(!line.move_left());
        assert!(!line.delete_before_cursor());
        assert_eq!(text(&line), "ab");
    }

    #[test]
    fn empty_line_noops() {
        let mut line = utf8("");
        assert!(!line.move_left());
        assert!(!line.move_right());
        assert!(!line.delete_before_cursor());
        assert!(!line.delete_at_cursor());
        assert!(!line.delete_word_before_cursor());
        assert!(!line.transpose());
        assert!(!line.delete_to_end());
        assert!(!line.delete_to_start());
    }

    // -- Insertion -------------------------------------------------------------

    #[test]
    fn append_reports_append() {
        let mut line = utf8("ab");
        assert_eq!(line.insert_at_cursor(b"c"), Ok(Insert::Append));
        assert_eq!(line.insert_at_cursor("漢".as_bytes()), Ok(Insert::Append));
        assert_eq!(text(&line), "abc漢");
    }

    #[test]
    fn mid_insert_reports_splice() {
        let mut line = utf8("ac");
        line.move_left();
        assert_eq!(line.insert_at_cursor(b"b"), Ok(Insert::Splice));
        assert_eq!(text(&line), "abc");
        assert_eq!(line.cursor(), 2);
    }

    #[test]
    fn multi_unit_insert_reports_splice() {
        let mut line = utf8("");
        assert_eq!(line.insert_at_cursor(b"xy"), Ok(Insert::Splice));
    }

    #[test]
    fn combining_mark_merges_with_previous() {
        let mut line = utf8("e");
        assert_eq!(line.insert_at_cursor("\u{301}".as_bytes()), Ok(Insert::Splice));
        assert_eq!(line.cursor(), 3);
        assert!(line.move_left());
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut line = LineBuffer::new(Arc::new(ByteUnits), 3);
        line.insert_at_cursor(b"abc").unwrap();
        assert_eq!(
            line.insert_at_cursor(b"d"),
            Err(LineError::CapacityExceeded { capacity: 3 })
        );
        assert_eq!(text(&line), "abc");
        assert_eq!(line.cursor(), 3);
    }

    #[test]
    fn replace_truncates_on_unit_boundary() {
        let mut line = LineBuffer::new(Arc::new(Utf8Units), 4);
        line.replace("ab漢".as_bytes());
        assert_eq!(text(&line), "ab");
        assert_eq!(line.cursor(), 2);
    }

    // -- Multi-byte motion -----------------------------------------------------

    #[test]
    fn motion_steps_over_whole_units() {
        let mut line = utf8("a漢é");
        assert_eq!(line.len(), 1 + 3 + 2);
        assert!(line.move_left());
        assert_eq!(line.cursor(), 4);
        assert!(line.move_left());
        assert_eq!(line.cursor(), 1);
        assert!(line.move_right());
        assert_eq!(line.cursor(), 4);
    }

    #[test]
    fn backspace_removes_whole_unit() {
        let mut line = utf8("a漢");
        assert!(line.delete_before_cursor());
        assert_eq!(text(&line), "a");
    }

    #[test]
    fn byte_adapter_splits_multibyte() {
        let mut line = bytes("漢");
        assert!(line.move_left());
        assert_eq!(line.cursor(), 2);
    }

    #[test]
    fn set_cursor_snaps_forward() {
        let mut line = utf8("漢x");
        line.set_cursor(1);
        assert_eq!(line.cursor(), 3);
        line.set_cursor(100);
        assert_eq!(line.cursor(), 4);
    }

    // -- Words -----------------------------------------------------------------

    #[test]
    fn word_erase_skips_trailing_space() {
        let mut line = utf8("git commit  ");
        assert!(line.delete_word_before_cursor());
        assert_eq!(text(&line), "git ");
        assert!(line.delete_word_before_cursor());
        assert_eq!(text(&line), "");
    }

    #[test]
    fn word_erase_keeps_text_after_cursor() {
        let mut line = utf8("echo hello world");
        line.set_cursor(10);
        assert!(line.delete_word_before_cursor());
        assert_eq!(text(&line), "echo  world");
        assert_eq!(line.cursor(), 5);
    }

    #[test]
    fn word_motion() {
        let mut line = utf8("ls -la /tmp/dir");
        assert!(line.move_word_left());
        assert_eq!(line.cursor(), 12);
        assert!(line.move_word_left());
        assert_eq!(line.cursor(), 8);
        assert!(line.move_word_left());
        assert_eq!(line.cursor(), 4);
        assert!(line.move_word_right());
        assert_eq!(line.cursor(), 6);
        line.move_end();
        assert!(!line.move_word_right());
    }

    #[test]
    fn word_motion_from_start_is_noop() {
        let mut line = utf8("abc");
        line.move_home();
        assert!(!line.move_word_left());
    }

    // -- Kill and transpose ----------------------------------------------------

    #[test]
    fn kill_to_end_and_start() {
        let mut line = utf8("hello world");
        line.set_cursor(5);
        assert!(line.delete_to_end());
        assert_eq!(text(&line), "hello");
        line.set_cursor(2);
        assert!(line.delete_to_start());
        assert_eq!(text(&line), "llo");
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn transpose_mid_line() {
        let mut line = utf8("abc");
        line.set_cursor(1);
        assert!(line.transpose());
        assert_eq!(text(&line), "bac");
        assert_eq!(line.cursor(), 2);
    }

    #[test]
    fn transpose_at_end_swaps_last_two() {
        let mut line = utf8("ab漢");
        assert!(line.transpose());
        assert_eq!(text(&line), "a漢b");
        assert_eq!(line.cursor(), line.len());
    }

    // -- Units fused by an edit ------------------------------------------------

    #[test]
    fn delete_fusing_regional_indicators() {
        let mut line = utf8("🇦x🇧🇨");
        line.set_cursor(4);
        assert!(line.delete_at_cursor());
        assert_eq!(text(&line), "🇦🇧🇨");
        assert_eq!(line.cursor(), 8);
        assert!(line.is_boundary(line.cursor()));

        let mut line = utf8("🇦x🇧🇨");
        line.set_cursor(5);
        assert!(line.delete_before_cursor());
        assert_eq!(line.cursor(), 8);
        assert!(line.is_boundary(line.cursor()));
    }

    #[test]
    fn delete_fusing_hangul_jamo() {
        // L + x + V: without the x the jamo form one syllable.
        let mut line = utf8("\u{1100}x\u{1161}");
        line.set_cursor(4);
        assert!(line.delete_before_cursor());
        assert_eq!(line.len(), 6);
        assert_eq!(line.cursor(), 6);
        assert!(line.move_left());
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn backspace_fusing_combining_mark() {
        let mut line = utf8("e\t\u{301}");
        line.set_cursor(2);
        assert!(line.delete_before_cursor());
        assert_eq!(text(&line), "e\u{301}");
        assert_eq!(line.cursor(), 3);
    }

    #[test]
    fn word_erase_fusing_space_and_mark() {
        let mut line = utf8("a b\t\u{301}");
        line.set_cursor(4);
        assert!(line.delete_word_before_cursor());
        assert_eq!(text(&line), "a \u{301}");
        assert_eq!(line.cursor(), 4);
        assert!(line.move_left());
        assert_eq!(line.cursor(), 1);
    }

    #[test]
    fn transpose_fusing_units_lands_on_boundary() {
        let mut line = utf8("🇦x🇧🇨");
        line.set_cursor(4);
        assert!(line.transpose());
        assert_eq!(text(&line), "x🇦🇧🇨");
        assert!(line.is_boundary(line.cursor()));
        assert_eq!(line.cursor(), 9);
    }

    #[test]
    fn transpose_single_unit_is_noop() {
        let mut line = utf8("a");
        assert!(!line.transpose());
        assert_eq!(text(&line), "a");
    }
}
