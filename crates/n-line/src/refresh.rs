//! Screen refresh engine.
//!
//! Turns (prompt, buffer, cursor, hint) into the bytes that make the
//! terminal show exactly that, touching as little as possible.
//!
//! # One layout, three outputs
//!
//! [`Refresher::layout`] computes everything a redraw would put on screen:
//! the visible slice of the buffer, the hint, how many rows the edit
//! occupies and where the cursor lands. It is the only place that reasons
//! about geometry. [`Refresher::refresh`] then compares the new layout with
//! the one it wrote last time:
//!
//! - identical: nothing is written;
//! - same text, different cursor: only cursor motion is written;
//! - the old text plus a suffix, cursor at the end both times, no hint,
//!   same row count: only the suffix is written (typing at the end of the
//!   line is the common case and must not flicker);
//! - anything else: a full redraw.
//!
//! The append case is derived from the two layouts, so it cannot drift out
//! of sync with the full redraw: it fires exactly when writing the suffix
//! leaves the screen the way a full redraw would.
//!
//! # Single-line mode
//!
//! The line scrolls horizontally. The first visible unit advances while the
//! cursor would sit at or past the last column, and the tail is cut so the
//! text never touches the last column. A prompt wider than that is cut. A
//! full redraw is: carriage return, prompt, visible text, hint, erase to end
//! of line, cursor to its column.
//!
//! # Multi-line mode
//!
//! The line wraps. The erase phase walks down to the last row written by
//! the previous refresh and clears rows upward until it reaches the first;
//! the write phase prints prompt and text and lets the terminal wrap, then
//! moves up to the cursor row and sets the column. When the cursor sits at
//! the end of text that ends exactly at the right margin, an explicit
//! `\n\r` is written so the terminal's deferred wrap does not leave the
//! cursor in limbo; that extra row is counted. Rows and the cursor cell come
//! from walking the glyphs the way the terminal places them, so a wide glyph
//! that would straddle the margin starts the next row.
//!
//! The erase phase of one refresh must exactly undo the write phase of the
//! previous one. The row bookkeeping in [`ScreenState`] is what makes that
//! possible, and it is only ever updated from the layout just written.

use std::io;
use std::sync::Arc;

use n_term::ansi;
use n_term::output::OutputBuffer;
use n_term::unit::{Unit, UnitAdapter};
use tracing::trace;
use unicode_width::UnicodeWidthChar;

use crate::completion::Hint;

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A prompt split into a header (every line but the last, printed once
/// per session) and the last line, which is redrawn on every refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    header: Option<String>,
    line: String,
    width: usize,
    pieces: Vec<Piece>,
}

/// One visible character of a prompt line, or an escape sequence or
/// marked region that takes no columns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Piece {
    text: String,
    width: usize,
}

impl Prompt {
    /// Parse prompt text.
    ///
    /// ANSI escape sequences count as zero columns, as does anything
    /// between `\x01` and `\x02` (readline's invisible-text markers). The
    /// markers themselves are not written.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let (header, last) = match text.rfind('\n') {
            Some(i) => (Some(text[..i].replace('\n', "\r\n")), &text[i + 1..]),
            None => (None, text),
        };
        let pieces = pieces(last);
        Self {
            header: header.map(|h| strip_markers(&h)),
            line: pieces.iter().map(|p| p.text.as_str()).collect(),
            width: pieces.iter().map(|p| p.width).sum(),
            pieces,
        }
    }

    /// Lines above the editable row, with `\r\n` separators.
    #[must_use]
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// The row the line is edited on, as written to the terminal.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Columns the last line occupies.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Widths of the visible characters, in order.
    fn glyphs(&self) -> impl Iterator<Item = usize> + '_ {
        self.pieces.iter().map(|p| p.width).filter(|&w| w > 0)
    }

    /// The line cut to at most `max` columns, and its width. Escapes after
    /// the cut are kept so a trailing reset still lands.
    fn fitted(&self, max: usize) -> (String, usize) {
        if self.width <= max {
            return (self.line.clone(), self.width);
        }
        let mut line = String::new();
        let mut width = 0;
        let mut cut = false;
        for piece in &self.pieces {
            if piece.width == 0 {
                line.push_str(&piece.text);
            } else if !cut && width + piece.width <= max {
                line.push_str(&piece.text);
                width += piece.width;
            } else {
                cut = true;
            }
        }
        (line, width)
    }
}

fn strip_markers(s: &str) -> String {
    s.chars().filter(|&c| c != '\x01' && c != '\x02').collect()
}

/// Split a prompt line into characters and zero-width escapes.
fn pieces(text: &str) -> Vec<Piece> {
    let hidden = |text: String| Piece { text, width: 0 };
    let mut pieces = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x01' => {
                let run: String = chars.by_ref().take_while(|&c| c != '\x02').collect();
                pieces.push(hidden(run));
            }
            '\x02' => {}
            '\x1b' => {
                let mut seq = String::from(c);
                if chars.peek() == Some(&'[') {
                    chars.next();
                    seq.push('[');
                    // Parameters and intermediates up to the final byte.
                    for c in chars.by_ref() {
                        seq.push(c);
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                } else if let Some(c) = chars.next() {
                    seq.push(c);
                }
                pieces.push(hidden(seq));
            }
            c => pieces.push(Piece {
                text: c.to_string(),
                width: if c.is_control() { 0 } else { c.width().unwrap_or(0) },
            }),
        }
    }
    pieces
}

/// Columns a prompt line occupies once escapes and invisible regions are
/// skipped.
#[must_use]
pub fn visible_width(text: &str) -> usize {
    pieces(text).iter().map(|p| p.width).sum()
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Everything one refresh puts on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Prompt line as written.
    prompt: String,
    /// Buffer bytes written after the prompt: the visible window, or one
    /// `*` per unit in mask mode.
    body: Vec<u8>,
    /// Hint bytes including style escapes, empty when no hint is shown.
    hint: Vec<u8>,
    /// First buffer byte shown (single-line scrolling).
    scroll: usize,
    /// Rows occupied, including the margin-wrap row.
    rows: usize,
    /// 1-based row of the cursor.
    cursor_row: usize,
    /// 0-based column of the cursor.
    cursor_col: usize,
    /// An explicit newline was written after text ending at the margin.
    margin_wrap: bool,
    /// The cursor follows the last byte of `body`.
    cursor_at_end: bool,
}

impl Layout {
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cursor_row(&self) -> usize {
        self.cursor_row
    }

    #[must_use]
    pub const fn cursor_col(&self) -> usize {
        self.cursor_col
    }

    #[must_use]
    pub const fn has_hint(&self) -> bool {
        !self.hint.is_empty()
    }

    #[must_use]
    pub const fn scroll(&self) -> usize {
        self.scroll
    }

    /// Same characters on screen; only the cursor may differ.
    fn same_text(&self, other: &Self) -> bool {
        self.prompt == other.prompt
            && self.body == other.body
            && self.hint == other.hint
            && self.scroll == other.scroll
            && self.rows == other.rows
            && self.margin_wrap == other.margin_wrap
    }

    /// Writing `next.body`'s extra bytes after `self` yields `next`.
    fn appends_to(&self, next: &Self) -> bool {
        self.prompt == next.prompt
            && self.scroll == next.scroll
            && self.hint.is_empty()
            && next.hint.is_empty()
            && self.cursor_at_end
            && next.cursor_at_end
            && !self.margin_wrap
            && !next.margin_wrap
            && self.rows == next.rows
            && self.cursor_row == next.cursor_row
            && next.body.len() > self.body.len()
            && next.body.starts_with(&self.body)
    }
}

/// Inputs to one refresh.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub prompt: &'a Prompt,
    pub buf: &'a [u8],
    pub cursor: usize,
    pub hint: Option<&'a Hint>,
}

/// What a refresh wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Nothing changed.
    Unchanged,
    /// Cursor motion only.
    Cursor,
    /// The new suffix only.
    Append,
    /// Erase and redraw.
    Full,
}

// ---------------------------------------------------------------------------
// Pen
// ---------------------------------------------------------------------------

/// Where the terminal draws each glyph of a wrapping line. Wrapping is
/// deferred at the right margin, and a wide glyph that does not fit on the
/// row moves whole to the next one, leaving its last cell blank.
#[derive(Debug, Clone, Copy)]
struct Pen {
    cols: usize,
    /// 1-based row.
    row: usize,
    /// 0-based column; `cols` while a wrap is pending.
    col: usize,
}

impl Pen {
    const fn new(cols: usize) -> Self {
        Self { cols, row: 1, col: 0 }
    }

    /// Row and column where a glyph `width` columns wide would start.
    /// Zero-width glyphs join the previous cell.
    const fn start_of(&self, width: usize) -> (usize, usize) {
        if width == 0 {
            return (self.row, self.col);
        }
        if self.col >= self.cols || (self.col > 0 && self.col + width > self.cols) {
            (self.row + 1, 0)
        } else {
            (self.row, self.col)
        }
    }

    const fn put(&mut self, width: usize) {
        if width == 0 {
            return;
        }
        let (row, col) = self.start_of(width);
        self.row = row;
        self.col = col + width;
    }
}

// ---------------------------------------------------------------------------
// ScreenState
// ---------------------------------------------------------------------------

/// Bookkeeping from the last write, consumed by the next erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenState {
    /// Rows the previous write occupied.
    pub old_rows: usize,
    /// 1-based row the previous write left the cursor on.
    pub old_cursor_row: usize,
    /// Column the previous write left the cursor at.
    pub old_cursor_column: usize,
    /// Terminal width.
    pub columns: usize,
}

impl ScreenState {
    const fn fresh(columns: usize) -> Self {
        Self {
            old_rows: 1,
            old_cursor_row: 1,
            old_cursor_column: 0,
            columns,
        }
    }
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

/// Owns the screen state of one edit session.
#[derive(Debug)]
pub struct Refresher {
    adapter: Arc<dyn UnitAdapter>,
    multi_line: bool,
    mask: bool,
    state: ScreenState,
    last: Option<Layout>,
}

impl Refresher {
    #[must_use]
    pub fn new(adapter: Arc<dyn UnitAdapter>, multi_line: bool, mask: bool, columns: usize) -> Self {
        Self {
            adapter,
            multi_line,
            mask,
            state: ScreenState::fresh(columns.max(1)),
            last: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ScreenState {
        self.state
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.state.columns
    }

    #[must_use]
    pub const fn is_multi_line(&self) -> bool {
        self.multi_line
    }

    /// Adopt a new terminal width. The next refresh is a full redraw.
    pub fn set_columns(&mut self, columns: usize) {
        let columns = columns.max(1);
        if columns != self.state.columns {
            self.state.columns = columns;
            self.last = None;
        }
    }

    /// Forget the last layout so the next refresh redraws in full. The
    /// row bookkeeping is kept, so the erase still covers the old text.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Start a session: print the prompt header, if any, and reset the
    /// bookkeeping to an empty row.
    ///
    /// # Errors
    ///
    /// Propagates writer errors (none for an `OutputBuffer`).
    pub fn begin(&mut self, out: &mut OutputBuffer, prompt: &Prompt) -> io::Result<()> {
        if let Some(header) = prompt.header() {
            out.push_bytes(header.as_bytes());
            out.push_bytes(b"\r\n");
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ScreenState::fresh(self.state.columns);
        self.last = None;
    }

    /// Width of `bytes` as drawn: one column per unit when masked.
    fn width(&self, bytes: &[u8]) -> usize {
        if self.mask {
            self.adapter.unit_count(bytes)
        } else {
            self.adapter.display_width(bytes)
        }
    }

    const fn unit_width(&self, unit: Unit) -> usize {
        if self.mask { 1 } else { unit.width }
    }

    fn body(&self, bytes: &[u8]) -> Vec<u8> {
        if self.mask {
            vec![b'*'; self.adapter.unit_count(bytes)]
        } else {
            bytes.to_vec()
        }
    }

    /// Compute what a refresh of `frame` puts on screen.
    #[must_use]
    pub fn layout(&self, frame: &Frame<'_>) -> Layout {
        if self.multi_line {
            self.layout_multi(frame)
        } else {
            self.layout_single(frame)
        }
    }

    fn layout_single(&self, frame: &Frame<'_>) -> Layout {
        let cols = self.state.columns;
        // The prompt alone must leave the last column for the cursor.
        let (prompt, plen) = frame.prompt.fitted(cols - 1);
        let buf = frame.buf;
        let cursor = frame.cursor.min(buf.len());

        // Scroll right until the cursor is left of the last column.
        let mut start = 0;
        let mut before = self.width(&buf[..cursor]);
        while start < cursor && plen + before >= cols {
            let unit = self.adapter.next_unit_len(buf, start);
            if unit.is_none() {
                break;
            }
            start += unit.len;
            before = before.saturating_sub(self.unit_width(unit));
        }

        // Cut the tail so the text stays left of the last column.
        let mut end = buf.len();
        let mut shown = before + self.width(&buf[cursor..]);
        while end > cursor && plen + shown >= cols {
            let unit = self.adapter.prev_unit_len(buf, end);
            if unit.is_none() {
                break;
            }
            end -= unit.len;
            shown = shown.saturating_sub(self.unit_width(unit));
        }

        let used = plen + shown;
        let hint = if end == buf.len() {
            self.hint_bytes(frame.hint, cols.saturating_sub(used + 1))
        } else {
            Vec::new()
        };

        Layout {
            prompt,
            body: self.body(&buf[start..end]),
            hint,
            scroll: start,
            rows: 1,
            cursor_row: 1,
            cursor_col: plen + before,
            margin_wrap: false,
            cursor_at_end: cursor == buf.len(),
        }
    }

    fn layout_multi(&self, frame: &Frame<'_>) -> Layout {
        let cols = self.state.columns;
        let buf = frame.buf;
        let cursor = frame.cursor.min(buf.len());

        let mut pen = Pen::new(cols);
        for width in frame.prompt.glyphs() {
            pen.put(width);
        }
        // The cell the unit under the cursor is drawn in.
        let mut at_cursor = None;
        let mut pos = 0;
        while pos < buf.len() {
            let unit = self.adapter.next_unit_len(buf, pos);
            if unit.is_none() {
                break;
            }
            let width = self.unit_width(unit);
            if at_cursor.is_none() && pos >= cursor {
                at_cursor = Some(pen.start_of(width));
            }
            pen.put(width);
            pos += unit.len;
        }

        let mut rows = pen.row;
        let hint = if pen.col >= cols {
            // Text ends on the margin; there is no room on this row.
            Vec::new()
        } else {
            self.hint_bytes(frame.hint, cols.saturating_sub(pen.col + 1))
        };

        let margin_wrap = at_cursor.is_none() && pen.col >= cols;
        let (cursor_row, cursor_col) = match at_cursor {
            Some(cell) => cell,
            None if margin_wrap => {
                rows += 1;
                (rows, 0)
            }
            None => (pen.row, pen.col),
        };

        Layout {
            prompt: frame.prompt.line().to_owned(),
            body: self.body(buf),
            hint,
            scroll: 0,
            rows,
            cursor_row,
            cursor_col: cursor_col.min(cols - 1),
            margin_wrap,
            cursor_at_end: cursor == buf.len(),
        }
    }

    /// Styled hint text cut to `room` columns. Masked lines get no hints.
    fn hint_bytes(&self, hint: Option<&Hint>, room: usize) -> Vec<u8> {
        let Some(hint) = hint else {
            return Vec::new();
        };
        if self.mask || room == 0 {
            return Vec::new();
        }
        let mut width = 0;
        let mut text = String::new();
        for c in hint.text.chars() {
            let w = if c.is_control() { 0 } else { c.width().unwrap_or(0) };
            if width + w > room {
                break;
            }
            width += w;
            if !c.is_control() {
                text.push(c);
            }
        }
        if text.is_empty() {
            return Vec::new();
        }
        let styled = hint.color.is_some() || hint.bold;
        let mut out = Vec::with_capacity(text.len() + 12);
        // Writing into a Vec cannot fail.
        let _ = ansi::hint_style(&mut out, hint.color, hint.bold);
        out.extend_from_slice(text.as_bytes());
        if styled {
            let _ = ansi::reset(&mut out);
        }
        out
    }

    /// Bring the screen in line with `frame`, writing as little as possible.
    ///
    /// # Errors
    ///
    /// Propagates writer errors (none for an `OutputBuffer`).
    pub fn refresh(&mut self, out: &mut OutputBuffer, frame: &Frame<'_>) -> io::Result<Refresh> {
        let next = self.layout(frame);
        let kind = match &self.last {
            Some(prev) if *prev == next => Refresh::Unchanged,
            Some(prev) if prev.same_text(&next) => Refresh::Cursor,
            Some(prev) if prev.appends_to(&next) => Refresh::Append,
            _ => Refresh::Full,
        };

        match kind {
            Refresh::Unchanged => {}
            Refresh::Cursor => self.write_cursor(out, &next)?,
            Refresh::Append => {
                let old_len = self.last.as_ref().map_or(0, |l| l.body.len());
                out.push_bytes(&next.body[old_len..]);
            }
            Refresh::Full => {
                self.write_erase(out)?;
                self.write_full(out, &next)?;
            }
        }

        trace!(
            target: "refresh",
            ?kind,
            rows = next.rows,
            cursor_row = next.cursor_row,
            cursor_col = next.cursor_col,
            "refresh"
        );
        self.state.old_rows = next.rows;
        self.state.old_cursor_row = next.cursor_row;
        self.state.old_cursor_column = next.cursor_col;
        self.last = Some(next);
        Ok(kind)
    }

    /// Undo the previous write: leave the cursor at column 0 of the first
    /// row with every row of the old edit cleared.
    fn write_erase(&self, out: &mut OutputBuffer) -> io::Result<()> {
        if self.multi_line {
            let ScreenState {
                old_rows,
                old_cursor_row,
                ..
            } = self.state;
            ansi::cursor_down(out, old_rows.saturating_sub(old_cursor_row))?;
            for _ in 1..old_rows {
                out.push_bytes(b"\r");
                ansi::erase_line_right(out)?;
                ansi::cursor_up(out, 1)?;
            }
        }
        out.push_bytes(b"\r");
        ansi::erase_line_right(out)
    }

    fn write_full(&self, out: &mut OutputBuffer, layout: &Layout) -> io::Result<()> {
        out.push_bytes(layout.prompt.as_bytes());
        out.push_bytes(&layout.body);
        out.push_bytes(&layout.hint);
        if self.multi_line {
            if layout.margin_wrap {
                out.push_bytes(b"\n\r");
            }
            ansi::cursor_up(out, layout.rows - layout.cursor_row)?;
        } else {
            ansi::erase_line_right(out)?;
        }
        ansi::cursor_column(out, layout.cursor_col)
    }

    fn write_cursor(&self, out: &mut OutputBuffer, layout: &Layout) -> io::Result<()> {
        let from = self.state.old_cursor_row;
        let to = layout.cursor_row;
        if to < from {
            ansi::cursor_up(out, from - to)?;
        } else {
            ansi::cursor_down(out, to - from)?;
        }
        ansi::cursor_column(out, layout.cursor_col)
    }

    /// Clear the edit from the screen and reset to an empty row.
    ///
    /// # Errors
    ///
    /// Propagates writer errors (none for an `OutputBuffer`).
    pub fn erase(&mut self, out: &mut OutputBuffer) -> io::Result<()> {
        self.write_erase(out)?;
        self.reset();
        Ok(())
    }

    /// Leave the edit: move below its last row and start a fresh line.
    ///
    /// # Errors
    ///
    /// Propagates writer errors (none for an `OutputBuffer`).
    pub fn finish(&mut self, out: &mut OutputBuffer) -> io::Result<()> {
        if self.multi_line {
            let down = self.state.old_rows.saturating_sub(self.state.old_cursor_row);
            ansi::cursor_down(out, down)?;
        }
        out.push_bytes(b"\r\n");
        self.reset();
        Ok(())
    }

    /// Ctrl-L: clear the screen, reprint the header, redraw the line.
    ///
    /// # Errors
    ///
    /// Propagates writer errors (none for an `OutputBuffer`).
    pub fn clear_screen(&mut self, out: &mut OutputBuffer, frame: &Frame<'_>) -> io::Result<()> {
        ansi::clear_screen(out)?;
        self.begin(out, frame.prompt)?;
        self.refresh(out, frame).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
