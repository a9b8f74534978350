// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No state,
// no decisions about when to emit; the refresh engine decides that. This
// module only knows the byte-level encoding of the handful of commands a
// line editor needs: relative cursor motion, column placement, erasing to
// the end of the line, and a few queries.
//
// Line editing works relative to wherever the prompt started, so unlike a
// full-screen renderer nothing here uses absolute CUP coordinates except
// the clear-screen home.
//
// All functions return `io::Result` propagated from the underlying writer.
// In practice they never fail when writing to `OutputBuffer` (backed by a Vec).

use std::io::{self, Write};

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor up `n` rows (CUU). Nothing is written for `n == 0`,
/// since terminals treat a zero count as one.
#[inline]
pub fn cursor_up(w: &mut impl Write, n: usize) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    write!(w, "\x1b[{n}A")
}

/// Move the cursor down `n` rows (CUD).
#[inline]
pub fn cursor_down(w: &mut impl Write, n: usize) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    write!(w, "\x1b[{n}B")
}

/// Move the cursor right `n` columns (CUF).
#[inline]
pub fn cursor_forward(w: &mut impl Write, n: usize) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    write!(w, "\x1b[{n}C")
}

/// Move the cursor left `n` columns (CUB).
#[inline]
pub fn cursor_back(w: &mut impl Write, n: usize) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    write!(w, "\x1b[{n}D")
}

/// Place the cursor at 0-indexed column `col` of the current row.
///
/// Column 0 is a bare carriage return; anything else is `\r` followed by
/// a forward move, which every VT100 descendant understands.
#[inline]
pub fn cursor_column(w: &mut impl Write, col: usize) -> io::Result<()> {
    w.write_all(b"\r")?;
    cursor_forward(w, col)
}

/// Push the cursor as far right as the terminal allows. Used with a
/// cursor position report to measure the width.
#[inline]
pub fn cursor_far_right(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[999C")
}

/// Ask the terminal for the cursor position (DSR 6). The reply is
/// `ESC [ row ; col R`, see [`parse_cursor_report`].
#[inline]
pub fn request_cursor_position(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[6n")
}

// ─── Erase ───────────────────────────────────────────────────────────────────

/// Erase from the cursor to the end of the line (EL 0).
#[inline]
pub fn erase_line_right(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0K")
}

/// Home the cursor and clear the whole screen.
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[H\x1b[2J")
}

// ─── Style ───────────────────────────────────────────────────────────────────

/// Set the style for hint text: an optional ANSI color (30-37, 90-97)
/// and optional bold. Does nothing when neither is set.
pub fn hint_style(w: &mut impl Write, color: Option<u8>, bold: bool) -> io::Result<()> {
    match (color, bold) {
        (None, false) => Ok(()),
        (None, true) => w.write_all(b"\x1b[1m"),
        (Some(c), false) => write!(w, "\x1b[{c}m"),
        (Some(c), true) => write!(w, "\x1b[1;{c}m"),
    }
}

/// Reset all SGR attributes to terminal defaults (SGR 0).
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

/// Ring the terminal bell.
#[inline]
pub fn bell(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x07")
}

// ─── Replies ─────────────────────────────────────────────────────────────────

/// Parse a cursor position report `ESC [ row ; col R` into 1-based
/// `(row, col)`. Returns `None` for anything else.
#[must_use]
pub fn parse_cursor_report(reply: &[u8]) -> Option<(u16, u16)> {
    let body = reply.strip_prefix(b"\x1b[")?.strip_suffix(b"R")?;
    let text = std::str::from_utf8(body).ok()?;
    let (row, col) = text.split_once(';')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
