// SPDX-License-Identifier: MIT
//
// Codepoint/column adapter.
//
// Everything above this module thinks in *units*: the smallest thing the
// cursor may rest beside. A unit has a byte length and an on-screen column
// width, and the two are unrelated in general: `é` is two bytes and one
// column, `漢` is three bytes and two columns, a combining accent is two
// bytes and zero columns.
//
// The line buffer, refresh engine and key decoder never index raw bytes as
// "one character". They ask an adapter. Two adapters ship:
//
//   ByteUnits: every byte is a unit one column wide. Correct for ASCII and
//             for terminals running a single-byte locale.
//   Utf8Units: grapheme clusters (unicode-segmentation) measured with
//             unicode-width. Invalid UTF-8 degrades to one byte per unit
//             so a stray byte can still be deleted.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use unicode_segmentation::{GraphemeCursor, GraphemeIncomplete, UnicodeSegmentation};
use unicode_width::UnicodeWidthStr;

/// Longest byte sequence a single decoded input unit may occupy.
pub const MAX_UNIT_BYTES: usize = 4;

/// Bytes segmented per step when looking for a grapheme boundary. Lookups
/// cost the length of the cluster, not the length of the line.
const WINDOW: usize = 64;

// ─── Unit ───────────────────────────────────────────────────────────────────

/// Byte length and display width of one unit.
///
/// A zero `len` means there is no unit in the requested direction (the
/// position was already at a buffer edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Unit {
    /// Bytes occupied in the buffer.
    pub len: usize,
    /// Terminal cells occupied on screen.
    pub width: usize,
}

impl Unit {
    const NONE: Self = Self { len: 0, width: 0 };
    const BYTE: Self = Self { len: 1, width: 1 };

    /// Whether this is the "no unit here" marker.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.len == 0
    }
}

/// Result of decoding one input unit from raw terminal bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitDecode {
    /// A full unit: `len` bytes producing `codepoint`.
    Complete { len: usize, codepoint: u32 },
    /// The bytes so far are a valid prefix; more are needed.
    Incomplete,
    /// The bytes can never form a unit.
    Invalid,
}

// ─── Adapter trait ──────────────────────────────────────────────────────────

/// Pluggable unit boundaries and widths.
///
/// Implementations must be consistent: for any `pos` on a unit boundary,
/// `next_unit_len(buf, pos).len` and `prev_unit_len(buf, pos + len).len`
/// describe the same unit.
pub trait UnitAdapter: fmt::Debug + Send + Sync {
    /// The unit ending at `pos`.
    fn prev_unit_len(&self, buf: &[u8], pos: usize) -> Unit;

    /// The unit starting at `pos`.
    fn next_unit_len(&self, buf: &[u8], pos: usize) -> Unit;

    /// Decode one input unit from the start of `bytes`.
    fn decode_unit(&self, bytes: &[u8]) -> UnitDecode;

    /// Total display width of `buf`.
    fn display_width(&self, buf: &[u8]) -> usize {
        let mut pos = 0;
        let mut width = 0;
        while pos < buf.len() {
            let unit = self.next_unit_len(buf, pos);
            if unit.is_none() {
                break;
            }
            pos += unit.len;
            width += unit.width;
        }
        width
    }

    /// Number of units in `buf`.
    fn unit_count(&self, buf: &[u8]) -> usize {
        let mut pos = 0;
        let mut count = 0;
        while pos < buf.len() {
            let unit = self.next_unit_len(buf, pos);
            if unit.is_none() {
                break;
            }
            pos += unit.len;
            count += 1;
        }
        count
    }

    /// Read exactly one unit from `reader`, one byte at a time.
    ///
    /// Returns `(byte_len, codepoint)`, or `None` at end of input. Bytes
    /// that cannot form a unit are reported as U+FFFD with the number of
    /// bytes consumed, so the caller always makes progress.
    ///
    /// # Errors
    ///
    /// Propagates read errors other than `Interrupted`.
    fn read_unit(
        &self,
        reader: &mut dyn Read,
        scratch: &mut [u8; MAX_UNIT_BYTES],
    ) -> io::Result<Option<(usize, u32)>> {
        let mut len = 0;
        loop {
            let mut byte = [0u8; 1];
            match reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            scratch[len] = byte[0];
            len += 1;
            match self.decode_unit(&scratch[..len]) {
                UnitDecode::Complete { len, codepoint } => return Ok(Some((len, codepoint))),
                UnitDecode::Incomplete if len < MAX_UNIT_BYTES => {}
                UnitDecode::Incomplete | UnitDecode::Invalid => {
                    return Ok(Some((len, u32::from(char::REPLACEMENT_CHARACTER))));
                }
            }
        }
    }
}

/// Build the adapter selected by configuration.
#[must_use]
pub fn adapter(utf8: bool) -> Arc<dyn UnitAdapter> {
    if utf8 {
        Arc::new(Utf8Units)
    } else {
        Arc::new(ByteUnits)
    }
}

// ─── ByteUnits ──────────────────────────────────────────────────────────────

/// One byte, one unit, one column.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteUnits;

impl UnitAdapter for ByteUnits {
    fn prev_unit_len(&self, _buf: &[u8], pos: usize) -> Unit {
        if pos == 0 { Unit::NONE } else { Unit::BYTE }
    }

    fn next_unit_len(&self, buf: &[u8], pos: usize) -> Unit {
        if pos >= buf.len() { Unit::NONE } else { Unit::BYTE }
    }

    fn decode_unit(&self, bytes: &[u8]) -> UnitDecode {
        bytes.first().map_or(UnitDecode::Incomplete, |&b| UnitDecode::Complete {
            len: 1,
            codepoint: u32::from(b),
        })
    }

    fn display_width(&self, buf: &[u8]) -> usize {
        buf.len()
    }

    fn unit_count(&self, buf: &[u8]) -> usize {
        buf.len()
    }
}

// ─── Utf8Units ──────────────────────────────────────────────────────────────

/// Grapheme clusters with East Asian width accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Units;

impl UnitAdapter for Utf8Units {
    fn prev_unit_len(&self, buf: &[u8], pos: usize) -> Unit {
        let pos = pos.min(buf.len());
        if pos == 0 {
            return Unit::NONE;
        }
        if let Some(start) = grapheme_start_before(buf, pos) {
            if let Ok(s) = std::str::from_utf8(&buf[start..pos]) {
                return grapheme_unit(s);
            }
        }
        // The bytes near `pos` are not UTF-8. Only look at the final
        // scalar: walk back over continuation bytes to a lead byte.
        let floor = pos.saturating_sub(MAX_UNIT_BYTES);
        let mut start = pos - 1;
        while start > floor && is_continuation(buf[start]) {
            start -= 1;
        }
        std::str::from_utf8(&buf[start..pos]).map_or(Unit::BYTE, |s| Unit {
            len: pos - start,
            width: UnicodeWidthStr::width(s),
        })
    }

    fn next_unit_len(&self, buf: &[u8], pos: usize) -> Unit {
        if pos >= buf.len() {
            return Unit::NONE;
        }
        let mut end = (pos + WINDOW).min(buf.len());
        loop {
            let (valid, last) = match std::str::from_utf8(&buf[pos..end]) {
                Ok(s) => (s, end == buf.len()),
                // `error_len` is `None` when the window merely cut a scalar.
                Err(e) => (
                    valid_prefix(&buf[pos..end]),
                    e.error_len().is_some() || end == buf.len(),
                ),
            };
            let Some(g) = valid.graphemes(true).next() else {
                return Unit::BYTE;
            };
            // A cluster that fills the window may continue past it.
            if g.len() < valid.len() || last {
                return grapheme_unit(g);
            }
            end = (end + (end - pos)).min(buf.len());
        }
    }

    fn decode_unit(&self, bytes: &[u8]) -> UnitDecode {
        let Some(&lead) = bytes.first() else {
            return UnitDecode::Incomplete;
        };
        let expected = utf8_char_len(lead);
        if expected == 0 {
            return UnitDecode::Invalid;
        }
        let available = bytes.len().min(expected);
        if bytes[1..available].iter().any(|&b| !is_continuation(b)) {
            return UnitDecode::Invalid;
        }
        if bytes.len() < expected {
            return UnitDecode::Incomplete;
        }
        std::str::from_utf8(&bytes[..expected])
            .ok()
            .and_then(|s| s.chars().next())
            .map_or(UnitDecode::Invalid, |ch| UnitDecode::Complete {
                len: expected,
                codepoint: u32::from(ch),
            })
    }
}

fn grapheme_unit(g: &str) -> Unit {
    Unit {
        len: g.len(),
        width: UnicodeWidthStr::width(g),
    }
}

/// Start of the chunk ending at `end`: `WINDOW` bytes back, moved forward
/// onto a scalar boundary.
fn chunk_start(buf: &[u8], end: usize) -> usize {
    let mut start = end.saturating_sub(WINDOW);
    while start < end && is_continuation(buf[start]) {
        start += 1;
    }
    start
}

/// Where the grapheme ending at `pos` starts. Segments backwards one
/// window at a time, handing the cursor more context only when it asks
/// (regional indicator pairs, emoji ZWJ sequences). `None` when the bytes
/// it needs are not UTF-8.
fn grapheme_start_before(buf: &[u8], pos: usize) -> Option<usize> {
    let mut cursor = GraphemeCursor::new(pos, buf.len(), true);
    let mut end = pos;
    let mut start = chunk_start(buf, end);
    loop {
        let chunk = std::str::from_utf8(&buf[start..end]).ok()?;
        match cursor.prev_boundary(chunk, start) {
            Ok(found) => return Some(found.unwrap_or(0)),
            Err(GraphemeIncomplete::PrevChunk) => {
                end = start;
                start = chunk_start(buf, end);
                if start == end {
                    return None;
                }
            }
            Err(GraphemeIncomplete::PreContext(at)) => {
                let from = chunk_start(buf, at);
                let context = std::str::from_utf8(&buf[from..at]).ok()?;
                if context.is_empty() {
                    return None;
                }
                cursor.provide_context(context, from);
            }
            Err(_) => return None,
        }
    }
}

/// The longest valid UTF-8 prefix of `bytes`.
fn valid_prefix(bytes: &[u8]) -> &str {
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

#[inline]
const fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Expected byte length of a UTF-8 character from its lead byte.
/// Returns 0 for invalid lead bytes (continuation bytes, 0xF8..=0xFF).
const fn utf8_char_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 0,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── ByteUnits ───────────────────────────────────────────────────────

    #[test]
    fn byte_units_edges() {
        let a = ByteUnits;
        assert!(a.prev_unit_len(b"abc", 0).is_none());
        assert!(a.next_unit_len(b"abc", 3).is_none());
        assert_eq!(a.next_unit_len(b"abc", 1), Unit { len: 1, width: 1 });
    }

    #[test]
    fn byte_units_treat_utf8_as_bytes() {
        let a = ByteUnits;
        let s = "é".as_bytes();
        assert_eq!(a.display_width(s), 2);
        assert_eq!(a.unit_count(s), 2);
    }

    #[test]
    fn byte_units_decode_single_byte() {
        assert_eq!(
            ByteUnits.decode_unit(&[0xC3]),
            UnitDecode::Complete { len: 1, codepoint: 0xC3 }
        );
    }

    // ── Utf8Units ───────────────────────────────────────────────────────

    #[test]
    fn utf8_two_byte_char() {
        let a = Utf8Units;
        let s = "aé".as_bytes();
        assert_eq!(a.next_unit_len(s, 1), Unit { len: 2, width: 1 });
        assert_eq!(a.prev_unit_len(s, 3), Unit { len: 2, width: 1 });
    }

    #[test]
    fn utf8_wide_char() {
        let a = Utf8Units;
        let s = "漢".as_bytes();
        assert_eq!(a.next_unit_len(s, 0), Unit { len: 3, width: 2 });
        assert_eq!(a.display_width(s), 2);
    }

    #[test]
    fn utf8_combining_mark_joins_base() {
        let a = Utf8Units;
        let s = "e\u{301}x".as_bytes();
        assert_eq!(a.next_unit_len(s, 0), Unit { len: 3, width: 1 });
        assert_eq!(a.prev_unit_len(s, 3), Unit { len: 3, width: 1 });
        assert_eq!(a.unit_count(s), 2);
    }

    #[test]
    fn utf8_invalid_byte_is_one_unit() {
        let a = Utf8Units;
        let s = [b'a', 0xFF, b'b'];
        assert_eq!(a.next_unit_len(&s, 1), Unit { len: 1, width: 1 });
        assert_eq!(a.prev_unit_len(&s, 2), Unit { len: 1, width: 1 });
        assert_eq!(a.prev_unit_len(&s, 3), Unit { len: 1, width: 1 });
    }

    #[test]
    fn regional_indicators_pair_from_the_start_of_the_run() {
        let a = Utf8Units;
        let s = "🇦🇧🇨".as_bytes();
        assert_eq!(a.prev_unit_len(s, 12).len, 4);
        assert_eq!(a.prev_unit_len(s, 8).len, 8);
        assert_eq!(a.next_unit_len(s, 0).len, 8);
        assert_eq!(a.unit_count(s), 2);
    }

    #[test]
    fn long_lines_agree_both_ways() {
        let a = Utf8Units;
        let text = format!("{}🇦🇧🇨{}e\u{301}👨\u{200D}👩漢", "x".repeat(200), "🇩".repeat(41));
        let s = text.as_bytes();
        let mut forward = Vec::new();
        let mut pos = 0;
        while pos < s.len() {
            let unit = a.next_unit_len(s, pos);
            forward.push(unit);
            pos += unit.len;
        }
        let mut backward = Vec::new();
        while pos > 0 {
            let unit = a.prev_unit_len(s, pos);
            backward.push(unit);
            pos -= unit.len;
        }
        backward.reverse();
        assert_eq!(forward, backward);
        let expected: Vec<usize> = text.graphemes(true).map(str::len).collect();
        assert_eq!(forward.iter().map(|u| u.len).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn long_cluster_spans_windows() {
        let a = Utf8Units;
        let text = format!("a{}b", "\u{301}".repeat(100));
        let s = text.as_bytes();
        assert_eq!(a.next_unit_len(s, 0).len, 201);
        assert_eq!(a.prev_unit_len(s, 201).len, 201);
    }

    #[test]
    fn utf8_decode_complete() {
        assert_eq!(
            Utf8Units.decode_unit("€".as_bytes()),
            UnitDecode::Complete { len: 3, codepoint: 0x20AC }
        );
    }

    #[test]
    fn utf8_decode_incomplete() {
        assert_eq!(Utf8Units.decode_unit(&[0xE2, 0x82]), UnitDecode::Incomplete);
    }

    #[test]
    fn utf8_decode_bad_continuation() {
        assert_eq!(Utf8Units.decode_unit(&[0xE2, b'a']), UnitDecode::Invalid);
    }

    #[test]
    fn utf8_decode_stray_continuation() {
        assert_eq!(Utf8Units.decode_unit(&[0x82]), UnitDecode::Invalid);
    }

    // ── read_unit ───────────────────────────────────────────────────────

    #[test]
    fn read_unit_multibyte() {
        let mut src: &[u8] = "€x".as_bytes();
        let mut scratch = [0u8; MAX_UNIT_BYTES];
        let got = Utf8Units.read_unit(&mut src, &mut scratch).unwrap();
        assert_eq!(got, Some((3, 0x20AC)));
        let got = Utf8Units.read_unit(&mut src, &mut scratch).unwrap();
        assert_eq!(got, Some((1, u32::from('x'))));
        assert_eq!(Utf8Units.read_unit(&mut src, &mut scratch).unwrap(), None);
    }

    #[test]
    fn read_unit_invalid_makes_progress() {
        let mut src: &[u8] = &[0xFF, b'a'];
        let mut scratch = [0u8; MAX_UNIT_BYTES];
        let got = Utf8Units.read_unit(&mut src, &mut scratch).unwrap();
        assert_eq!(got, Some((1, 0xFFFD)));
    }

    #[test]
    fn adapter_factory_selects_impl() {
        assert_eq!(adapter(false).display_width("漢".as_bytes()), 3);
        assert_eq!(adapter(true).display_width("漢".as_bytes()), 2);
    }
}
