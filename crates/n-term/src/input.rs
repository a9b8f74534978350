// SPDX-License-Identifier: MIT
//
// Key decoder.
//
// Turns raw terminal bytes into key events, one byte at a time. The input
// side of a line editor is small but treacherous:
//
// - Legacy CSI sequences (arrows, Home/End, editing keys, F-keys) with
//   optional xterm modifier parameters (`ESC [ 1 ; 5 C`)
// - SS3 sequences (`ESC O A`, `ESC O P`) from terminals in application mode
// - Alt+key as ESC followed by the key
// - Multi-byte characters, decoded through the unit adapter
// - Bracketed paste markers and mouse reports, decoded only to be ignored
//
// # The Escape ambiguity
//
// A lone ESC byte is either the Escape key or the first byte of a sequence
// whose remaining bytes have not arrived yet. The decoder never blocks to
// find out. It records when the ESC arrived; the read loop waits at most
// until [`Decoder::pending_deadline`] for more bytes and then calls
// [`Decoder::expire`], which resolves the pending ESC to
// [`KeyEvent::Timeout`] (a bare Escape).
//
// # Resynchronization
//
// Anything that cannot continue the current sequence yields
// [`KeyEvent::Error`] and returns the decoder to `Ground`. The caller drops
// the error; nothing is ever inserted into the line from a broken sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use thiserror::Error;
use tracing::trace;

use crate::unit::{MAX_UNIT_BYTES, UnitAdapter, UnitDecode};

/// Bytes an escape sequence (or partial unit) may occupy before it is
/// rejected as garbage. Real keyboard sequences stay under 12 bytes.
pub const ACCUMULATOR_CAPACITY: usize = 32;

/// Numeric CSI parameters kept per sequence.
const MAX_PARAMS: usize = 8;

/// Default wait for the rest of an escape sequence.
pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

// ─── Event Types ────────────────────────────────────────────────────────────

/// Arrow key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

bitflags! {
    /// Keyboard modifier flags.
    ///
    /// Matches the xterm CSI modifier encoding where `param = 1 + bitmask`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
        const SUPER = 0b0000_1000;
        const HYPER = 0b0001_0000;
        const META  = 0b0010_0000;
    }
}

/// Control keys produced by single C0 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// `\r` or `\n`.
    Enter,
    /// `\t`.
    Tab,
    /// `0x7F` or `0x08`.
    Backspace,
    /// Any other C0 byte, named by its caret letter in lowercase:
    /// `0x01` → `'a'`, `0x00` → `'@'`, `0x1C` → `'\\'`.
    Ctrl(char),
}

/// Keys reported through escape sequences that are neither arrows nor
/// function keys, plus Alt-modified characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extended {
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    /// Shift+Tab (`CSI Z`).
    BackTab,
    /// A character combined with modifiers, e.g. Alt+b as `ESC b`.
    Char(char),
    /// Bracketed paste start marker (`CSI 200~`).
    PasteStart,
    /// Bracketed paste end marker (`CSI 201~`).
    PasteEnd,
}

/// One decoded input unit: its raw bytes and the codepoint they carry.
///
/// The raw bytes are what gets inserted into the line buffer, so a
/// byte-oriented adapter inserts exactly what the terminal sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputUnit {
    bytes: [u8; MAX_UNIT_BYTES],
    len: u8,
    codepoint: u32,
}

impl InputUnit {
    /// Build from at most [`MAX_UNIT_BYTES`] bytes. Longer input is cut.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // len <= MAX_UNIT_BYTES
    pub fn from_bytes(raw: &[u8], codepoint: u32) -> Self {
        let len = raw.len().min(MAX_UNIT_BYTES);
        let mut bytes = [0u8; MAX_UNIT_BYTES];
        bytes[..len].copy_from_slice(&raw[..len]);
        Self {
            bytes,
            len: len as u8,
            codepoint,
        }
    }

    /// The UTF-8 encoding of `ch`.
    #[must_use]
    pub fn from_char(ch: char) -> Self {
        let mut enc = [0u8; MAX_UNIT_BYTES];
        let s = ch.encode_utf8(&mut enc);
        Self::from_bytes(s.as_bytes(), u32::from(ch))
    }

    /// Raw bytes as received.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// The decoded codepoint (a byte value for byte-oriented adapters).
    #[inline]
    #[must_use]
    pub const fn codepoint(&self) -> u32 {
        self.codepoint
    }

    /// The codepoint as a `char`, if it is one.
    #[must_use]
    pub fn as_char(&self) -> Option<char> {
        char::from_u32(self.codepoint)
    }
}

/// Why a byte sequence was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The escape accumulator filled up before the sequence ended.
    #[error("escape sequence longer than {ACCUMULATOR_CAPACITY} bytes")]
    Overflow,
    /// A byte arrived that cannot continue the current sequence.
    #[error("malformed escape sequence")]
    Malformed,
    /// A complete sequence this decoder has no mapping for.
    #[error("unrecognized escape sequence")]
    Unrecognized,
    /// Bytes that can never form a character.
    #[error("invalid input unit")]
    InvalidUnit,
    /// A partial sequence was abandoned by the timeout.
    #[error("escape sequence truncated")]
    Truncated,
}

/// A decoded key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A printable unit.
    Char(InputUnit),
    /// A control byte.
    Control(Control),
    /// An arrow key.
    Arrow(Direction, Modifiers),
    /// F1 through F20.
    Function(u8),
    /// Navigation/editing keys and Alt-modified characters.
    Extended(Extended, Modifiers),
    /// The byte was consumed but the sequence is not finished.
    Incomplete,
    /// A lone ESC outlived the deadline: the Escape key.
    Timeout,
    /// Garbage was discarded; the decoder is back in `Ground`.
    Error(DecodeError),
}

// ─── Accumulator ────────────────────────────────────────────────────────────

/// Fixed-capacity buffer for an in-progress sequence plus its start time.
#[derive(Debug)]
pub struct Accumulator {
    bytes: [u8; ACCUMULATOR_CAPACITY],
    len: usize,
    started: Option<Instant>,
}

impl Accumulator {
    const fn new() -> Self {
        Self {
            bytes: [0; ACCUMULATOR_CAPACITY],
            len: 0,
            started: None,
        }
    }

    /// Append a byte, stamping the start time on the first one.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Overflow`] when the buffer is full.
    pub const fn push(&mut self, byte: u8, now: Instant) -> Result<(), DecodeError> {
        if self.len == ACCUMULATOR_CAPACITY {
            return Err(DecodeError::Overflow);
        }
        if self.len == 0 {
            self.started = Some(now);
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Bytes accumulated so far.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// When the first byte of the pending sequence arrived.
    #[inline]
    #[must_use]
    pub const fn started(&self) -> Option<Instant> {
        self.started
    }

    const fn clear(&mut self) {
        self.len = 0;
        self.started = None;
    }
}

// ─── CSI parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Params {
    values: [u16; MAX_PARAMS],
    count: usize,
    /// A private marker (`<`, `=`, `>`, `?`) or intermediate byte was seen.
    private: bool,
}

impl Params {
    fn push_digit(&mut self, digit: u8) {
        if self.count == 0 {
            self.count = 1;
        }
        let slot = &mut self.values[self.count - 1];
        *slot = slot.saturating_mul(10).saturating_add(u16::from(digit - b'0'));
    }

    fn separator(&mut self) -> Result<(), DecodeError> {
        if self.count == 0 {
            // Leading `;` means an omitted first parameter.
            self.count = 1;
        }
        if self.count == MAX_PARAMS {
            return Err(DecodeError::Overflow);
        }
        self.count += 1;
        Ok(())
    }

    fn get(&self, idx: usize) -> Option<u16> {
        (idx < self.count).then(|| self.values[idx])
    }

    fn modifiers(&self) -> Modifiers {
        self.get(1).map_or(Modifiers::empty(), decode_modifiers)
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Where the decoder is within a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Between keys.
    Ground,
    /// ESC received.
    EscapeSeen,
    /// `ESC [` received.
    CsiSeen,
    /// `ESC [` plus at least one parameter or intermediate byte.
    CsiParamSeen,
    /// `ESC O` received.
    Ss3Seen,
    /// Lead byte(s) of a multi-byte unit received.
    UnitPending,
}

/// Byte-at-a-time key decoder.
#[derive(Debug)]
pub struct Decoder {
    adapter: Arc<dyn UnitAdapter>,
    state: DecodeState,
    acc: Accumulator,
    params: Params,
    /// The pending unit was preceded by ESC (Alt+character).
    alt_unit: bool,
    timeout: Duration,
}

impl Decoder {
    /// A decoder using `adapter` for plain bytes and `timeout` for the
    /// Escape ambiguity.
    #[must_use]
    pub fn new(adapter: Arc<dyn UnitAdapter>, timeout: Duration) -> Self {
        Self {
            adapter,
            state: DecodeState::Ground,
            acc: Accumulator::new(),
            params: Params::default(),
            alt_unit: false,
            timeout,
        }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes of the sequence in progress.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        self.acc.as_bytes()
    }

    /// Whether a sequence is in progress.
    #[inline]
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        !matches!(self.state, DecodeState::Ground)
    }

    /// When the pending sequence must be resolved by [`expire`](Self::expire).
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        if self.has_pending() {
            self.acc.started().map(|t| t + self.timeout)
        } else {
            None
        }
    }

    /// Feed every byte of one read and collect the completed events.
    ///
    /// [`KeyEvent::Incomplete`] is never returned from here.
    pub fn advance(&mut self, data: &[u8], now: Instant) -> Vec<KeyEvent> {
        data.iter()
            .map(|&b| self.feed(b, now))
            .filter(|ev| *ev != KeyEvent::Incomplete)
            .collect()
    }

    /// Resolve a pending sequence whose deadline has passed.
    ///
    /// A lone ESC becomes [`KeyEvent::Timeout`]; any longer partial
    /// sequence is discarded as [`DecodeError::Truncated`].
    pub fn expire(&mut self, now: Instant) -> Option<KeyEvent> {
        let deadline = self.pending_deadline()?;
        if now < deadline {
            return None;
        }
        let event = if self.state == DecodeState::EscapeSeen {
            KeyEvent::Timeout
        } else {
            trace!(target: "input", pending = ?self.acc.as_bytes(), "sequence_truncated");
            KeyEvent::Error(DecodeError::Truncated)
        };
        self.reset();
        Some(event)
    }

    /// Drive the state machine with one byte.
    pub fn feed(&mut self, byte: u8, now: Instant) -> KeyEvent {
        match self.state {
            DecodeState::Ground => self.ground(byte, now),
            DecodeState::EscapeSeen => self.escape(byte, now),
            DecodeState::CsiSeen | DecodeState::CsiParamSeen => self.csi(byte, now),
            DecodeState::Ss3Seen => self.ss3(byte),
            DecodeState::UnitPending => self.unit(byte, now),
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::Ground;
        self.acc.clear();
        self.params = Params::default();
        self.alt_unit = false;
    }

    fn done(&mut self, event: KeyEvent) -> KeyEvent {
        self.reset();
        event
    }

    fn fail(&mut self, err: DecodeError) -> KeyEvent {
        trace!(target: "input", pending = ?self.acc.as_bytes(), %err, "sequence_discarded");
        self.reset();
        KeyEvent::Error(err)
    }

    /// Fail, but let an ESC that broke the sequence start a new one.
    fn fail_resync(&mut self, err: DecodeError, byte: u8, now: Instant) -> KeyEvent {
        let event = self.fail(err);
        if byte == 0x1B {
            self.begin_escape(now);
        }
        event
    }

    fn begin_escape(&mut self, now: Instant) {
        self.state = DecodeState::EscapeSeen;
        // Cannot overflow: the accumulator was just cleared.
        let _ = self.acc.push(0x1B, now);
    }

    fn push(&mut self, byte: u8, now: Instant) -> Result<(), KeyEvent> {
        self.acc.push(byte, now).map_err(|e| self.fail(e))
    }

    // ── Ground ──────────────────────────────────────────────────────────

    fn ground(&mut self, byte: u8, now: Instant) -> KeyEvent {
        match byte {
            0x1B => {
                self.begin_escape(now);
                KeyEvent::Incomplete
            }
            b'\t' => KeyEvent::Control(Control::Tab),
            b'\r' | b'\n' => KeyEvent::Control(Control::Enter),
            0x08 | 0x7F => KeyEvent::Control(Control::Backspace),
            b @ 0x00..=0x1F => KeyEvent::Control(Control::Ctrl(caret_letter(b))),
            b => {
                if let Err(ev) = self.push(b, now) {
                    return ev;
                }
                self.decode_unit()
            }
        }
    }

    // ── Multi-byte unit ─────────────────────────────────────────────────

    fn unit(&mut self, byte: u8, now: Instant) -> KeyEvent {
        if byte == 0x1B {
            return self.fail_resync(DecodeError::InvalidUnit, byte, now);
        }
        if let Err(ev) = self.push(byte, now) {
            return ev;
        }
        self.decode_unit()
    }

    fn decode_unit(&mut self) -> KeyEvent {
        let bytes = self.acc.as_bytes();
        // The ESC of an Alt+character is not part of the unit.
        let raw = if self.alt_unit { &bytes[1..] } else { bytes };
        match self.adapter.decode_unit(raw) {
            UnitDecode::Complete { len, codepoint } => {
                let unit = InputUnit::from_bytes(&raw[..len], codepoint);
                let event = if self.alt_unit {
                    let ch = unit.as_char().unwrap_or(char::REPLACEMENT_CHARACTER);
                    KeyEvent::Extended(Extended::Char(ch), Modifiers::ALT)
                } else {
                    KeyEvent::Char(unit)
                };
                self.done(event)
            }
            UnitDecode::Incomplete if raw.len() < MAX_UNIT_BYTES => {
                self.state = DecodeState::UnitPending;
                KeyEvent::Incomplete
            }
            UnitDecode::Incomplete | UnitDecode::Invalid => self.fail(DecodeError::InvalidUnit),
        }
    }

    // ── ESC ─────────────────────────────────────────────────────────────

    fn escape(&mut self, byte: u8, now: Instant) -> KeyEvent {
        match byte {
            b'[' => {
                if let Err(ev) = self.push(byte, now) {
                    return ev;
                }
                self.state = DecodeState::CsiSeen;
                KeyEvent::Incomplete
            }
            b'O' => {
                if let Err(ev) = self.push(byte, now) {
                    return ev;
                }
                self.state = DecodeState::Ss3Seen;
                KeyEvent::Incomplete
            }
            // A second ESC: the first one was the Escape key.
            0x1B => {
                self.reset();
                self.begin_escape(now);
                KeyEvent::Timeout
            }
            b @ 0x01..=0x1A => self.done(KeyEvent::Extended(
                Extended::Char(caret_letter(b)),
                Modifiers::ALT | Modifiers::CTRL,
            )),
            b @ (0x20..=0x7E) => {
                self.done(KeyEvent::Extended(Extended::Char(char::from(b)), Modifiers::ALT))
            }
            b @ (0x00 | 0x1C..=0x1F | 0x7F) => {
                self.done(KeyEvent::Extended(Extended::Char(char::from(b)), Modifiers::ALT))
            }
            b => {
                // ESC followed by a non-ASCII lead byte: Alt+character.
                if let Err(ev) = self.push(b, now) {
                    return ev;
                }
                self.alt_unit = true;
                self.decode_unit()
            }
        }
    }

    // ── CSI ─────────────────────────────────────────────────────────────

    fn csi(&mut self, byte: u8, now: Instant) -> KeyEvent {
        if let Err(ev) = self.push(byte, now) {
            return ev;
        }
        let step = match byte {
            b'0'..=b'9' => {
                self.params.push_digit(byte);
                Ok(())
            }
            b';' | b':' => self.params.separator(),
            b'<' | b'=' | b'>' | b'?' | 0x20..=0x2F => {
                self.params.private = true;
                Ok(())
            }
            0x40..=0x7E => return self.csi_final(byte),
            _ => {
                return self.fail_resync(DecodeError::Malformed, byte, now);
            }
        };
        match step {
            Ok(()) => {
                self.state = DecodeState::CsiParamSeen;
                KeyEvent::Incomplete
            }
            Err(e) => self.fail(e),
        }
    }

    fn csi_final(&mut self, final_byte: u8) -> KeyEvent {
        if self.params.private {
            // Mouse reports, device attribute replies, and the like.
            return self.fail(DecodeError::Unrecognized);
        }
        let mods = self.params.modifiers();
        let event = match final_byte {
            b'A' => KeyEvent::Arrow(Direction::Up, mods),
            b'B' => KeyEvent::Arrow(Direction::Down, mods),
            b'C' => KeyEvent::Arrow(Direction::Right, mods),
            b'D' => KeyEvent::Arrow(Direction::Left, mods),
            b'H' => KeyEvent::Extended(Extended::Home, mods),
            b'F' => KeyEvent::Extended(Extended::End, mods),
            b'P' => KeyEvent::Function(1),
            b'Q' => KeyEvent::Function(2),
            b'R' => KeyEvent::Function(3),
            b'S' => KeyEvent::Function(4),
            b'Z' => KeyEvent::Extended(Extended::BackTab, Modifiers::SHIFT),
            b'~' => match tilde_key(self.params.get(0).unwrap_or(0)) {
                Some(TildeKey::Extended(key)) => KeyEvent::Extended(key, mods),
                Some(TildeKey::Function(n)) => KeyEvent::Function(n),
                None => return self.fail(DecodeError::Unrecognized),
            },
            _ => return self.fail(DecodeError::Unrecognized),
        };
        self.done(event)
    }

    // ── SS3 ─────────────────────────────────────────────────────────────

    fn ss3(&mut self, byte: u8) -> KeyEvent {
        let none = Modifiers::empty();
        let event = match byte {
            b'A' => KeyEvent::Arrow(Direction::Up, none),
            b'B' => KeyEvent::Arrow(Direction::Down, none),
            b'C' => KeyEvent::Arrow(Direction::Right, none),
            b'D' => KeyEvent::Arrow(Direction::Left, none),
            b'H' => KeyEvent::Extended(Extended::Home, none),
            b'F' => KeyEvent::Extended(Extended::End, none),
            b'P' => KeyEvent::Function(1),
            b'Q' => KeyEvent::Function(2),
            b'R' => KeyEvent::Function(3),
            b'S' => KeyEvent::Function(4),
            _ => return self.fail(DecodeError::Unrecognized),
        };
        self.done(event)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

enum TildeKey {
    Extended(Extended),
    Function(u8),
}

/// Map the first parameter of a `CSI n ~` sequence.
const fn tilde_key(n: u16) -> Option<TildeKey> {
    let key = match n {
        1 | 7 => TildeKey::Extended(Extended::Home),
        2 => TildeKey::Extended(Extended::Insert),
        3 => TildeKey::Extended(Extended::Delete),
        4 | 8 => TildeKey::Extended(Extended::End),
        5 => TildeKey::Extended(Extended::PageUp),
        6 => TildeKey::Extended(Extended::PageDown),
        11 => TildeKey::Function(1),
        12 => TildeKey::Function(2),
        13 => TildeKey::Function(3),
        14 => TildeKey::Function(4),
        15 => TildeKey::Function(5),
        17 => TildeKey::Function(6),
        18 => TildeKey::Function(7),
        19 => TildeKey::Function(8),
        20 => TildeKey::Function(9),
        21 => TildeKey::Function(10),
        23 => TildeKey::Function(11),
        24 => TildeKey::Function(12),
        25 => TildeKey::Function(13),
        26 => TildeKey::Function(14),
        28 => TildeKey::Function(15),
        29 => TildeKey::Function(16),
        31 => TildeKey::Function(17),
        32 => TildeKey::Function(18),
        33 => TildeKey::Function(19),
        34 => TildeKey::Function(20),
        200 => TildeKey::Extended(Extended::PasteStart),
        201 => TildeKey::Extended(Extended::PasteEnd),
        _ => return None,
    };
    Some(key)
}

/// The caret-notation letter of a C0 byte, lowercased (`0x01` → `'a'`).
fn caret_letter(b: u8) -> char {
    char::from(b | 0x40).to_ascii_lowercase()
}

/// Decode a CSI modifier parameter into `Modifiers` bitflags.
///
/// The encoding is `1 + bitmask`. A parameter of 0 or 1 means no modifiers.
/// Only the low 6 bits carry flags, so the truncation is intentional.
#[allow(clippy::cast_possible_truncation)]
const fn decode_modifiers(param: u16) -> Modifiers {
    let val = if param > 0 { param - 1 } else { 0 };
    Modifiers::from_bits_truncate(val as u8)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
