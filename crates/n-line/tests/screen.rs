//! Screen-level tests: refresher output is fed to a small VT model and the
//! resulting screen is compared with what the buffer says should be there.
//!
//! Leftover characters from a previous write show up as mismatches, so
//! these tests cover the erase-undoes-write invariant without inspecting
//! the escape sequences themselves.

use std::sync::Arc;

use n_line::editor::{Editor, ReadOutcome};
use n_line::line::LineBuffer;
use n_line::options::EditorOptions;
use n_line::refresh::{Frame, Prompt, Refresh, Refresher};
use n_line::{Hint, HistoryStore};
use n_term::output::OutputBuffer;
use n_term::reader::ScriptedSource;
use n_term::unit::{UnitAdapter, Utf8Units};
use proptest::prelude::*;
use unicode_width::UnicodeWidthChar;

// ---------------------------------------------------------------------------
// VT model
// ---------------------------------------------------------------------------

/// Second cell of a double-width glyph.
const WIDE_TAIL: char = '\0';

/// Just enough of a VT100 for a line editor: printable characters with
/// deferred wrap, CR, LF, relative cursor motion, erase to end of line,
/// clear screen. Double-width glyphs take two cells, and one that does not
/// fit before the margin wraps whole, like xterm. SGR is accepted and
/// ignored. Rows grow downwards without limit; row 0 is where the edit
/// started.
struct Vt {
    cols: usize,
    grid: Vec<Vec<char>>,
    row: usize,
    col: usize,
    pending_wrap: bool,
}

impl Vt {
    fn new(cols: usize) -> Self {
        Self {
            cols,
            grid: vec![vec![' '; cols]],
            row: 0,
            col: 0,
            pending_wrap: false,
        }
    }

    fn ensure_row(&mut self, row: usize) {
        while self.grid.len() <= row {
            self.grid.push(vec![' '; self.cols]);
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        let text = std::str::from_utf8(bytes).expect("editor output is UTF-8");
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    self.col = 0;
                    self.pending_wrap = false;
                }
                '\n' => {
                    self.row += 1;
                    self.ensure_row(self.row);
                    self.pending_wrap = false;
                }
                '\x07' => {}
                '\x1b' => {
                    assert_eq!(chars.next(), Some('['), "only CSI sequences are expected");
                    let mut params = String::new();
                    let fin = loop {
                        let c = chars.next().expect("unterminated CSI");
                        if c.is_ascii_digit() || c == ';' || c == '?' {
                            params.push(c);
                        } else {
                            break c;
                        }
                    };
                    self.csi(fin, &params);
                }
                c => self.print(c),
            }
        }
    }

    fn csi(&mut self, fin: char, params: &str) {
        let count = params.parse::<usize>().unwrap_or(1).max(1);
        match fin {
            'A' => {
                assert!(self.row >= count, "cursor moved above the edit");
                self.row -= count;
            }
            'B' => {
                self.row += count;
                self.ensure_row(self.row);
            }
            'C' => self.col = (self.col + count).min(self.cols - 1),
            'D' => self.col = self.col.saturating_sub(count),
            'K' => {
                assert!(params.is_empty() || params == "0", "unexpected EL {params}");
                let row = &mut self.grid[self.row];
                if row[self.col] == WIDE_TAIL && self.col > 0 {
                    row[self.col - 1] = ' ';
                }
                for cell in &mut row[self.col..] {
                    *cell = ' ';
                }
            }
            'H' => {
                self.row = 0;
                self.col = 0;
            }
            'J' => {
                self.grid = vec![vec![' '; self.cols]];
            }
            'm' => return,
            other => panic!("unexpected CSI final {other:?}"),
        }
        self.pending_wrap = false;
    }

    fn wrap(&mut self) {
        self.row += 1;
        self.col = 0;
        self.pending_wrap = false;
        self.ensure_row(self.row);
    }

    fn print(&mut self, c: char) {
        let width = c.width().unwrap_or(0);
        assert!(width > 0, "zero-width output is not modelled: {c:?}");
        if self.pending_wrap || (self.col > 0 && self.col + width > self.cols) {
            self.wrap();
        }
        let row = &mut self.grid[self.row];
        // Overwriting half of a wide glyph blanks the other half.
        if row[self.col] == WIDE_TAIL && self.col > 0 {
            row[self.col - 1] = ' ';
        }
        let end = (self.col + width).min(self.cols);
        if end < self.cols && row[end] == WIDE_TAIL {
            row[end] = ' ';
        }
        row[self.col] = c;
        for cell in &mut row[self.col + 1..end] {
            *cell = WIDE_TAIL;
        }
        if end == self.cols {
            self.col = self.cols - 1;
            self.pending_wrap = true;
        } else {
            self.col = end;
        }
    }

    fn lines(&self) -> Vec<String> {
        normalize(
            self.grid
                .iter()
                .map(|r| r.iter().filter(|&&c| c != WIDE_TAIL).collect())
                .collect(),
        )
    }

    const fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }
}

fn normalize(rows: Vec<String>) -> Vec<String> {
    let mut rows: Vec<String> = rows.into_iter().map(|r| r.trim_end().to_owned()).collect();
    while rows.last().is_some_and(String::is_empty) {
        rows.pop();
    }
    rows
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn adapter() -> Arc<dyn UnitAdapter> {
    Arc::new(Utf8Units)
}

fn draw(r: &mut Refresher, vt: &mut Vt, prompt: &Prompt, buf: &LineBuffer, hint: Option<&Hint>) -> Refresh {
    let mut out = OutputBuffer::new();
    let frame = Frame {
        prompt,
        buf: buf.as_bytes(),
        cursor: buf.cursor(),
        hint,
    };
    let kind = r.refresh(&mut out, &frame).unwrap();
    vt.feed(out.as_bytes());
    kind
}

/// The screen a from-scratch redraw of `buf` produces.
fn fresh(multi_line: bool, cols: usize, prompt: &Prompt, buf: &LineBuffer) -> Vt {
    let mut r = Refresher::new(adapter(), multi_line, false, cols);
    let mut vt = Vt::new(cols);
    draw(&mut r, &mut vt, prompt, buf, None);
    vt
}

/// Prompt and line laid out with wrapping, and the cursor position. A wide
/// glyph that would cross the margin starts the next row.
fn expected_wrapped(prompt: &Prompt, buf: &LineBuffer, cols: usize) -> (Vec<String>, (usize, usize)) {
    let line = buf.to_string_lossy();
    let before = String::from_utf8_lossy(&buf.as_bytes()[..buf.cursor()]).chars().count();
    let at = prompt.line().chars().count() + before;

    let mut rows = vec![String::new()];
    let mut col = 0;
    let mut cursor = None;
    for (i, c) in prompt.line().chars().chain(line.chars()).enumerate() {
        let width = c.width().unwrap_or(0);
        if col + width > cols {
            rows.push(String::new());
            col = 0;
        }
        if i == at {
            cursor = Some((rows.len() - 1, col));
        }
        rows.last_mut().expect("at least one row").push(c);
        col += width;
    }
    let last = rows.len() - 1;
    let cursor = cursor.unwrap_or(if col == cols { (last + 1, 0) } else { (last, col) });
    (normalize(rows), cursor)
}

#[derive(Debug, Clone)]
enum Op {
    Insert(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    WordLeft,
    WordRight,
    KillWord,
    KillEnd,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => prop::sample::select(vec!['a', 'b', 'z', ' ', 'é', '_', '漢', '🦀']).prop_map(Op::Insert),
        2 => Just(Op::Backspace),
        1 => Just(Op::Delete),
        2 => Just(Op::Left),
        1 => Just(Op::Right),
        1 => Just(Op::Home),
        1 => Just(Op::End),
        1 => Just(Op::WordLeft),
        1 => Just(Op::WordRight),
        1 => Just(Op::KillWord),
        1 => Just(Op::KillEnd),
    ]
}

fn apply(buf: &mut LineBuffer, op: &Op) {
    match op {
        Op::Insert(c) => {
            let mut enc = [0u8; 4];
            let _ = buf.insert_at_cursor(c.encode_utf8(&mut enc).as_bytes());
        }
        Op::Backspace => {
            buf.delete_before_cursor();
        }
        Op::Delete => {
            buf.delete_at_cursor();
        }
        Op::Left => {
            buf.move_left();
        }
        Op::Right => {
            buf.move_right();
        }
        Op::Home => {
            buf.move_home();
        }
        Op::End => {
            buf.move_end();
        }
        Op::WordLeft => {
            buf.move_word_left();
        }
        Op::WordRight => {
            buf.move_word_right();
        }
        Op::KillWord => {
            buf.delete_word_before_cursor();
        }
        Op::KillEnd => {
            buf.delete_to_end();
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    // Every multi-line refresh leaves exactly prompt + line on screen.
    #[test]
    fn multi_line_screen_matches_buffer(ops in prop::collection::vec(op(), 0..80), cols in 3usize..16) {
        let prompt = Prompt::new("> ");
        let mut r = Refresher::new(adapter(), true, false, cols);
        let mut vt = Vt::new(cols);
        let mut buf = LineBuffer::new(adapter(), 64);
        draw(&mut r, &mut vt, &prompt, &buf, None);
        for op in &ops {
            apply(&mut buf, op);
            draw(&mut r, &mut vt, &prompt, &buf, None);
            let (lines, cursor) = expected_wrapped(&prompt, &buf, cols);
            prop_assert_eq!(vt.lines(), lines);
            prop_assert_eq!(vt.cursor(), cursor);
        }
    }

    // Whatever path a refresh takes, the screen equals a fresh full redraw.
    #[test]
    fn incremental_equals_full_redraw(
        ops in prop::collection::vec(op(), 0..60),
        cols in 3usize..16,
        multi_line in any::<bool>(),
    ) {
        let prompt = Prompt::new("> ");
        let mut r = Refresher::new(adapter(), multi_line, false, cols);
        let mut vt = Vt::new(cols);
        let mut buf = LineBuffer::new(adapter(), 64);
        draw(&mut r, &mut vt, &prompt, &buf, None);
        for op in &ops {
            apply(&mut buf, op);
            draw(&mut r, &mut vt, &prompt, &buf, None);
            let reference = fresh(multi_line, cols, &prompt, &buf);
            prop_assert_eq!(vt.lines(), reference.lines());
            prop_assert_eq!(vt.cursor(), reference.cursor());
        }
    }

    // A second refresh of unchanged state writes nothing.
    #[test]
    fn refresh_is_idempotent(ops in prop::collection::vec(op(), 0..40), cols in 3usize..16, multi_line in any::<bool>()) {
        let prompt = Prompt::new("> ");
        let mut r = Refresher::new(adapter(), multi_line, false, cols);
        let mut buf = LineBuffer::new(adapter(), 64);
        for op in &ops {
            apply(&mut buf, op);
            let mut out = OutputBuffer::new();
            let frame = Frame { prompt: &prompt, buf: buf.as_bytes(), cursor: buf.cursor(), hint: None };
            r.refresh(&mut out, &frame).unwrap();
            out.clear();
            prop_assert_eq!(r.refresh(&mut out, &frame).unwrap(), Refresh::Unchanged);
            prop_assert!(out.is_empty());
        }
    }

    // Single-line: one row, cursor inside it, text is a window of the line.
    #[test]
    fn single_line_keeps_cursor_visible(ops in prop::collection::vec(op(), 0..80), cols in 3usize..16) {
        let prompt = Prompt::new("> ");
        let mut r = Refresher::new(adapter(), false, false, cols);
        let mut vt = Vt::new(cols);
        let mut buf = LineBuffer::new(adapter(), 64);
        for op in &ops {
            apply(&mut buf, op);
            draw(&mut r, &mut vt, &prompt, &buf, None);
            let lines = vt.lines();
            prop_assert!(lines.len() <= 1);
            let (row, col) = vt.cursor();
            prop_assert_eq!(row, 0);
            prop_assert!(col < cols);
            let shown = lines.first().cloned().unwrap_or_default();
            let window = shown.strip_prefix(">").unwrap_or(&shown).trim_start();
            prop_assert!(buf.to_string_lossy().contains(window.trim_end()));
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scrolled_line_fits_width() {
    let prompt = Prompt::new("> ");
    let mut r = Refresher::new(adapter(), false, false, 10);
    let mut vt = Vt::new(10);
    let mut buf = LineBuffer::new(adapter(), 64);
    for c in "0123456789".bytes() {
        buf.insert_at_cursor(&[c]).unwrap();
        draw(&mut r, &mut vt, &prompt, &buf, None);
    }
    assert_eq!(vt.lines(), vec!["> 3456789".to_owned()]);
    assert_eq!(vt.cursor(), (0, 9));
}

#[test]
fn wide_glyph_at_margin_erases_cleanly() {
    let prompt = Prompt::new("> ");
    let mut r = Refresher::new(adapter(), true, false, 10);
    let mut vt = Vt::new(10);
    let mut buf = LineBuffer::new(adapter(), 64);
    for c in ["0", "1", "2", "3", "4", "5", "6", "漢", "x"] {
        buf.insert_at_cursor(c.as_bytes()).unwrap();
        draw(&mut r, &mut vt, &prompt, &buf, None);
    }
    assert_eq!(vt.lines(), vec!["> 0123456".to_owned(), "漢x".to_owned()]);
    assert_eq!(vt.cursor(), (1, 3));

    buf.move_left();
    buf.move_left();
    draw(&mut r, &mut vt, &prompt, &buf, None);
    assert_eq!(vt.cursor(), (1, 0));

    buf.clear();
    buf.insert_at_cursor(b"ok").unwrap();
    draw(&mut r, &mut vt, &prompt, &buf, None);
    assert_eq!(vt.lines(), vec!["> ok".to_owned()]);
    assert_eq!(vt.cursor(), (0, 4));
}

#[test]
fn hint_leaves_no_trace() {
    let prompt = Prompt::new("> ");
    let hint = Hint::new(" <directory>").with_color(90);
    for multi_line in [false, true] {
        let mut r = Refresher::new(adapter(), multi_line, false, 12);
        let mut vt = Vt::new(12);
        let mut buf = LineBuffer::new(adapter(), 64);
        buf.insert_at_cursor(b"cd").unwrap();
        draw(&mut r, &mut vt, &prompt, &buf, Some(&hint));
        assert_eq!(vt.lines(), vec!["> cd <direc".to_owned()]);
        draw(&mut r, &mut vt, &prompt, &buf, None);
        assert_eq!(vt.lines(), vec!["> cd".to_owned()]);
    }
}

#[test]
fn editor_session_on_vt() {
    let mut editor = Editor::new(EditorOptions {
        multi_line: true,
        ..EditorOptions::default()
    });
    editor.history_mut().add("previous command that wraps");
    // Recall, go home, skip two words, type, submit.
    let mut input = ScriptedSource::from_chunks(["\x1b[A", "\x01", "\x1bf\x1bf", " then", "\r"]);
    let mut out = Vec::new();
    let outcome = editor
        .read_line_with("> ", &mut input, &mut out, &mut || 10u16)
        .unwrap();
    assert_eq!(
        outcome,
        ReadOutcome::Line("previous command then that wraps".to_owned())
    );
    let mut vt = Vt::new(10);
    vt.feed(&out);
    assert_eq!(
        vt.lines(),
        vec!["> previous", " command t", "hen that w", "raps"]
    );
    // Submitting leaves the cursor at the start of the row below the edit.
    assert_eq!(vt.cursor(), (4, 0));
}
