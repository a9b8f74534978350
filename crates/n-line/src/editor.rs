//! Editor: one interactive line-editing session at a time.
//!
//! [`Editor`] holds what outlives a line: options, history, and the
//! completion, hint and idle-prompt collaborators. Each call to
//! [`Editor::read_line`] builds a fresh session (buffer, decoder,
//! refresher, history position, sub-mode) and runs the foreground loop:
//!
//! 1. Wait for terminal bytes, with a deadline if the decoder holds a
//!    partial escape sequence or an idle hook is installed.
//! 2. Decode the bytes into key events.
//! 3. Dispatch each event to the active mode (editing, reverse search or
//!    completion cycling), mutating the session.
//! 4. Refresh the screen into an output buffer and flush it once per read.
//!
//! The loop never blocks on anything but the read. Background results reach
//! the screen through the idle hook, which runs on the foreground thread.
//!
//! # Key map
//!
//! | Key                  | Action                                    |
//! |----------------------|-------------------------------------------|
//! | Enter                | submit                                    |
//! | Ctrl-C               | abandon the line ([`ReadOutcome::Interrupted`]) |
//! | Ctrl-D               | delete at cursor, or end of input on an empty line |
//! | Ctrl-A / Home        | start of line                             |
//! | Ctrl-E / End         | end of line                               |
//! | Ctrl-B / Left        | one unit left                             |
//! | Ctrl-F / Right       | one unit right                            |
//! | Alt-B / Ctrl-Left    | one word left                             |
//! | Alt-F / Ctrl-Right   | one word right                            |
//! | Ctrl-P / Up          | older history entry                       |
//! | Ctrl-N / Down        | newer history entry                       |
//! | Backspace            | delete before cursor                      |
//! | Delete               | delete at cursor                          |
//! | Ctrl-W / Alt-Backspace | delete word before cursor               |
//! | Ctrl-K               | delete to end of line                     |
//! | Ctrl-U               | delete to start of line                   |
//! | Ctrl-T               | transpose                                 |
//! | Ctrl-L               | clear screen                              |
//! | Ctrl-R               | reverse history search                    |
//! | Tab / Shift-Tab      | complete / cycle candidates               |

use std::io::{self, BufRead, Read, Write};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use n_term::ansi;
use n_term::input::{Control, Decoder, Direction, Extended, KeyEvent, Modifiers};
use n_term::output::OutputBuffer;
use n_term::reader::{ByteSource, FdSource, READ_BUF_SIZE, ReadStatus};
use n_term::terminal::{self, RawMode};
use n_term::unit::{MAX_UNIT_BYTES, UnitAdapter};
use tracing::{debug, trace};

use crate::completion::{Completer, Completion, CompletionState, Hint, Hinter};
use crate::error::EditError;
use crate::history::{HistoryNav, HistoryStore, MemoryHistory, Step};
use crate::line::LineBuffer;
use crate::options::EditorOptions;
use crate::refresh::{Frame, Prompt, Refresher};
use crate::search::SearchState;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The user submitted a line.
    Line(String),
    /// End of input: Ctrl-D on an empty line, or the input closed.
    Eof,
    /// Ctrl-C.
    Interrupted,
}

type PromptHook = Box<dyn FnMut() -> Option<String>>;

struct IdleHook {
    interval: Duration,
    hook: PromptHook,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

enum Mode {
    Edit,
    Search(SearchState),
    Complete(CompletionState),
}

/// State of one `read_line` call.
struct Session {
    prompt_text: String,
    prompt: Prompt,
    buf: LineBuffer,
    nav: HistoryNav,
    mode: Mode,
    refresher: Refresher,
    decoder: Decoder,
    out: OutputBuffer,
    show_hints: bool,
}

impl Session {
    fn replace_line(&mut self, text: &str) {
        self.buf.replace(text.as_bytes());
    }

    fn bell(&mut self) {
        // Writing into an OutputBuffer cannot fail.
        let _ = ansi::bell(&mut self.out);
    }
}

/// How much of the screen to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redraw {
    /// Let the refresher diff against the last layout.
    Diff,
    /// Erase and redraw.
    Full,
    /// Clear the whole screen first.
    Clear,
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// A line editor.
pub struct Editor<H = MemoryHistory> {
    options: EditorOptions,
    adapter: Arc<dyn UnitAdapter>,
    history: H,
    completer: Option<Box<dyn Completer>>,
    hinter: Option<Box<dyn Hinter>>,
    idle: Option<IdleHook>,
}

impl Editor<MemoryHistory> {
    /// An editor with an in-memory history sized by the options.
    #[must_use]
    pub fn new(options: EditorOptions) -> Self {
        let history = MemoryHistory::new(options.history_max_len);
        Self::with_history(options, history)
    }
}

impl<H: HistoryStore> Editor<H> {
    /// An editor over a caller-supplied history store.
    #[must_use]
    pub fn with_history(options: EditorOptions, history: H) -> Self {
        Self {
            adapter: options.adapter(),
            options,
            history,
            completer: None,
            hinter: None,
            idle: None,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub const fn set_multi_line(&mut self, on: bool) {
        self.options.multi_line = on;
    }

    pub const fn set_mask(&mut self, on: bool) {
        self.options.mask = on;
    }

    #[must_use]
    pub const fn history(&self) -> &H {
        &self.history
    }

    pub const fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    pub fn set_completer(&mut self, completer: impl Completer + 'static) {
        self.completer = Some(Box::new(completer));
    }

    pub fn set_hinter(&mut self, hinter: impl Hinter + 'static) {
        self.hinter = Some(Box::new(hinter));
    }

    /// Ask `hook` for a new prompt whenever input has been idle for
    /// `interval`. Returning `Some` with different text redraws the line
    /// under the new prompt. Only the last prompt line is redrawn.
    pub fn set_prompt_refresh(
        &mut self,
        interval: Duration,
        hook: impl FnMut() -> Option<String> + 'static,
    ) {
        self.idle = Some(IdleHook {
            interval,
            hook: Box::new(hook),
        });
    }

    pub fn clear_prompt_refresh(&mut self) {
        self.idle = None;
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Read one line from the controlling terminal.
    ///
    /// Raw-mode editing needs a tty on stdin and a `TERM` that understands
    /// cursor movement; otherwise the line is read as plain text.
    ///
    /// # Errors
    ///
    /// [`EditError::Io`] if the terminal cannot be read or switched into
    /// raw mode.
    pub fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, EditError> {
        let input = FdSource::stdin();
        let fd = input.fd();
        if !terminal::is_tty(fd) {
            return self.read_plain(prompt, &mut io::stdin().lock(), &mut io::sink());
        }
        let term = std::env::var("TERM").ok();
        if terminal::is_unsupported_term(term.as_deref()) {
            return self.read_plain(prompt, &mut io::stdin().lock(), &mut io::stdout());
        }

        let mut raw = RawMode::enable(fd)?;
        terminal::install_resize_handler();
        let mut source = input;
        let mut stdout = io::stdout();
        let mut columns = || {
            let mut query = FdSource::from_raw_fd(fd);
            terminal::columns(fd, &mut query, &mut io::stdout())
        };
        let outcome = self.read_line_with(prompt, &mut source, &mut stdout, &mut columns);
        raw.disable()?;
        outcome
    }

    /// Run an edit session over explicit I/O. `columns` is asked for the
    /// terminal width at the start and after every interrupted read.
    ///
    /// # Errors
    ///
    /// [`EditError::Io`] if `input` fails. Write failures are logged and
    /// otherwise ignored.
    pub fn read_line_with(
        &mut self,
        prompt: &str,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
        columns: &mut dyn FnMut() -> u16,
    ) -> Result<ReadOutcome, EditError> {
        let mut s = Session {
            prompt_text: prompt.to_owned(),
            prompt: Prompt::new(prompt),
            buf: LineBuffer::new(Arc::clone(&self.adapter), self.options.max_line_bytes),
            nav: HistoryNav::new(),
            mode: Mode::Edit,
            refresher: Refresher::new(
                Arc::clone(&self.adapter),
                self.options.multi_line,
                self.options.mask,
                usize::from(columns()),
            ),
            decoder: Decoder::new(Arc::clone(&self.adapter), self.options.escape_timeout()),
            out: OutputBuffer::new(),
            show_hints: true,
        };
        debug!(target: "input", columns = s.refresher.columns(), "session start");

        let _ = s.refresher.begin(&mut s.out, &s.prompt);
        self.redraw(&mut s, Redraw::Full);
        flush(&mut s.out, output);

        let mut bytes = [0u8; READ_BUF_SIZE];
        loop {
            let status = input.read_timeout(&mut bytes, self.read_timeout(&s.decoder))?;
            match status {
                ReadStatus::Data(n) => {
                    for event in s.decoder.advance(&bytes[..n], Instant::now()) {
                        if let Some(outcome) = self.dispatch(&mut s, event) {
                            flush(&mut s.out, output);
                            return Ok(outcome);
                        }
                    }
                }
                ReadStatus::TimedOut => {
                    if let Some(deadline) = s.decoder.pending_deadline() {
                        // The source only times out once the deadline passed.
                        let now = Instant::now().max(deadline);
                        if let Some(event) = s.decoder.expire(now) {
                            if let Some(outcome) = self.dispatch(&mut s, event) {
                                flush(&mut s.out, output);
                                return Ok(outcome);
                            }
                        }
                    } else {
                        self.on_idle(&mut s);
                    }
                }
                ReadStatus::Interrupted => {
                    let resized = terminal::take_resize();
                    let cols = usize::from(columns());
                    if resized || cols != s.refresher.columns() {
                        debug!(target: "input", cols, "resize");
                        s.refresher.set_columns(cols);
                        self.redraw(&mut s, Redraw::Full);
                    }
                }
                ReadStatus::Eof => {
                    let outcome = if s.buf.is_empty() {
                        ReadOutcome::Eof
                    } else {
                        ReadOutcome::Line(s.buf.to_string_lossy())
                    };
                    self.finish(&mut s);
                    flush(&mut s.out, output);
                    return Ok(outcome);
                }
            }
            flush(&mut s.out, output);
        }
    }

    /// Read a line without editing: print the prompt, read up to a
    /// newline. Used when stdin is not a terminal or the terminal is too
    /// limited for cursor control.
    ///
    /// # Errors
    ///
    /// [`EditError::Io`] if reading fails.
    pub fn read_plain(
        &self,
        prompt: &str,
        reader: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<ReadOutcome, EditError> {
        output.write_all(prompt.as_bytes())?;
        output.flush()?;
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(ReadOutcome::Eof);
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        let mut buf = LineBuffer::new(Arc::clone(&self.adapter), self.options.max_line_bytes);
        buf.replace(&line);
        Ok(ReadOutcome::Line(buf.to_string_lossy()))
    }

    /// Key-code debugging on the controlling terminal: print every unit
    /// read and the events it decodes to, until Ctrl-C.
    ///
    /// # Errors
    ///
    /// [`EditError::Io`] on terminal failures.
    pub fn print_keycodes(&self) -> Result<(), EditError> {
        let mut input = FdSource::stdin();
        let mut raw = RawMode::enable(input.fd())?;
        let result = self.keycodes_with(&mut input, &mut io::stdout());
        raw.disable()?;
        result
    }

    /// [`print_keycodes`](Self::print_keycodes) over explicit I/O. Stops at
    /// Ctrl-C or end of input.
    ///
    /// # Errors
    ///
    /// [`EditError::Io`] if reading or writing fails.
    pub fn keycodes_with(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), EditError> {
        output.write_all(
            b"Key codes debugging mode.\r\nPress keys to see scan codes. Press Ctrl-C to quit.\r\n",
        )?;
        output.flush()?;
        let mut decoder = Decoder::new(Arc::clone(&self.adapter), self.options.escape_timeout());
        let mut scratch = [0u8; MAX_UNIT_BYTES];
        while let Some((len, codepoint)) = self.adapter.read_unit(input, &mut scratch)? {
            let raw = &scratch[..len];
            let shown = char::from_u32(codepoint)
                .filter(|c| !c.is_control())
                .unwrap_or('?');
            write!(output, "'{shown}' {raw:02x?} U+{codepoint:04X}")?;
            let events = decoder.advance(raw, Instant::now());
            if events.is_empty() {
                write!(output, " (pending)")?;
            }
            for event in &events {
                write!(output, " {event:?}")?;
            }
            output.write_all(b"\r\n")?;
            output.flush()?;
            if events.contains(&KeyEvent::Control(Control::Ctrl('c'))) {
                break;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loop helpers
    // -----------------------------------------------------------------------

    /// A partial escape sequence waits only for its own deadline; otherwise
    /// the idle hook's interval, if any.
    fn read_timeout(&self, decoder: &Decoder) -> Option<Duration> {
        match decoder.pending_deadline() {
            Some(deadline) => Some(deadline.saturating_duration_since(Instant::now())),
            None => self.idle.as_ref().map(|idle| idle.interval),
        }
    }

    fn on_idle(&mut self, s: &mut Session) {
        let Some(idle) = self.idle.as_mut() else {
            return;
        };
        let Some(text) = (idle.hook)() else {
            return;
        };
        if text == s.prompt_text {
            return;
        }
        trace!(target: "input", "idle prompt update");
        s.prompt = Prompt::new(&text);
        s.prompt_text = text;
        if matches!(s.mode, Mode::Search(_)) {
            return;
        }
        self.redraw(s, Redraw::Full);
    }

    fn redraw(&self, s: &mut Session, how: Redraw) {
        let hint = match &s.mode {
            Mode::Complete(state) => Some(state.indicator()),
            Mode::Edit if s.show_hints => self.hint_for(&s.buf),
            _ => None,
        };
        let search_prompt;
        let prompt = match &s.mode {
            Mode::Search(state) => {
                search_prompt = Prompt::new(&state.prompt());
                &search_prompt
            }
            _ => &s.prompt,
        };
        let frame = Frame {
            prompt,
            buf: s.buf.as_bytes(),
            cursor: s.buf.cursor(),
            hint: hint.as_ref(),
        };
        let result = match how {
            Redraw::Diff => s.refresher.refresh(&mut s.out, &frame).map(|_| ()),
            Redraw::Full => {
                s.refresher.invalidate();
                s.refresher.refresh(&mut s.out, &frame).map(|_| ())
            }
            Redraw::Clear => s.refresher.clear_screen(&mut s.out, &frame),
        };
        if let Err(err) = result {
            debug!(target: "refresh", %err, "redraw failed");
        }
    }

    fn hint_for(&self, buf: &LineBuffer) -> Option<Hint> {
        self.hinter.as_ref()?.hint(&buf.to_string_lossy())
    }

    /// Drop hints, then move below the edit.
    fn finish(&self, s: &mut Session) {
        s.show_hints = false;
        s.mode = Mode::Edit;
        self.redraw(s, Redraw::Diff);
        if let Err(err) = s.refresher.finish(&mut s.out) {
            debug!(target: "refresh", %err, "finish failed");
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, s: &mut Session, event: KeyEvent) -> Option<ReadOutcome> {
        trace!(target: "input", ?event, "key");
        match mem::replace(&mut s.mode, Mode::Edit) {
            Mode::Edit => self.edit(s, event),
            Mode::Search(state) => self.search(s, state, event),
            Mode::Complete(state) => self.complete(s, state, event),
        }
    }

    fn search(&mut self, s: &mut Session, mut state: SearchState, event: KeyEvent) -> Option<ReadOutcome> {
        let found = match event {
            KeyEvent::Char(unit) => Some(state.push(&String::from_utf8_lossy(unit.as_bytes()), &self.history)),
            KeyEvent::Control(Control::Ctrl('r')) => Some(state.repeat(&self.history)),
            KeyEvent::Control(Control::Backspace) => Some(state.pop(&self.history)),
            KeyEvent::Control(Control::Ctrl('g')) | KeyEvent::Timeout => {
                let (line, cursor) = state.saved();
                s.replace_line(line);
                s.buf.set_cursor(cursor);
                self.redraw(s, Redraw::Full);
                return None;
            }
            KeyEvent::Control(Control::Enter) => {
                self.accept_search(s, &state);
                self.redraw(s, Redraw::Full);
                return None;
            }
            KeyEvent::Incomplete | KeyEvent::Error(_) => None,
            other => {
                // Accept the match and handle the key as usual.
                self.accept_search(s, &state);
                self.redraw(s, Redraw::Full);
                return self.edit(s, other);
            }
        };
        if found == Some(false) {
            s.bell();
        }
        let (line, cursor) = state.shown();
        let (line, cursor) = (line.to_owned(), cursor);
        s.replace_line(&line);
        s.buf.set_cursor(cursor);
        s.mode = Mode::Search(state);
        self.redraw(s, Redraw::Full);
        None
    }

    /// Keep the match and browse on from its place in history. The line
    /// the search started from is saved where it came from, so Down leads
    /// back to it.
    fn accept_search(&mut self, s: &mut Session, state: &SearchState) {
        if let Some(found) = state.current() {
            let (saved, _) = state.saved();
            s.nav.jump(&mut self.history, found.index + 1, saved);
        }
    }

    fn complete(&mut self, s: &mut Session, mut state: CompletionState, event: KeyEvent) -> Option<ReadOutcome> {
        match event {
            KeyEvent::Control(Control::Tab) => {
                let next = state.next().to_owned();
                s.replace_line(&next);
            }
            KeyEvent::Extended(Extended::BackTab, _) => {
                let prev = state.prev().to_owned();
                s.replace_line(&prev);
            }
            KeyEvent::Timeout => {
                let (line, cursor) = state.saved();
                s.replace_line(line);
                s.buf.set_cursor(cursor);
                self.redraw(s, Redraw::Full);
                return None;
            }
            KeyEvent::Incomplete | KeyEvent::Error(_) => {}
            other => {
                // Keep the shown candidate and handle the key as usual.
                self.redraw(s, Redraw::Full);
                return self.edit(s, other);
            }
        }
        s.mode = Mode::Complete(state);
        self.redraw(s, Redraw::Full);
        None
    }

    fn start_completion(&self, s: &mut Session) {
        let Some(completer) = self.completer.as_deref() else {
            s.bell();
            return;
        };
        let line = s.buf.to_string_lossy();
        match CompletionState::start(completer, &line, s.buf.cursor()) {
            Completion::None => s.bell(),
            Completion::Single(candidate) => {
                s.replace_line(&candidate);
                self.redraw(s, Redraw::Full);
            }
            Completion::Cycle(state) => {
                s.replace_line(state.current());
                s.mode = Mode::Complete(state);
                self.redraw(s, Redraw::Full);
            }
        }
    }

    fn step_history(&mut self, s: &mut Session, step: Step) {
        let current = s.buf.to_string_lossy();
        match s.nav.step(&mut self.history, step, &current) {
            Some(text) => {
                s.replace_line(&text);
                self.redraw(s, Redraw::Diff);
            }
            None => s.bell(),
        }
    }

    fn insert(&self, s: &mut Session, bytes: &[u8]) {
        match s.buf.insert_at_cursor(bytes) {
            Ok(_) => self.redraw(s, Redraw::Diff),
            Err(err) => {
                debug!(target: "input", %err, "insert rejected");
                s.bell();
            }
        }
    }

    fn edit(&mut self, s: &mut Session, event: KeyEvent) -> Option<ReadOutcome> {
        let word = Modifiers::CTRL | Modifiers::ALT;
        let changed = match event {
            KeyEvent::Char(unit) => {
                self.insert(s, unit.as_bytes());
                return None;
            }
            KeyEvent::Control(control) => match control {
                Control::Enter => {
                    let line = s.buf.to_string_lossy();
                    self.finish(s);
                    return Some(ReadOutcome::Line(line));
                }
                Control::Tab => {
                    self.start_completion(s);
                    return None;
                }
                Control::Backspace => s.buf.delete_before_cursor(),
                Control::Ctrl('c') => {
                    self.finish(s);
                    return Some(ReadOutcome::Interrupted);
                }
                Control::Ctrl('d') => {
                    if s.buf.is_empty() {
                        self.finish(s);
                        return Some(ReadOutcome::Eof);
                    }
                    s.buf.delete_at_cursor()
                }
                Control::Ctrl('a') => s.buf.move_home(),
                Control::Ctrl('e') => s.buf.move_end(),
                Control::Ctrl('b') => s.buf.move_left(),
                Control::Ctrl('f') => s.buf.move_right(),
                Control::Ctrl('p') => {
                    self.step_history(s, Step::Older);
                    return None;
                }
                Control::Ctrl('n') => {
                    self.step_history(s, Step::Newer);
                    return None;
                }
                Control::Ctrl('t') => s.buf.transpose(),
                Control::Ctrl('k') => s.buf.delete_to_end(),
                Control::Ctrl('u') => s.buf.delete_to_start(),
                Control::Ctrl('w') => s.buf.delete_word_before_cursor(),
                Control::Ctrl('l') => {
                    self.redraw(s, Redraw::Clear);
                    return None;
                }
                Control::Ctrl('r') => {
                    let state = SearchState::begin(s.buf.to_string_lossy(), s.buf.cursor());
                    s.mode = Mode::Search(state);
                    self.redraw(s, Redraw::Full);
                    return None;
                }
                Control::Ctrl(_) => false,
            },
            KeyEvent::Arrow(direction, mods) => match direction {
                Direction::Up => {
                    self.step_history(s, Step::Older);
                    return None;
                }
                Direction::Down => {
                    self.step_history(s, Step::Newer);
                    return None;
                }
                Direction::Left if mods.intersects(word) => s.buf.move_word_left(),
                Direction::Right if mods.intersects(word) => s.buf.move_word_right(),
                Direction::Left => s.buf.move_left(),
                Direction::Right => s.buf.move_right(),
            },
            KeyEvent::Extended(key, mods) => match key {
                Extended::Home => s.buf.move_home(),
                Extended::End => s.buf.move_end(),
                Extended::Delete => s.buf.delete_at_cursor(),
                Extended::Char('b') if mods.contains(Modifiers::ALT) => s.buf.move_word_left(),
                Extended::Char('f') if mods.contains(Modifiers::ALT) => s.buf.move_word_right(),
                Extended::Char('\x7f') if mods.contains(Modifiers::ALT) => {
                    s.buf.delete_word_before_cursor()
                }
                _ => false,
            },
            KeyEvent::Function(_) | KeyEvent::Timeout | KeyEvent::Incomplete | KeyEvent::Error(_) => false,
        };
        if changed {
            self.redraw(s, Redraw::Diff);
        }
        None
    }
}

fn flush(out: &mut OutputBuffer, mut output: &mut dyn Write) {
    if out.is_empty() {
        return;
    }
    if let Err(err) = out.flush_to(&mut output) {
        debug!(target: "refresh", %err, "write failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
