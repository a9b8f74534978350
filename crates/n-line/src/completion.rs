//! Tab completion and inline hints.
//!
//! Both are collaborator traits: the editor asks, the shell answers.
//! Closures implement them directly, so a one-off completer is just
//! `|line: &str| vec![...]`.

use tracing::debug;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Source of completion candidates. Each candidate is a whole replacement
/// line, not a suffix.
pub trait Completer {
    fn complete(&self, line: &str) -> Vec<String>;
}

impl<F> Completer for F
where
    F: Fn(&str) -> Vec<String>,
{
    fn complete(&self, line: &str) -> Vec<String> {
        self(line)
    }
}

/// Text drawn to the right of the cursor, in a dimmed or colored style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub text: String,
    /// ANSI foreground color code (30-37, 90-97).
    pub color: Option<u8>,
    pub bold: bool,
}

impl Hint {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: u8) -> Self {
        self.color = Some(color);
        self
    }

    #[must_use]
    pub fn with_bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

/// Source of hints for the line being edited.
pub trait Hinter {
    fn hint(&self, line: &str) -> Option<Hint>;
}

impl<F> Hinter for F
where
    F: Fn(&str) -> Option<Hint>,
{
    fn hint(&self, line: &str) -> Option<Hint> {
        self(line)
    }
}

// ---------------------------------------------------------------------------
// Completion state
// ---------------------------------------------------------------------------

/// What pressing Tab on a line produced.
#[derive(Debug)]
pub enum Completion {
    /// No candidates.
    None,
    /// Exactly one candidate: replace the line, no menu.
    Single(String),
    /// Several candidates: cycle through them.
    Cycle(CompletionState),
}

/// Cycling through several candidates. The first one is shown on entry.
#[derive(Debug, Clone)]
pub struct CompletionState {
    candidates: Vec<String>,
    selected: usize,
    saved_line: String,
    saved_cursor: usize,
}

impl CompletionState {
    /// Ask `completer` about `line` and decide how to proceed.
    pub fn start(completer: &dyn Completer, line: &str, cursor: usize) -> Completion {
        let mut candidates = completer.complete(line);
        debug!(target: "input", count = candidates.len(), "completion");
        match candidates.len() {
            0 => Completion::None,
            1 => Completion::Single(candidates.swap_remove(0)),
            _ => Completion::Cycle(Self {
                candidates,
                selected: 0,
                saved_line: line.to_owned(),
                saved_cursor: cursor,
            }),
        }
    }

    /// The candidate on screen.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.candidates[self.selected]
    }

    #[must_use]
    pub const fn selected(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Advance to the next candidate, wrapping.
    pub fn next(&mut self) -> &str {
        self.selected = (self.selected + 1) % self.candidates.len();
        self.current()
    }

    /// Step back to the previous candidate, wrapping.
    pub fn prev(&mut self) -> &str {
        self.selected = self
            .selected
            .checked_sub(1)
            .unwrap_or(self.candidates.len() - 1);
        self.current()
    }

    /// The line and cursor before completion began.
    #[must_use]
    pub fn saved(&self) -> (&str, usize) {
        (&self.saved_line, self.saved_cursor)
    }

    /// The `[i/n]` marker shown in the hint slot while cycling.
    #[must_use]
    pub fn indicator(&self) -> Hint {
        Hint::new(format!(" [{}/{}]", self.selected + 1, self.candidates.len())).with_color(90)
    }
}
