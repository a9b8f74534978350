//! n-line: the line-editing engine behind n-shell.
//!
//! Layered leaf-first:
//!
//! - [`line`]: the byte buffer and cursor, unit-aware through the
//!   terminal layer's `UnitAdapter`;
//! - [`refresh`]: turns buffer state into minimal terminal output;
//! - [`history`], [`search`] and [`completion`]: sub-modes and their
//!   collaborator traits;
//! - [`editor`]: the session loop that decodes keys and drives the rest.
//!
//! Nothing here owns a global. An [`Editor`] is a plain value and each
//! `read_line` call builds its own session state.

pub mod completion;
pub mod editor;
pub mod error;
pub mod history;
pub mod line;
pub mod options;
pub mod refresh;
pub mod search;

pub use completion::{Completer, Hint, Hinter};
pub use editor::{Editor, ReadOutcome};
pub use error::{EditError, LineError};
pub use history::{HistoryStore, MemoryHistory};
pub use line::LineBuffer;
pub use options::EditorOptions;
