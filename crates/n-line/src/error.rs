//! Error types for the line-editing engine.
//!
//! Three tiers, matching how far a failure may travel:
//!
//! - [`LineError`] never leaves the editor: a full buffer rings the bell
//!   and the keystroke is dropped.
//! - Write failures during a redraw are swallowed and logged; nothing can
//!   be done about them mid-line.
//! - [`EditError`] ends the session: the terminal could not be read or
//!   put into raw mode.

use std::io;

use thiserror::Error;

/// A line buffer operation that could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    /// The insert would push the line past its capacity.
    #[error("line is full ({capacity} bytes)")]
    CapacityExceeded { capacity: usize },
}

/// A failure that ends an edit session.
#[derive(Debug, Error)]
pub enum EditError {
    /// Reading the terminal, or toggling raw mode, failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}
