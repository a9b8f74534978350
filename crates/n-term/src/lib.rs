// SPDX-License-Identifier: MIT
//
// n-term: terminal layer for n-shell.
//
// Everything between the tty file descriptor and the line editor: raw
// mode with panic-safe restore, width queries, a byte source that can wait
// with a deadline, a byte-at-a-time key decoder that resolves the Escape
// ambiguity by timeout, and the unit adapter that keeps byte offsets,
// characters and display columns in agreement.
//
// This crate intentionally avoids external TUI frameworks (crossterm,
// termion) in favor of direct terminal control via ANSI escape sequences
// and raw termios. A line editor emits a dozen distinct sequences; every
// one of them is spelled out in `ansi`.

pub mod ansi;
pub mod input;
pub mod output;
pub mod reader;
pub mod terminal;
pub mod unit;
