// SPDX-License-Identifier: MIT
//
// Terminal control: raw mode, size queries, signals, RAII cleanup.
//
// Safety: This module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, sigaction, and raw fd writes.
// These are the standard POSIX interfaces for terminal control; there is
// no safe alternative. Each unsafe block is minimal.
#![allow(unsafe_code)]
//
// A line editor borrows the terminal for the duration of one `read_line`.
// It enters raw mode (no echo, no canonical line discipline, no signal
// keys) and must give the terminal back exactly as it found it, even if
// the process panics mid-redraw. `RawMode` is the guard; the panic hook
// restores termios from a global backup and writes a short reset sequence
// directly to fd 1, bypassing the stdout lock.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::ansi;
use crate::reader::{ByteSource, ReadStatus};

/// Width assumed when every query fails.
pub const DEFAULT_COLUMNS: u16 = 80;

/// `TERM` values whose terminals cannot handle the escapes we emit.
const UNSUPPORTED_TERMS: &[&str] = &["dumb", "cons25", "emacs"];

/// How long to wait for a cursor position report.
const CURSOR_REPORT_TIMEOUT: Duration = Duration::from_millis(200);

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Number of columns (width in character cells).
    pub cols: u16,
    /// Number of rows (height in character cells).
    pub rows: u16,
}

// ─── Terminal Queries ───────────────────────────────────────────────────────

/// Query the terminal size of `fd` via `ioctl(TIOCGWINSZ)`.
///
/// Returns `None` if `fd` is not a terminal or reports zero columns.
#[cfg(unix)]
#[must_use]
pub fn get_size(fd: i32) -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 {
        Some(Size {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
    } else {
        None
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn get_size(_fd: i32) -> Option<Size> {
    None
}

/// Check whether `fd` is connected to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty(fd: i32) -> bool {
    unsafe { libc::isatty(fd) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty(_fd: i32) -> bool {
    false
}

/// Whether a `TERM` value names a terminal too limited for line editing.
#[must_use]
pub fn is_unsupported_term(term: Option<&str>) -> bool {
    term.is_some_and(|t| UNSUPPORTED_TERMS.iter().any(|u| t.eq_ignore_ascii_case(u)))
}

/// Ask the terminal where the cursor is, via `ESC [ 6 n`.
///
/// Reads the reply from `input` until `R` or the timeout. Any other bytes
/// that arrive in between are lost, which is acceptable for a one-off
/// query made before editing starts.
///
/// # Errors
///
/// Propagates write failures and read errors.
pub fn cursor_position(
    input: &mut dyn ByteSource,
    output: &mut dyn Write,
) -> io::Result<Option<(u16, u16)>> {
    let mut out = Vec::with_capacity(4);
    ansi::request_cursor_position(&mut out)?;
    output.write_all(&out)?;
    output.flush()?;

    let deadline = Instant::now() + CURSOR_REPORT_TIMEOUT;
    let mut reply = Vec::with_capacity(16);
    let mut byte = [0u8; 1];
    while reply.len() < 32 {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match input.read_timeout(&mut byte, Some(deadline - now))? {
            ReadStatus::Data(_) => {
                reply.push(byte[0]);
                if byte[0] == b'R' {
                    break;
                }
            }
            ReadStatus::Interrupted => {}
            ReadStatus::TimedOut | ReadStatus::Eof => break,
        }
    }
    Ok(ansi::parse_cursor_report(&reply))
}

/// Measure the width by pushing the cursor to the right margin and asking
/// where it ended up, then moving it back.
///
/// # Errors
///
/// Propagates I/O errors from the query.
pub fn columns_from_cursor_report(
    input: &mut dyn ByteSource,
    output: &mut dyn Write,
) -> io::Result<Option<u16>> {
    let Some((_, start)) = cursor_position(input, output)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(8);
    ansi::cursor_far_right(&mut out)?;
    output.write_all(&out)?;
    let Some((_, cols)) = cursor_position(input, output)? else {
        return Ok(None);
    };
    if cols > start {
        let mut out = Vec::with_capacity(8);
        ansi::cursor_back(&mut out, usize::from(cols - start))?;
        output.write_all(&out)?;
        output.flush()?;
    }
    Ok(Some(cols))
}

/// Terminal width in columns: `TIOCGWINSZ` on `fd`, then the cursor
/// report, then [`DEFAULT_COLUMNS`].
pub fn columns(fd: i32, input: &mut dyn ByteSource, output: &mut dyn Write) -> u16 {
    if let Some(size) = get_size(fd) {
        return size.cols;
    }
    match columns_from_cursor_report(input, output) {
        Ok(Some(cols)) if cols > 0 => cols,
        Ok(_) => DEFAULT_COLUMNS,
        Err(err) => {
            debug!(target: "runtime", %err, "cursor_report_failed");
            DEFAULT_COLUMNS
        }
    }
}

// ─── SIGWINCH ────────────────────────────────────────────────────────────────

/// Global flag set by the SIGWINCH handler.
static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);

static SIGWINCH_INSTALLED: Once = Once::new();

/// Install a signal handler for SIGWINCH (terminal resize).
///
/// The handler only sets an atomic flag, which is async-signal-safe.
/// `SA_RESTART` is deliberately left out so a blocked `poll` returns EINTR
/// and the editor redraws right away.
#[cfg(unix)]
pub fn install_resize_handler() {
    SIGWINCH_INSTALLED.call_once(|| unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigwinch_handler as *const () as usize;
        sa.sa_flags = 0;
        libc::sigemptyset(&raw mut sa.sa_mask);
        libc::sigaction(libc::SIGWINCH, &raw const sa, std::ptr::null_mut());
    });
}

#[cfg(not(unix))]
pub fn install_resize_handler() {
    SIGWINCH_INSTALLED.call_once(|| {});
}

#[cfg(unix)]
extern "C" fn sigwinch_handler(_sig: libc::c_int) {
    SIGWINCH_RECEIVED.store(true, Ordering::Relaxed);
}

/// Consume the resize flag. Returns whether a resize arrived since the
/// last call.
pub fn take_resize() -> bool {
    SIGWINCH_RECEIVED.swap(false, Ordering::Relaxed)
}

// ─── SIGINT ──────────────────────────────────────────────────────────────────

static SIGINT_INSTALLED: Once = Once::new();

/// Keep the shell alive across Ctrl-C while a child owns the terminal.
///
/// A no-op handler rather than `SIG_IGN`: caught signals revert to their
/// default on `exec`, ignored ones would be inherited by every child.
/// In raw mode ISIG is off and Ctrl-C arrives as a byte instead.
#[cfg(unix)]
pub fn install_interrupt_handler() {
    SIGINT_INSTALLED.call_once(|| unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigint_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&raw mut sa.sa_mask);
        libc::sigaction(libc::SIGINT, &raw const sa, std::ptr::null_mut());
    });
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {
    SIGINT_INSTALLED.call_once(|| {});
}

#[cfg(unix)]
extern "C" fn sigint_handler(_sig: libc::c_int) {}

// ─── Panic-Safe Terminal Restore ────────────────────────────────────────────

/// Global backup of original termios for panic recovery.
///
/// [`RawMode`] owns its own copy, but the panic hook can't reach it. This
/// global backup, behind a [`Mutex`] rather than `static mut`, lets the
/// hook restore cooked mode without the guard.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<(i32, libc::termios)>> = Mutex::new(None);

/// Restore termios from the global backup. Best-effort, ignores errors.
#[cfg(unix)]
fn restore_termios_from_backup() {
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some((fd, ref original)) = *guard {
            unsafe {
                let _ = libc::tcsetattr(fd, libc::TCSANOW, original);
            }
        }
    }
}

/// Restore sequence for emergency use: reset SGR attributes and start a
/// fresh line so the panic message is readable.
const EMERGENCY_RESTORE: &[u8] = b"\x1b[0m\r\n";

/// Panic hook guard, so the hook is installed at most once per process.
static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Install a panic hook that restores the terminal before printing the error.
///
/// Without this, a panic in raw mode leaves the user's terminal broken:
/// no echo, no line discipline, no way to read the error message.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            #[cfg(unix)]
            {
                let active = TERMIOS_BACKUP.lock().map(|g| g.is_some()).unwrap_or(false);
                if active {
                    emergency_restore();
                    restore_termios_from_backup();
                }
            }

            original(info);
        }));
    });
}

/// Write the restore sequence directly to stdout's file descriptor.
///
/// Bypasses Rust's `io::stdout()` lock to avoid deadlocking if the panic
/// occurred while the lock was held (e.g., mid-refresh flush).
#[cfg(unix)]
fn emergency_restore() {
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }
}

// ─── RawMode ────────────────────────────────────────────────────────────────

/// Raw-mode guard. The original termios is restored on drop.
///
/// # Example
///
/// ```no_run
/// use n_term::terminal::RawMode;
///
/// let raw = RawMode::enable(0)?;
/// // ... read keys, redraw ...
/// drop(raw); // cooked mode again
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct RawMode {
    fd: i32,
    #[cfg(unix)]
    original: Option<libc::termios>,
}

impl RawMode {
    /// Put `fd` into raw mode.
    ///
    /// A no-op guard is returned when `fd` is not a terminal, so callers
    /// can enable unconditionally.
    ///
    /// # Errors
    ///
    /// Returns the OS error if termios cannot be read or written.
    #[cfg(unix)]
    pub fn enable(fd: i32) -> io::Result<Self> {
        install_panic_hook();

        if !is_tty(fd) {
            return Ok(Self { fd, original: None });
        }

        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            let original = termios;

            // No break-to-SIGINT, no CR-to-NL, no parity check, no 8th-bit
            // strip, no XON/XOFF.
            termios.c_iflag &=
                !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
            // No output post-processing: "\n" must be written as "\r\n".
            termios.c_oflag &= !libc::OPOST;
            termios.c_cflag |= libc::CS8;
            // No echo, no canonical mode, no extended functions, no signal
            // keys (Ctrl-C and Ctrl-Z arrive as bytes).
            termios.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
            // VMIN=1, VTIME=0: read() returns as soon as one byte is available.
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some((fd, original));
            }

            Ok(Self {
                fd,
                original: Some(original),
            })
        }
    }

    #[cfg(not(unix))]
    pub fn enable(fd: i32) -> io::Result<Self> {
        install_panic_hook();
        Ok(Self { fd })
    }

    /// Whether raw mode is actually in effect.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.original.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// The descriptor this guard controls.
    #[must_use]
    pub const fn fd(&self) -> i32 {
        self.fd
    }

    /// Restore the original mode now. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the OS error if termios cannot be written.
    #[cfg(unix)]
    pub fn disable(&mut self) -> io::Result<()> {
        if let Some(ref original) = self.original {
            unsafe {
                if libc::tcsetattr(self.fd, libc::TCSAFLUSH, original) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = None;
            }

            self.original = None;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn disable(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(err) = self.disable() {
            debug!(target: "runtime", %err, "raw_mode_restore_failed");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
