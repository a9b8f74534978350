// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Foreground byte source: blocking reads with a deadline.
//
// The editor's only suspension point is the terminal read. It must wake up
// for three reasons besides data: the escape-sequence deadline, an idle
// tick for prompt refresh, and SIGWINCH. `poll(2)` on the input descriptor
// covers all three without a reader thread: a finite timeout for the first
// two, and EINTR for the signal.
//
// `ByteSource` is the seam. `FdSource` is the real terminal; `ScriptedSource`
// replays canned chunks so the whole editor can be driven from a test.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

/// Byte chunk read from the terminal per call.
///
/// A single keypress is 1-6 bytes, a paste can be kilobytes. 4 KB handles
/// both without waste.
pub const READ_BUF_SIZE: usize = 4096;

/// Outcome of one [`ByteSource::read_timeout`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were placed at the front of the buffer (`n > 0`).
    Data(usize),
    /// The timeout elapsed with nothing to read.
    TimedOut,
    /// End of input.
    Eof,
    /// A signal interrupted the wait. Check the resize flag and retry.
    Interrupted,
}

/// A source of raw terminal bytes that can wait with a deadline.
pub trait ByteSource {
    /// Wait at most `timeout` (forever when `None`) for input, then read
    /// whatever is available into `buf`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error for anything other than a timeout,
    /// end of input, or an interrupting signal.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadStatus>;
}

// ─── FdSource ────────────────────────────────────────────────────────────────

/// A file descriptor read through `poll(2)` + `read(2)`.
#[derive(Debug, Clone, Copy)]
pub struct FdSource {
    fd: i32,
}

impl FdSource {
    /// Standard input.
    #[must_use]
    pub const fn stdin() -> Self {
        Self { fd: 0 }
    }

    /// Wrap an arbitrary descriptor. The caller keeps ownership.
    #[must_use]
    pub const fn from_raw_fd(fd: i32) -> Self {
        Self { fd }
    }

    /// The wrapped descriptor.
    #[must_use]
    pub const fn fd(&self) -> i32 {
        self.fd
    }
}

/// Convert a timeout to poll's millisecond argument, rounding up so a
/// sub-millisecond deadline still waits rather than spinning.
#[cfg(unix)]
fn poll_millis(timeout: Option<Duration>) -> i32 {
    timeout.map_or(-1, |t| {
        let ms = t.as_micros().div_ceil(1000);
        i32::try_from(ms).unwrap_or(i32::MAX)
    })
}

#[cfg(unix)]
impl ByteSource for FdSource {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadStatus> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&raw mut pfd, 1, poll_millis(timeout)) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::Interrupted {
                Ok(ReadStatus::Interrupted)
            } else {
                Err(err)
            };
        }
        if ready == 0 {
            return Ok(ReadStatus::TimedOut);
        }
        match self.read(buf) {
            Ok(0) => Ok(ReadStatus::Eof),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadStatus::Interrupted),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
impl Read for FdSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        #[allow(clippy::cast_sign_loss)] // n >= 0 checked above.
        Ok(n as usize)
    }
}

/// Non-unix fallback: plain blocking reads, timeouts are never reported.
#[cfg(not(unix))]
impl ByteSource for FdSource {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<ReadStatus> {
        match self.read(buf)? {
            0 => Ok(ReadStatus::Eof),
            n => Ok(ReadStatus::Data(n)),
        }
    }
}

#[cfg(not(unix))]
impl Read for FdSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::stdin().lock().read(buf)
    }
}

// ─── ScriptedSource ──────────────────────────────────────────────────────────

/// One step of a scripted input session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Delivered as a single read.
    Bytes(Vec<u8>),
    /// The next read times out (the user paused).
    Pause,
    /// The next read is interrupted (a resize arrived).
    Signal,
}

/// Replays a fixed script, then reports end of input.
///
/// Chunks larger than the caller's buffer are split across reads.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: VecDeque<Script>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = Script>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// A script where every chunk is one read and no pauses happen.
    #[must_use]
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::new(chunks.into_iter().map(|c| Script::Bytes(c.as_ref().to_vec())))
    }

    /// Append a step.
    pub fn push(&mut self, step: Script) {
        self.steps.push_back(step);
    }

    /// Steps not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl ByteSource for ScriptedSource {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadStatus> {
        match self.steps.pop_front() {
            None => Ok(ReadStatus::Eof),
            Some(Script::Pause) => {
                if timeout.is_some() {
                    Ok(ReadStatus::TimedOut)
                } else {
                    // Nobody is waiting for a deadline; skip the pause.
                    self.read_timeout(buf, timeout)
                }
            }
            Some(Script::Signal) => Ok(ReadStatus::Interrupted),
            Some(Script::Bytes(mut bytes)) => {
                if bytes.is_empty() {
                    return self.read_timeout(buf, timeout);
                }
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Script::Bytes(bytes.split_off(n)));
                }
                Ok(ReadStatus::Data(n))
            }
        }
    }
}

impl Read for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.read_timeout(buf, None)? {
                ReadStatus::Data(n) => return Ok(n),
                ReadStatus::Eof => return Ok(0),
                ReadStatus::TimedOut | ReadStatus::Interrupted => {}
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
