//! Repository status for the prompt.
//!
//! Detection walks up from the working directory looking for `.git` and
//! never spawns a process, so a plain directory costs a few `stat` calls.
//! Inside a repository one `git status --porcelain=2 --branch` is run under
//! the request's timeout; merge and rebase state come from marker files in
//! the git directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::JobError;

/// How often an exited-but-unreaped child is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Length of the abbreviated commit hash.
const SHORT_HASH: usize = 7;

/// Summary of a working tree. [`Default`] is "not a repository".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub is_git_repo: bool,
    /// Checked-out branch; `None` when detached or outside a repository.
    pub branch: Option<String>,
    /// Abbreviated HEAD commit; `None` before the first commit.
    pub commit: Option<String>,
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
    pub conflicted: usize,
    pub ahead: usize,
    pub behind: usize,
    pub detached: bool,
    pub merging: bool,
    pub rebasing: bool,
}

impl GitStatus {
    #[must_use]
    pub const fn has_staged(&self) -> bool {
        self.staged > 0
    }

    #[must_use]
    pub const fn has_unstaged(&self) -> bool {
        self.unstaged > 0
    }

    #[must_use]
    pub const fn has_untracked(&self) -> bool {
        self.untracked > 0
    }

    #[must_use]
    pub const fn has_conflicts(&self) -> bool {
        self.conflicted > 0
    }

    /// Anything at all differs from HEAD.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.has_staged() || self.has_unstaged() || self.has_untracked() || self.has_conflicts()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// The git directory for `start`, searching `start` and its ancestors.
///
/// Follows `gitdir:` files, which is how worktrees and submodules point at
/// their real git directory.
#[must_use]
pub fn find_git_dir(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    let mut dir = Some(start.as_path());
    while let Some(d) = dir {
        let dot_git = d.join(".git");
        if dot_git.is_dir() {
            return Some(dot_git);
        }
        if dot_git.is_file() {
            return read_gitfile(d, &dot_git);
        }
        dir = d.parent();
    }
    None
}

fn read_gitfile(dir: &Path, file: &Path) -> Option<PathBuf> {
    let text = fs::read_to_string(file).ok()?;
    let target = text.lines().find_map(|l| l.strip_prefix("gitdir:"))?.trim();
    let target = Path::new(target);
    Some(if target.is_absolute() {
        target.to_path_buf()
    } else {
        dir.join(target)
    })
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Summarize the repository containing `dir`.
///
/// # Errors
///
/// [`JobError::Failed`] if `dir` is not a directory or git fails,
/// [`JobError::TimedOut`] if git outlives `timeout` (it is killed).
pub fn status(dir: &Path, timeout: Duration) -> Result<GitStatus, JobError> {
    if !dir.is_dir() {
        return Err(JobError::Failed(format!("{} is not a directory", dir.display())));
    }
    let Some(git_dir) = find_git_dir(dir) else {
        trace!(target: "git", dir = %dir.display(), "not a repository");
        return Ok(GitStatus::default());
    };

    let mut cmd = Command::new("git");
    cmd.args(["status", "--porcelain=2", "--branch"])
        .current_dir(dir)
        .env("GIT_OPTIONAL_LOCKS", "0");
    let text = run_with_timeout(cmd, timeout)?;

    let mut status = parse_porcelain(&text);
    status.is_git_repo = true;
    status.merging = git_dir.join("MERGE_HEAD").exists();
    status.rebasing = git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists();
    debug!(
        target: "git",
        branch = status.branch.as_deref().unwrap_or("-"),
        dirty = status.is_dirty(),
        "status"
    );
    Ok(status)
}

/// Parse `git status --porcelain=2 --branch` output.
///
/// Ordinary (`1`) and renamed (`2`) entries carry an `XY` pair: `X` is the
/// index side, `Y` the worktree side, `.` meaning unchanged.
#[must_use]
pub fn parse_porcelain(text: &str) -> GitStatus {
    let mut status = GitStatus::default();
    for line in text.lines() {
        if let Some(oid) = line.strip_prefix("# branch.oid ") {
            if oid != "(initial)" {
                status.commit = Some(oid.chars().take(SHORT_HASH).collect());
            }
        } else if let Some(head) = line.strip_prefix("# branch.head ") {
            if head == "(detached)" {
                status.detached = true;
            } else {
                status.branch = Some(head.to_string());
            }
        } else if let Some(ab) = line.strip_prefix("# branch.ab ") {
            for part in ab.split_whitespace() {
                if let Some(n) = part.strip_prefix('+') {
                    status.ahead = n.parse().unwrap_or(0);
                } else if let Some(n) = part.strip_prefix('-') {
                    status.behind = n.parse().unwrap_or(0);
                }
            }
        } else if line.starts_with("? ") {
            status.untracked += 1;
        } else if line.starts_with("u ") {
            status.conflicted += 1;
        } else if line.starts_with("1 ") || line.starts_with("2 ") {
            let mut xy = line[2..].chars();
            if xy.next().is_some_and(|x| x != '.') {
                status.staged += 1;
            }
            if xy.next().is_some_and(|y| y != '.') {
                status.unstaged += 1;
            }
        }
    }
    status
}

// ---------------------------------------------------------------------------
// Subprocess
// ---------------------------------------------------------------------------

/// Run `cmd` to completion and return its stdout, killing it once
/// `timeout` has elapsed.
///
/// # Errors
///
/// [`JobError::TimedOut`] on expiry, [`JobError::Failed`] if the command
/// cannot start or exits unsuccessfully.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<String, JobError> {
    let deadline = Instant::now() + timeout;
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| JobError::Failed(format!("failed to run {program}: {e}")))?;

    let out = match read_stdout(&mut child, deadline) {
        Ok(out) => out,
        Err(err) => {
            kill(&mut child);
            return Err(err);
        }
    };
    let status = wait_until(&mut child, deadline)?;
    if !status.success() {
        return Err(JobError::Failed(format!("{program} exited with {status}")));
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Drain the child's stdout, waiting at most until `deadline`.
#[cfg(unix)]
fn read_stdout(child: &mut Child, deadline: Instant) -> Result<Vec<u8>, JobError> {
    use std::os::fd::AsRawFd;

    use n_term::reader::{ByteSource, FdSource, ReadStatus};

    let Some(stdout) = child.stdout.take() else {
        return Ok(Vec::new());
    };
    let mut src = FdSource::from_raw_fd(stdout.as_raw_fd());
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(JobError::TimedOut);
        }
        match src.read_timeout(&mut buf, Some(remaining)) {
            Ok(ReadStatus::Data(n)) => out.extend_from_slice(&buf[..n]),
            Ok(ReadStatus::Eof) => return Ok(out),
            Ok(ReadStatus::TimedOut) => return Err(JobError::TimedOut),
            Ok(ReadStatus::Interrupted) => {}
            Err(e) => return Err(JobError::Failed(format!("reading output: {e}"))),
        }
    }
}

/// Without `poll(2)` the read blocks; the timeout only applies to the exit.
#[cfg(not(unix))]
fn read_stdout(child: &mut Child, _deadline: Instant) -> Result<Vec<u8>, JobError> {
    use std::io::Read;

    let mut out = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_end(&mut out)
            .map_err(|e| JobError::Failed(format!("reading output: {e}")))?;
    }
    Ok(out)
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<ExitStatus, JobError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                kill(child);
                return Err(JobError::TimedOut);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(JobError::Failed(format!("waiting for child: {e}"))),
        }
    }
}

fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(target: "git", %err, "failed to kill child");
    }
    // Reap it so no zombie is left behind.
    let _ = child.wait();
    debug!(target: "git", pid = child.id(), "child killed");
}
