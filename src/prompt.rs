// SPDX-License-Identifier: MIT
//
// The prompt and its git segment.
//
// Every prompt asks the worker for a fresh `git status` of the working
// directory and draws whatever it knew last. Results arrive on a channel;
// the editor's idle hook polls it and redraws the line when the segment
// changes, so a slow repository never delays a keystroke.
//
//   (main +*? ↑1)  $ _       branch, staged/unstaged/untracked, ahead
//   (@1a2b3c4|REBASING) $ _  detached HEAD mid-rebase

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use n_worker::worker::DEFAULT_CAPACITY;
use n_worker::{GitStatus, Request, RequestId, Response, ResultCode, Worker, WorkerError};
use tracing::{debug, warn};

use crate::config::PromptConfig;

const CLEAN: &str = "\x1b[32m";
const DIRTY: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

struct GitLookup {
    worker: Worker,
    responses: Receiver<Response>,
    timeout: Duration,
    /// Only the newest request's answer is used.
    latest: Option<RequestId>,
    dir: Option<PathBuf>,
}

pub struct PromptState {
    text: String,
    git: Option<GitLookup>,
    status: Option<GitStatus>,
}

impl PromptState {
    /// A prompt showing `text`, with a git segment if the config asks for one
    /// and the worker thread starts.
    pub fn new(text: String, config: &PromptConfig) -> Self {
        let git = if config.git {
            let (mut worker, responses) = Worker::with_channel(DEFAULT_CAPACITY);
            match worker.start() {
                Ok(()) => Some(GitLookup {
                    worker,
                    responses,
                    timeout: config.git_timeout(),
                    latest: None,
                    dir: None,
                }),
                Err(err) => {
                    warn!(target: "runtime", %err, "git prompt disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            text,
            git,
            status: None,
        }
    }

    pub const fn has_git(&self) -> bool {
        self.git.is_some()
    }

    /// Ask for the status of `dir`. Moving to another directory forgets the
    /// old segment at once.
    pub fn refresh(&mut self, dir: &Path) {
        let Some(git) = self.git.as_mut() else {
            return;
        };
        if git.dir.as_deref() != Some(dir) {
            git.dir = Some(dir.to_path_buf());
            self.status = None;
        }
        match git
            .worker
            .submit(Request::git_status(dir).with_timeout(git.timeout))
        {
            Ok(id) => git.latest = Some(id),
            Err(WorkerError::ResourceExhausted { .. }) => {
                debug!(target: "git", "lookups backed up, skipping");
            }
            Err(err) => warn!(target: "git", %err, "submit failed"),
        }
    }

    /// Take finished lookups off the channel. Returns whether the segment
    /// changed.
    pub fn poll(&mut self) -> bool {
        let Some(git) = self.git.as_mut() else {
            return false;
        };
        let mut changed = false;
        loop {
            let response = match git.responses.try_recv() {
                Ok(response) => response,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            if Some(response.id) != git.latest {
                continue;
            }
            let status = match response.code {
                ResultCode::Ok => response.git_status().cloned(),
                ResultCode::Failed | ResultCode::TimedOut => {
                    debug!(target: "git", code = ?response.code, error = ?response.error, "no status");
                    None
                }
            };
            if status != self.status {
                self.status = status;
                changed = true;
            }
        }
        changed
    }

    /// The prompt as drawn. The segment goes at the start of the last line.
    pub fn render(&self) -> String {
        let Some(segment) = self.status.as_ref().and_then(segment) else {
            return self.text.clone();
        };
        match self.text.rfind('\n') {
            Some(i) => format!("{}{segment} {}", &self.text[..=i], &self.text[i + 1..]),
            None => format!("{segment} {}", self.text),
        }
    }
}

/// The colored `(branch flags)` label, or `None` outside a repository.
pub fn segment(status: &GitStatus) -> Option<String> {
    if !status.is_git_repo {
        return None;
    }
    let mut label = match (&status.branch, &status.commit) {
        (Some(branch), _) if !status.detached => branch.clone(),
        (_, Some(commit)) => format!("@{commit}"),
        _ => "?".to_string(),
    };

    let mut flags = String::new();
    for (on, flag) in [
        (status.has_conflicts(), '!'),
        (status.has_staged(), '+'),
        (status.has_unstaged(), '*'),
        (status.has_untracked(), '?'),
    ] {
        if on {
            flags.push(flag);
        }
    }
    if status.ahead > 0 {
        let _ = write!(flags, "↑{}", status.ahead);
    }
    if status.behind > 0 {
        let _ = write!(flags, "↓{}", status.behind);
    }
    if !flags.is_empty() {
        label.push(' ');
        label.push_str(&flags);
    }
    if status.rebasing {
        label.push_str("|REBASING");
    } else if status.merging {
        label.push_str("|MERGING");
    }

    let color = if status.is_dirty() { DIRTY } else { CLEAN };
    Some(format!("{color}({label}){RESET}"))
}
