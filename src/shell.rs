// SPDX-License-Identifier: MIT
//
// Running a submitted line.
//
// Three builtins change the shell itself and so cannot run in a child:
// `cd`, `exit` and `history`. Everything else is handed verbatim to
// `sh -c`, which does the parsing, expansion, pipes and redirection.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use n_line::MemoryHistory;
use tracing::{debug, warn};

pub struct Builtin {
    pub name: &'static str,
    /// Argument synopsis shown as a hint, with a leading space.
    pub usage: &'static str,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "cd",
        usage: " <directory>",
    },
    Builtin {
        name: "exit",
        usage: " [status]",
    },
    Builtin {
        name: "history",
        usage: "",
    },
];

/// What the read loop does after a line ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

#[derive(Debug, Default)]
pub struct Shell {
    last_status: i32,
    previous_dir: Option<PathBuf>,
}

impl Shell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit status of the last command.
    pub const fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Run `line`. Builtin output goes to `out`, diagnostics to `err`.
    pub fn execute(
        &mut self,
        line: &str,
        history: &MemoryHistory,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Flow {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Flow::Continue;
        };
        let args: Vec<&str> = words.collect();
        let status = match command {
            "cd" => self.cd(&args, err),
            "exit" => {
                let code = match args.first() {
                    Some(arg) => match arg.parse() {
                        Ok(code) => code,
                        Err(_) => {
                            let _ = writeln!(err, "exit: {arg}: numeric argument required");
                            2
                        }
                    },
                    None => self.last_status,
                };
                return Flow::Exit(code);
            }
            "history" => show_history(history, out),
            _ => run_external(line, err),
        };
        self.last_status = status;
        Flow::Continue
    }

    fn cd(&mut self, args: &[&str], err: &mut dyn Write) -> i32 {
        let target = match args {
            [] => match dirs::home_dir() {
                Some(home) => home,
                None => {
                    let _ = writeln!(err, "cd: no home directory");
                    return 1;
                }
            },
            ["-"] => match self.previous_dir.clone() {
                Some(dir) => dir,
                None => {
                    let _ = writeln!(err, "cd: no previous directory");
                    return 1;
                }
            },
            [dir] => PathBuf::from(dir),
            _ => {
                let _ = writeln!(err, "cd: too many arguments");
                return 1;
            }
        };
        let current = env::current_dir().ok();
        match env::set_current_dir(&target) {
            Ok(()) => {
                debug!(target: "runtime", dir = %target.display(), "cd");
                self.previous_dir = current;
                0
            }
            Err(e) => {
                let _ = writeln!(err, "cd: {}: {e}", target.display());
                1
            }
        }
    }
}

fn show_history(history: &MemoryHistory, out: &mut dyn Write) -> i32 {
    let result: io::Result<()> = history
        .iter()
        .enumerate()
        .try_for_each(|(i, entry)| writeln!(out, "{:>5}  {entry}", i + 1));
    i32::from(result.is_err())
}

fn run_external(line: &str, err: &mut dyn Write) -> i32 {
    match Command::new("sh").arg("-c").arg(line).status() {
        Ok(status) => {
            let code = status.code().unwrap_or_else(|| signal_status(status));
            debug!(target: "runtime", code, "command finished");
            code
        }
        Err(e) => {
            warn!(target: "runtime", %e, "failed to spawn sh");
            let _ = writeln!(err, "n-shell: {e}");
            127
        }
    }
}

/// Status for a child killed by a signal, numbered the way sh does.
#[cfg(unix)]
fn signal_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(1, |sig| 128 + sig)
}

#[cfg(not(unix))]
fn signal_status(_status: ExitStatus) -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use n_line::HistoryStore;
    use pretty_assertions::assert_eq;

    fn run(shell: &mut Shell, line: &str) -> (Flow, String, String) {
        let history = MemoryHistory::new(10);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let flow = shell.execute(line, &history, &mut out, &mut err);
        (
            flow,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn blank_line_does_nothing() {
        let mut shell = Shell::new();
        assert_eq!(run(&mut shell, "   ").0, Flow::Continue);
    }

    #[test]
    fn exit_uses_argument_or_last_status() {
        let mut shell = Shell::new();
        assert_eq!(run(&mut shell, "exit 3").0, Flow::Exit(3));
        assert_eq!(run(&mut shell, "exit").0, Flow::Exit(0));
        let (flow, _, err) = run(&mut shell, "exit x");
        assert_eq!(flow, Flow::Exit(2));
        assert!(err.contains("numeric argument required"));
    }

    #[test]
    fn history_lists_entries_numbered() {
        let mut history = MemoryHistory::new(10);
        history.add("ls");
        history.add("make test");
        let mut out = Vec::new();
        let flow = Shell::new().execute("history", &history, &mut out, &mut io::sink());
        assert_eq!(flow, Flow::Continue);
        assert_eq!(String::from_utf8(out).unwrap(), "    1  ls\n    2  make test\n");
    }

    #[test]
    fn cd_errors_are_reported() {
        let mut shell = Shell::new();
        let (_, _, err) = run(&mut shell, "cd /definitely/not/here");
        assert!(err.starts_with("cd: /definitely/not/here"));
        assert_eq!(shell.last_status(), 1);
        let (_, _, err) = run(&mut shell, "cd a b");
        assert_eq!(err, "cd: too many arguments\n");
        let (_, _, err) = run(&mut shell, "cd -");
        assert_eq!(err, "cd: no previous directory\n");
    }

    #[cfg(unix)]
    #[test]
    fn external_status_is_recorded() {
        let mut shell = Shell::new();
        run(&mut shell, "false || (exit 4)");
        assert_eq!(shell.last_status(), 4);
        run(&mut shell, "true");
        assert_eq!(shell.last_status(), 0);
    }
}
