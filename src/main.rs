// SPDX-License-Identifier: MIT
//
// n-shell: an interactive shell built around the n-line editor.
//
// This binary wires the crates together:
//
//   n-term   → raw mode, key decoding, terminal width, signals
//   n-line   → the line editor: buffer, refresh, history, search, completion
//   n-worker → the background thread that runs `git status` for the prompt
//
// One iteration of the read loop:
//
//   prompt.refresh → worker (git status, off-thread)
//   editor.read_line ─┬─ keystrokes → edit → redraw
//                     └─ idle tick  → prompt.poll → redraw with new segment
//   shell.execute → builtin, or `sh -c <line>`
//
// Logs go to `<cache dir>/n-shell/n-shell.log`, never to the terminal the
// editor is drawing on. `N_SHELL_LOG` takes an `EnvFilter` directive.

mod complete;
mod config;
mod history_file;
mod prompt;
mod shell;

use std::cell::RefCell;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use n_line::{Editor, EditorOptions, HistoryStore, ReadOutcome};
use n_term::terminal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::prompt::PromptState;
use crate::shell::{Flow, Shell};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "N_SHELL_LOG";

#[derive(Parser, Debug, Default)]
#[command(name = "n-shell", version, about = "An interactive shell with a fast line editor")]
struct Args {
    /// Prompt text (overrides `[prompt] text`).
    #[arg(long)]
    prompt: Option<String>,
    /// Wrap long lines over several rows instead of scrolling.
    #[arg(long)]
    multi_line: bool,
    /// Echo `*` for every character typed.
    #[arg(long)]
    mask: bool,
    /// History file (default: `<data dir>/n-shell/history`).
    #[arg(long)]
    history: Option<PathBuf>,
    /// Configuration file (overrides discovery of `n-shell.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Treat input as UTF-8 text.
    #[arg(long, conflicts_with = "bytes")]
    utf8: bool,
    /// Treat every byte as one character.
    #[arg(long)]
    bytes: bool,
    /// Print the key events decoded from the terminal, until Ctrl-C.
    #[arg(long)]
    keycodes: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = init_logging();
    // The terminal hook first, so the logging hook wraps it and runs first.
    terminal::install_panic_hook();
    install_panic_hook();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!(target: "runtime", error = %format!("{err:#}"), "fatal");
            eprintln!("n-shell: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let config = config::load(args.config.as_deref());
    let mut editor = Editor::new(editor_options(&config, args));

    if args.keycodes {
        editor.print_keycodes().context("key-code mode failed")?;
        return Ok(ExitCode::SUCCESS);
    }

    terminal::install_interrupt_handler();
    let history_path = args.history.clone().or_else(history_file::default_path);
    if let Some(path) = &history_path {
        if let Err(err) = history_file::load(editor.history_mut(), path) {
            warn!(target: "history", path = %path.display(), %err, "history not loaded");
        }
    }
    editor.set_completer(complete::complete);
    editor.set_hinter(complete::hint);

    let text = args.prompt.clone().unwrap_or_else(|| config.prompt.text.clone());
    let prompt = Rc::new(RefCell::new(PromptState::new(text, &config.prompt)));
    if prompt.borrow().has_git() {
        let idle = Rc::clone(&prompt);
        editor.set_prompt_refresh(config.prompt.refresh_interval(), move || {
            let mut p = idle.borrow_mut();
            p.poll().then(|| p.render())
        });
    }
    info!(target: "runtime", options = ?editor.options(), "startup");

    let mut shell = Shell::new();
    let status = loop {
        let text = {
            let mut p = prompt.borrow_mut();
            p.poll();
            if let Ok(dir) = env::current_dir() {
                p.refresh(&dir);
            }
            p.render()
        };
        match editor.read_line(&text).context("reading from the terminal")? {
            ReadOutcome::Line(line) => {
                if !line.trim().is_empty() {
                    editor.history_mut().add(&line);
                }
                let flow = shell.execute(&line, editor.history(), &mut io::stdout(), &mut io::stderr());
                if let Flow::Exit(code) = flow {
                    break code;
                }
            }
            ReadOutcome::Interrupted => {}
            ReadOutcome::Eof => break shell.last_status(),
        }
    };

    if let Some(path) = &history_path {
        history_file::save(editor.history(), path)
            .with_context(|| format!("writing history to {}", path.display()))?;
    }
    info!(target: "runtime", status, "exit");
    Ok(exit_code(status))
}

/// Config-file options with command-line flags applied on top.
fn editor_options(config: &Config, args: &Args) -> EditorOptions {
    let mut options = config.editor.clone();
    if args.multi_line {
        options.multi_line = true;
    }
    if args.mask {
        options.mask = true;
    }
    if args.utf8 {
        options.utf8 = true;
    } else if args.bytes {
        options.utf8 = false;
    }
    options
}

/// Process exit code for a shell status, truncated the way `exit` does.
fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(status_byte(status))
}

fn status_byte(status: i32) -> u8 {
    u8::try_from(status.rem_euclid(256)).unwrap_or(u8::MAX)
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Install the file logger. Returns the guard that flushes it on drop, or
/// `None` when there is nowhere to write.
fn init_logging() -> Option<WorkerGuard> {
    let dir = dirs::cache_dir()?.join("n-shell");
    fs::create_dir_all(&dir).ok()?;
    let appender = tracing_appender::rolling::never(&dir, "n-shell.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            error!(target: "runtime", %info, "panic");
            previous(info);
        }));
    });
}
