// SPDX-License-Identifier: MIT
//
// Configuration file: `n-shell.toml`.
//
// Discovery prefers `./n-shell.toml`, then `<config dir>/n-shell/n-shell.toml`.
// A missing or malformed file is not an error: the shell starts with
// defaults and says why in the log. Command-line flags are applied on top
// by the caller.
//
//   [editor]                # n_line::EditorOptions
//   multi_line = false
//   escape_timeout_ms = 50
//
//   [prompt]
//   text = "$ "
//   git = true
//   git_timeout_ms = 500
//   refresh_ms = 100

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use n_line::EditorOptions;
use serde::Deserialize;
use tracing::{info, warn};

const FILE_NAME: &str = "n-shell.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub editor: EditorOptions,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    /// Prompt shown after the git segment. May contain newlines and ANSI.
    pub text: String,
    /// Show the repository segment.
    pub git: bool,
    /// Budget for one `git status` run.
    pub git_timeout_ms: u64,
    /// How often an idle prompt looks for a finished git lookup.
    pub refresh_ms: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            text: "$ ".to_string(),
            git: true,
            git_timeout_ms: 500,
            refresh_ms: 100,
        }
    }
}

impl PromptConfig {
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// Where the config file is looked for when no path is given.
pub fn discover() -> PathBuf {
    let local = PathBuf::from(FILE_NAME);
    if local.exists() {
        return local;
    }
    dirs::config_dir().map_or(local, |dir| dir.join("n-shell").join(FILE_NAME))
}

/// Load `path`, or the discovered file. Never fails.
pub fn load(path: Option<&Path>) -> Config {
    let path = path.map_or_else(discover, Path::to_path_buf);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            info!(target: "runtime", path = %path.display(), %err, "no config file, using defaults");
            return Config::default();
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(config) => {
            info!(target: "runtime", path = %path.display(), "config loaded");
            config
        }
        Err(err) => {
            warn!(target: "runtime", path = %path.display(), %err, "malformed config, using defaults");
            Config::default()
        }
    }
}
