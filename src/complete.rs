// SPDX-License-Identifier: MIT
//
// Tab completion and usage hints for the shell.
//
// The editor hands over the whole line and expects whole replacement
// lines back. Only the last word is completed: builtins when it is also
// the first word, file names always. Directories get a trailing `/` so a
// second Tab descends into them.

use std::fs;
use std::path::Path;

use n_line::Hint;

use crate::shell::BUILTINS;

/// ANSI bright black, for hints.
const HINT_COLOR: u8 = 90;

/// Candidates for `line`, relative to the current directory.
pub fn complete(line: &str) -> Vec<String> {
    complete_in(Path::new("."), line)
}

/// Candidates for `line`, resolving relative paths against `base`.
pub fn complete_in(base: &Path, line: &str) -> Vec<String> {
    let start = line.rfind(char::is_whitespace).map_or(0, |i| i + 1);
    let (head, word) = line.split_at(start);

    let mut words = Vec::new();
    if head.trim().is_empty() {
        words.extend(
            BUILTINS
                .iter()
                .filter(|b| b.name.starts_with(word))
                .map(|b| b.name.to_string()),
        );
    }
    words.extend(file_names(base, word));
    words.dedup();
    words.into_iter().map(|w| format!("{head}{w}")).collect()
}

/// Entries of the directory named by `word` up to its last `/`, whose names
/// start with the rest of `word`. Hidden entries only for a `.` prefix.
fn file_names(base: &Path, word: &str) -> Vec<String> {
    let (dir, prefix) = word.rfind('/').map_or(("", word), |i| word.split_at(i + 1));
    let listing = if dir.is_empty() {
        base.to_path_buf()
    } else if Path::new(dir).is_absolute() {
        Path::new(dir).to_path_buf()
    } else {
        base.join(dir)
    };
    let Ok(entries) = fs::read_dir(&listing) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(prefix) || (name.starts_with('.') && !prefix.starts_with('.')) {
                return None;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            Some(if is_dir {
                format!("{dir}{name}/")
            } else {
                format!("{dir}{name}")
            })
        })
        .collect();
    names.sort();
    names
}

/// Usage of a builtin typed without arguments.
pub fn hint(line: &str) -> Option<Hint> {
    let name = line.trim_end();
    let builtin = BUILTINS.iter().find(|b| b.name == name && !b.usage.is_empty())?;
    let text = if line.ends_with(' ') {
        builtin.usage.trim_start()
    } else {
        builtin.usage
    };
    Some(Hint::new(text).with_color(HINT_COLOR))
}
