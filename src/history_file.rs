// SPDX-License-Identifier: MIT
//
// History persistence: one entry per line, oldest first.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use n_line::{HistoryStore, MemoryHistory};
use tracing::debug;

/// `<data dir>/n-shell/history`, when the platform has a data dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("n-shell").join("history"))
}

/// Append the entries in `path` to `store`. A missing file loads nothing.
///
/// Returns how many entries the store accepted.
pub fn load(store: &mut impl HistoryStore, path: &Path) -> io::Result<usize> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let added = text.lines().filter(|line| store.add(line)).count();
    debug!(target: "history", path = %path.display(), added, "loaded");
    Ok(added)
}

/// Write every entry of `history` to `path`, creating parent directories.
pub fn save(history: &MemoryHistory, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    for entry in history.iter().filter(|e| !e.contains('\n')) {
        writeln!(out, "{entry}")?;
    }
    out.flush()?;
    debug!(target: "history", path = %path.display(), entries = history.count(), "saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_through_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/history");
        let mut history = MemoryHistory::new(10);
        history.add("ls -la");
        history.add("cd /tmp");
        save(&history, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ls -la\ncd /tmp\n");

        let mut loaded = MemoryHistory::new(10);
        assert_eq!(load(&mut loaded, &path).unwrap(), 2);
        assert_eq!(loaded.iter().collect::<Vec<_>>(), ["ls -la", "cd /tmp"]);
    }

    #[test]
    fn missing_file_loads_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut history = MemoryHistory::new(10);
        assert_eq!(load(&mut history, &tmp.path().join("none")).unwrap(), 0);
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn blank_and_repeated_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history");
        fs::write(&path, "make\nmake\n\ngit status\n").unwrap();
        let mut history = MemoryHistory::new(10);
        assert_eq!(load(&mut history, &path).unwrap(), 2);
    }

    #[test]
    fn load_respects_max_len() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history");
        fs::write(&path, "a\nb\nc\nd\n").unwrap();
        let mut history = MemoryHistory::new(2);
        load(&mut history, &path).unwrap();
        assert_eq!(history.iter().collect::<Vec<_>>(), ["c", "d"]);
    }
}
