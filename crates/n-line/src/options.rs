//! Editor options.
//!
//! Everything a session needs to know before the first keystroke. The shell
//! deserializes these from the `[editor]` table of its config file and lets
//! command-line flags override individual fields.
//!
//! | Field               | Default | Meaning                                   |
//! |---------------------|---------|-------------------------------------------|
//! | `multi_line`        | false   | wrap long lines instead of scrolling      |
//! | `mask`              | false   | draw `*` for every unit (passwords)       |
//! | `max_line_bytes`    | 4096    | line buffer capacity                      |
//! | `escape_timeout_ms` | 50      | wait for the rest of an escape sequence   |
//! | `utf8`              | true    | grapheme-aware units instead of bytes     |
//! | `history_max_len`   | 1000    | in-memory history entries kept            |

use std::sync::Arc;
use std::time::Duration;

use n_term::unit::{self, UnitAdapter};
use serde::Deserialize;

/// Options for an edit session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorOptions {
    pub multi_line: bool,
    pub mask: bool,
    pub max_line_bytes: usize,
    pub escape_timeout_ms: u64,
    pub utf8: bool,
    pub history_max_len: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            multi_line: false,
            mask: false,
            max_line_bytes: 4096,
            escape_timeout_ms: 50,
            utf8: true,
            history_max_len: 1000,
        }
    }
}

impl EditorOptions {
    /// The escape timeout as a `Duration`.
    #[must_use]
    pub const fn escape_timeout(&self) -> Duration {
        Duration::from_millis(self.escape_timeout_ms)
    }

    /// The unit adapter these options select.
    #[must_use]
    pub fn adapter(&self) -> Arc<dyn UnitAdapter> {
        unit::adapter(self.utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = EditorOptions::default();
        assert!(!o.multi_line);
        assert!(!o.mask);
        assert_eq!(o.max_line_bytes, 4096);
        assert_eq!(o.escape_timeout(), Duration::from_millis(50));
        assert!(o.utf8);
        assert_eq!(o.history_max_len, 1000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let o: EditorOptions = toml::from_str("multi_line = true\nescape_timeout_ms = 25").unwrap();
        assert!(o.multi_line);
        assert_eq!(o.escape_timeout_ms, 25);
        assert_eq!(o.max_line_bytes, 4096);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(toml::from_str::<EditorOptions>("multiline = true").is_err());
    }

    #[test]
    fn adapter_follows_utf8_flag() {
        let bytes = EditorOptions {
            utf8: false,
            ..EditorOptions::default()
        };
        assert_eq!(bytes.adapter().display_width("é".as_bytes()), 2);
        assert_eq!(EditorOptions::default().adapter().display_width("é".as_bytes()), 1);
    }
}
