//! Logging destinations from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw logging configuration from TOML
///
/// ```toml
/// [logging]
/// conversation_log = "~/.local/share/concierge/conversations.jsonl"
/// log_dir = "~/.local/state/concierge"   # daily-rotated diagnostic log
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL conversation log; disabled when unset.
    pub conversation_log: Option<String>,
    /// Directory for the rolling diagnostic log; stderr only when unset.
    pub log_dir: Option<String>,
}

impl FileLoggingConfig {
    pub fn conversation_log_path(&self) -> Option<PathBuf> {
        self.conversation_log.as_deref().and_then(expand_home)
    }

    pub fn log_dir_path(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().and_then(expand_home)
    }
}

/// Expand a leading `~/`; blank paths are treated as unset.
fn expand_home(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return Some(home.join(rest));
    }
    Some(PathBuf::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_paths() {
        let config = FileLoggingConfig::default();
        assert!(config.conversation_log_path().is_none());
        assert!(config.log_dir_path().is_none());
    }

    #[test]
    fn test_blank_path_is_unset() {
        let config = FileLoggingConfig {
            conversation_log: Some("  ".to_string()),
            log_dir: None,
        };
        assert!(config.conversation_log_path().is_none());
    }

    #[test]
    fn test_absolute_path_kept() {
        let config = FileLoggingConfig {
            conversation_log: Some("/var/log/concierge.jsonl".to_string()),
            log_dir: None,
        };
        assert_eq!(
            config.conversation_log_path(),
            Some(PathBuf::from("/var/log/concierge.jsonl"))
        );
    }

    #[test]
    fn test_home_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config = FileLoggingConfig {
            conversation_log: None,
            log_dir: Some("~/logs".to_string()),
        };
        assert_eq!(config.log_dir_path(), Some(home.join("logs")));
    }
}
