//! JSONL transcript writer for turn events.
//!
//! Each [`ConversationEvent`] becomes one JSON line: the payload's fields plus
//! `type` and an RFC 3339 `timestamp`. The file is opened in append mode so a
//! restart continues the same transcript.

use concierge_application::{ConversationEvent, ConversationLogger};
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes after every line and on `Drop`.
pub struct JsonlConversationLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlConversationLogger {
    /// Open (or create) the transcript at `path`, creating parent directories.
    ///
    /// Returns `None` if the file cannot be opened; callers fall back to
    /// [`NoConversationLogger`](concierge_application::NoConversationLogger).
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                path = %parent.display(),
                error = %e,
                "Could not create conversation log directory"
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not open conversation log file"
                );
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The payload's own fields plus `type` and `timestamp`; anything other than
/// an object is nested under `data`.
fn record(event: ConversationEvent, timestamp: String) -> Value {
    let mut map = match event.payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert("type".to_string(), Value::from(event.event_type));
    map.insert("timestamp".to_string(), Value::from(timestamp));
    Value::Object(map)
}

impl ConversationLogger for JsonlConversationLogger {
    fn log(&self, event: ConversationEvent) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let record = record(event, timestamp);

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let written = serde_json::to_writer(&mut *writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            debug!(path = %self.path.display(), error = %e, "Conversation log write failed");
        }
    }
}

impl Drop for JsonlConversationLogger {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(|e| e.into_inner());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_turn_events_are_written_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("conversation.jsonl");
        let logger = JsonlConversationLogger::new(&path).unwrap();

        logger.log(ConversationEvent::new(
            "turn_started",
            json!({ "caller": "U1", "bytes": 12 }),
        ));
        logger.log(ConversationEvent::new(
            "tool_invocation",
            json!({ "capability": "search.web", "attempt": 1, "success": true }),
        ));
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(line.get("timestamp").is_some());
        }
        assert_eq!(lines[0]["type"], "turn_started");
        assert_eq!(lines[0]["caller"], "U1");
        assert_eq!(lines[1]["type"], "tool_invocation");
        assert_eq!(lines[1]["capability"], "search.web");
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.jsonl");
        let logger = JsonlConversationLogger::new(&path).unwrap();

        logger.log(ConversationEvent::new("fallback_tier", json!("static")));
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines[0]["type"], "fallback_tier");
        assert_eq!(lines[0]["data"], "static");
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.jsonl");

        for n in 0..2 {
            let logger = JsonlConversationLogger::new(&path).unwrap();
            logger.log(ConversationEvent::new("turn_finished", json!({ "n": n })));
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["n"], 1);
    }

    #[test]
    fn test_unwritable_location_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        assert!(JsonlConversationLogger::new(blocker.join("conversation.jsonl")).is_none());
    }
}
