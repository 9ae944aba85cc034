//! Port for structured conversation logging.
//!
//! Defines the [`ConversationLogger`] trait for recording turn events
//! (turn start, each reasoning step, each tool invocation, the fallback tier
//! that answered) to a structured log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostic messages, while this port captures the
//! transcript in a machine-readable format (JSONL).

use serde_json::Value;

/// A structured conversation event for logging.
pub struct ConversationEvent {
    /// Event type identifier (e.g., "turn_started", "tool_invocation").
    pub event_type: &'static str,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Port for logging conversation events to a structured log.
///
/// `log` is synchronous and non-fallible; logging failures never disturb a
/// turn.
pub trait ConversationLogger: Send + Sync {
    fn log(&self, event: ConversationEvent);
}

/// No-op implementation for tests and when logging is disabled.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}
