//! A single tool call attempt
//!
//! An invocation starts as a [`PendingInvocation`] and is consumed into an
//! immutable [`Invocation`] once the owning connection answers. A retry is a
//! fresh invocation; completed invocations are never reused.

use super::error::ToolError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Identity of whoever sent the inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallerIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An invocation that has been sent but not yet answered.
#[derive(Debug)]
pub struct PendingInvocation {
    capability: String,
    arguments: serde_json::Value,
    caller: CallerIdentity,
    attempt: u32,
    started_at: Instant,
}

impl PendingInvocation {
    /// Stamp the start time. Call immediately before forwarding.
    pub fn start(
        capability: impl Into<String>,
        arguments: serde_json::Value,
        caller: CallerIdentity,
        attempt: u32,
    ) -> Self {
        Self {
            capability: capability.into(),
            arguments,
            caller,
            attempt,
            started_at: Instant::now(),
        }
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    pub fn complete(self, result: Result<serde_json::Value, ToolError>) -> Invocation {
        Invocation {
            capability: self.capability,
            arguments: self.arguments,
            caller: self.caller,
            attempt: self.attempt,
            result,
            started_at: self.started_at,
            completed_at: Instant::now(),
        }
    }
}

/// A completed tool call attempt.
#[derive(Debug, Clone)]
pub struct Invocation {
    capability: String,
    arguments: serde_json::Value,
    caller: CallerIdentity,
    attempt: u32,
    result: Result<serde_json::Value, ToolError>,
    started_at: Instant,
    completed_at: Instant,
}

impl Invocation {
    /// Qualified name of the invoked capability.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// 1 for the first attempt, 2 for the retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn result(&self) -> Result<&serde_json::Value, &ToolError> {
        self.result.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn completed_at(&self) -> Instant {
        self.completed_at
    }

    pub fn duration(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_preserves_request() {
        let pending = PendingInvocation::start(
            "search.web",
            json!({ "q": "rust" }),
            CallerIdentity::new("U1"),
            1,
        );
        assert_eq!(pending.capability(), "search.web");
        let done = pending.complete(Ok(json!("results")));
        assert_eq!(done.capability(), "search.web");
        assert_eq!(done.arguments(), &json!({ "q": "rust" }));
        assert_eq!(done.caller().as_str(), "U1");
        assert_eq!(done.result(), Ok(&json!("results")));
        assert!(done.completed_at() >= done.started_at());
    }

    #[test]
    fn test_failed_invocation() {
        let done = PendingInvocation::start("a.b", json!({}), "U2".into(), 2)
            .complete(Err(ToolError::transient("reset")));
        assert!(!done.is_success());
        assert_eq!(done.attempt(), 2);
    }
}
