//! Invocation-level error taxonomy
//!
//! Every failure of a single tool call is carried as data into the turn's
//! context, never as control flow. The [`ToolErrorKind`] decides the retry
//! policy:
//!
//! | Kind | Code | Retried? |
//! |------|------|----------|
//! | `NotAvailable` | `NOT_AVAILABLE` | No |
//! | `Validation` | `INVALID_ARGUMENT` | No |
//! | `PermissionDenied` | `PERMISSION_DENIED` | No |
//! | `Timeout` | `TIMEOUT` | Once |
//! | `Transient` | `UNAVAILABLE` | Once |
//! | `Remote` | server-provided | No |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Capability unknown or its owning connection is not ready.
    NotAvailable,
    /// Arguments did not match the capability's input schema.
    Validation,
    /// Refused by the permission gate.
    PermissionDenied,
    /// The invocation exceeded its timeout.
    Timeout,
    /// Session dropped mid-call or the server reported a retryable condition.
    Transient,
    /// The tool server answered with a non-retryable error.
    Remote,
}

impl ToolErrorKind {
    pub fn default_code(&self) -> &'static str {
        match self {
            ToolErrorKind::NotAvailable => "NOT_AVAILABLE",
            ToolErrorKind::Validation => "INVALID_ARGUMENT",
            ToolErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ToolErrorKind::Timeout => "TIMEOUT",
            ToolErrorKind::Transient => "UNAVAILABLE",
            ToolErrorKind::Remote => "REMOTE_ERROR",
        }
    }
}

/// Error produced by a single tool call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    /// Error code (e.g. "PERMISSION_DENIED", or a server-provided code)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code().to_string(),
            message: message.into(),
        }
    }

    pub fn not_available(capability: &str) -> Self {
        Self::new(
            ToolErrorKind::NotAvailable,
            format!("tool not available: {}", capability),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, message)
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::PermissionDenied, reason)
    }

    pub fn timeout(capability: &str, after: std::time::Duration) -> Self {
        Self::new(
            ToolErrorKind::Timeout,
            format!("{} timed out after {}ms", capability, after.as_millis()),
        )
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transient, message)
    }

    /// Error reported by the tool server itself, keeping its code.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Remote,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Only transient and timeout errors earn a retry with the same arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ToolErrorKind::Transient | ToolErrorKind::Timeout)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}
