//! Structured configuration issues.
//!
//! The configuration loader reports every problem it finds rather than
//! stopping at the first one. Errors abort startup; warnings are logged.

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueCode {
    EmptyServerName,
    /// Two descriptors share a name; capability prefixes would collide.
    DuplicateServerName,
    /// Server names prefix qualified capability names and must not contain `.`.
    InvalidServerName,
    InvalidEndpoint,
    NoEnabledServers,
    ZeroStepBudget,
    ZeroTimeout,
    EmptyFallbackMessage,
    /// Invocation timeout exceeds the whole-turn deadline.
    TimeoutExceedsDeadline,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}
