//! Error types for tool server connections

use thiserror::Error;

/// Result type alias for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors raised while establishing or using a tool server session.
///
/// These never reach a request task directly: the connection task turns
/// them into reconnects, and the invoke path maps them to [`ToolError`]s.
///
/// [`ToolError`]: concierge_domain::ToolError
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Session closed")]
    Closed,

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Failed to spawn tool server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectionError {
    /// Whether the session behind this error is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(_) | ConnectionError::Closed | ConnectionError::Protocol(_)
        )
    }
}
