//! Tool server identity and connection lifecycle state.
//!
//! A [`ServerDescriptor`] is loaded once from configuration and never mutated.
//! Each descriptor owns exactly one [`ConnectionState`], driven by its tool
//! server connection task:
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Ready ──▶ Degraded ──▶ Connecting ...
//!                      │                        ▲
//!                      └────────────────────────┘   (handshake exhausted)
//!
//! any state ──▶ Closed   (terminal)
//! ```

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Identifies one tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique server name, also the prefix of every qualified capability name.
    pub name: String,
    /// Address of the server (`tcp://host:port`, `host:port` or `stdio:<command>`).
    pub endpoint: String,
    /// Disabled descriptors are loaded but never connected.
    pub enabled: bool,
}

impl ServerDescriptor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Lifecycle state of one tool server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Degraded,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        }
    }

    /// Only `Ready` connections may receive invocations.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// `Degraded` and `Closed` servers must not own any published capability.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ConnectionState::Degraded | ConnectionState::Closed)
    }

    /// Whether the lifecycle may move from `self` to `next`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Ready) | (Connecting, Degraded) => true,
            (Ready, Degraded) => true,
            (Degraded, Connecting) => true,
            _ => false,
        }
    }

    /// Checked transition, used by the connection task to drive its state.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
