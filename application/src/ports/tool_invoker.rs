//! Tool invocation ports
//!
//! [`ToolInvoker`] forwards one call to the connection that owns a
//! capability. [`ToolAvailability`] exposes the read-only connection state
//! the dispatcher and the fallback chain consult before doing anything.
//! Both are implemented by the connection supervisor in the infrastructure
//! layer.

use async_trait::async_trait;
use concierge_domain::{Capability, ConnectionState, ToolError};

/// Port for forwarding a single tool call.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Forward one call over the owning server's live session.
    ///
    /// Timeouts are applied by the caller; dropping the returned future
    /// abandons the call without affecting the connection.
    async fn invoke(
        &self,
        capability: &Capability,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Port for reading connection readiness.
pub trait ToolAvailability: Send + Sync {
    /// Current state of one server's connection, `None` if unknown.
    fn server_state(&self, server: &str) -> Option<ConnectionState>;

    /// At least one connection is `Ready`.
    fn any_ready(&self) -> bool;

    /// Every enabled connection is `Ready`. False when there are none.
    fn all_ready(&self) -> bool;
}
