//! Tool call dispatch.
//!
//! Every tool-call intent goes through the same pipeline before anything
//! reaches a connection:
//!
//! ```text
//! resolve ──▶ owner Ready? ──▶ schema ──▶ permission gate ──▶ invoke (timeout)
//!    │             │              │              │                  │
//!    ▼             ▼              ▼              ▼                  ▼
//! NotAvailable NotAvailable   Validation  PermissionDenied   Timeout/Transient → retry
//! ```
//!
//! Rejections before the invoke step create no [`Invocation`]. Only transient
//! and timeout errors are retried, with identical arguments, and each retry
//! is a fresh invocation.
//!
//! [`Invocation`]: concierge_domain::Invocation

use crate::config::ExecutionParams;
use crate::ports::tool_invoker::{ToolAvailability, ToolInvoker};
use crate::registry::CapabilityRegistry;
use concierge_domain::{
    CallerIdentity, ConnectionState, PendingInvocation, PermissionDecision, PermissionGate,
    ToolCallIntent, ToolError, ToolErrorKind, ToolOutcome,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
    availability: Arc<dyn ToolAvailability>,
    invoker: Arc<dyn ToolInvoker>,
    gate: Arc<PermissionGate>,
    params: ExecutionParams,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        availability: Arc<dyn ToolAvailability>,
        invoker: Arc<dyn ToolInvoker>,
        gate: Arc<PermissionGate>,
        params: ExecutionParams,
    ) -> Self {
        Self {
            registry,
            availability,
            invoker,
            gate,
            params,
        }
    }

    pub async fn dispatch(&self, intent: &ToolCallIntent, caller: &CallerIdentity) -> ToolOutcome {
        let Some(entry) = self.registry.resolve(&intent.capability) else {
            info!(capability = %intent.capability, "Requested capability is not registered");
            return ToolOutcome::Rejected(ToolError::not_available(&intent.capability));
        };
        let capability = &entry.capability;

        if let Err(err) = self.check_ready(&capability.server, &capability.qualified_name) {
            return ToolOutcome::Rejected(err);
        }

        if let Some(problem) = &intent.arguments_error {
            info!(
                capability = %capability.qualified_name,
                problem = %problem,
                "Arguments are not valid JSON"
            );
            return ToolOutcome::Rejected(ToolError::validation(format!(
                "arguments for {} are not valid JSON: {}",
                capability.qualified_name, problem
            )));
        }

        if let Err(violation) = entry.validator.validate(&intent.arguments) {
            info!(
                capability = %capability.qualified_name,
                violation = %violation,
                "Arguments rejected by input schema"
            );
            return ToolOutcome::Rejected(ToolError::validation(format!(
                "invalid arguments for {}: {}",
                capability.qualified_name, violation
            )));
        }

        if let PermissionDecision::Deny(reason) = self.gate.check(caller, capability) {
            info!(
                capability = %capability.qualified_name,
                caller = %caller,
                "Permission denied"
            );
            return ToolOutcome::Rejected(ToolError::permission_denied(reason));
        }

        let max_attempts = 1 + self.params.transient_retries;
        let mut earlier = Vec::new();
        let mut attempt = 1;
        loop {
            let pending = PendingInvocation::start(
                capability.qualified_name.clone(),
                intent.arguments.clone(),
                caller.clone(),
                attempt as u32,
            );
            let result = match tokio::time::timeout(
                self.params.invocation_timeout,
                self.invoker.invoke(capability, &intent.arguments),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ToolError::timeout(
                    &capability.qualified_name,
                    self.params.invocation_timeout,
                )),
            };
            let invocation = pending.complete(result);

            let retry = match invocation.result() {
                Ok(_) => false,
                Err(err) => {
                    debug!(
                        capability = %capability.qualified_name,
                        attempt,
                        error = %err,
                        "Invocation failed"
                    );
                    err.is_retryable()
                        && attempt < max_attempts
                        && self
                            .check_ready(&capability.server, &capability.qualified_name)
                            .is_ok()
                }
            };

            if !retry {
                return ToolOutcome::Attempted {
                    earlier,
                    last: invocation,
                };
            }
            warn!(
                capability = %capability.qualified_name,
                attempt,
                "Retrying invocation after transient failure"
            );
            earlier.push(invocation);
            attempt += 1;
        }
    }

    fn check_ready(&self, server: &str, qualified_name: &str) -> Result<(), ToolError> {
        match self.availability.server_state(server) {
            Some(ConnectionState::Ready) => Ok(()),
            state => {
                let state = state.map(|s| s.as_str()).unwrap_or("unknown");
                info!(server = %server, state, "Owning connection is not ready");
                Err(ToolError::new(
                    ToolErrorKind::NotAvailable,
                    format!("tool not available: {} (server is {})", qualified_name, state),
                ))
            }
        }
    }
}
