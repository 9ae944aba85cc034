//! Execution parameters — reasoning loop control.
//!
//! [`ExecutionParams`] groups the static parameters that bound one turn of
//! [`RunTurnUseCase`](crate::use_cases::run_turn::RunTurnUseCase) and the
//! invocation dispatcher. These are application-layer concerns, not domain
//! policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reasoning loop control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Maximum completion calls in one turn.
    pub max_steps: usize,
    /// Bound on a single tool invocation.
    pub invocation_timeout: Duration,
    /// Outer deadline for the whole tool-augmented turn.
    pub turn_deadline: Duration,
    /// Extra attempts for transient/timeout invocation errors.
    pub transient_retries: usize,
    /// Tool observations fed back to the model are truncated to this many bytes.
    pub max_observation_chars: usize,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_steps: 8,
            invocation_timeout: Duration::from_secs(30),
            turn_deadline: Duration::from_secs(120),
            transient_retries: 1,
            max_observation_chars: 4000,
        }
    }
}

impl ExecutionParams {
    // ==================== Builder Methods ====================

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn with_turn_deadline(mut self, deadline: Duration) -> Self {
        self.turn_deadline = deadline;
        self
    }

    pub fn with_transient_retries(mut self, retries: usize) -> Self {
        self.transient_retries = retries;
        self
    }

    pub fn with_max_observation_chars(mut self, max: usize) -> Self {
        self.max_observation_chars = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ExecutionParams::default();
        assert_eq!(params.max_steps, 8);
        assert_eq!(params.invocation_timeout, Duration::from_secs(30));
        assert_eq!(params.turn_deadline, Duration::from_secs(120));
        assert_eq!(params.transient_retries, 1);
        assert_eq!(params.max_observation_chars, 4000);
    }

    #[test]
    fn test_builder() {
        let params = ExecutionParams::default()
            .with_max_steps(3)
            .with_invocation_timeout(Duration::from_millis(250))
            .with_transient_retries(0);

        assert_eq!(params.max_steps, 3);
        assert_eq!(params.invocation_timeout, Duration::from_millis(250));
        assert_eq!(params.transient_retries, 0);
    }
}
