//! Reasoning loop configuration from TOML (`[agent]` section)

use concierge_application::ExecutionParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw agent configuration from TOML
///
/// # Example
///
/// ```toml
/// [agent]
/// max_steps = 8                  # completion calls per turn
/// invocation_timeout_secs = 30
/// turn_deadline_secs = 120
/// transient_retries = 1
/// max_observation_chars = 4000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAgentConfig {
    pub max_steps: usize,
    pub invocation_timeout_secs: u64,
    pub turn_deadline_secs: u64,
    pub transient_retries: usize,
    pub max_observation_chars: usize,
}

impl Default for FileAgentConfig {
    fn default() -> Self {
        let params = ExecutionParams::default();
        Self {
            max_steps: params.max_steps,
            invocation_timeout_secs: params.invocation_timeout.as_secs(),
            turn_deadline_secs: params.turn_deadline.as_secs(),
            transient_retries: params.transient_retries,
            max_observation_chars: params.max_observation_chars,
        }
    }
}

impl FileAgentConfig {
    pub fn to_execution_params(&self) -> ExecutionParams {
        ExecutionParams::default()
            .with_max_steps(self.max_steps)
            .with_invocation_timeout(Duration::from_secs(self.invocation_timeout_secs))
            .with_turn_deadline(Duration::from_secs(self.turn_deadline_secs))
            .with_transient_retries(self.transient_retries)
            .with_max_observation_chars(self.max_observation_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_execution_params() {
        let params = FileAgentConfig::default().to_execution_params();
        assert_eq!(params.max_steps, 8);
        assert_eq!(params.invocation_timeout, Duration::from_secs(30));
        assert_eq!(params.turn_deadline, Duration::from_secs(120));
        assert_eq!(params.transient_retries, 1);
        assert_eq!(params.max_observation_chars, 4000);
    }

    #[test]
    fn test_partial_section() {
        let config: FileAgentConfig = toml::from_str("max_steps = 3").unwrap();
        let params = config.to_execution_params();
        assert_eq!(params.max_steps, 3);
        assert_eq!(params.turn_deadline, Duration::from_secs(120));
    }
}
