//! Connection tuning from TOML (`[connection]` section)

use crate::connection::ConnectionSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw connection configuration from TOML
///
/// # Example
///
/// ```toml
/// [connection]
/// keepalive_interval_secs = 15
/// keepalive_timeout_secs = 5
/// handshake_timeout_secs = 10
/// max_handshake_attempts = 5     # then wait for an explicit re-enable
/// backoff_initial_ms = 1000
/// backoff_max_secs = 30
/// shutdown_grace_secs = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConnectionConfig {
    pub keepalive_interval_secs: u64,
    pub keepalive_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub max_handshake_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for FileConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 15,
            keepalive_timeout_secs: 5,
            handshake_timeout_secs: 10,
            max_handshake_attempts: 5,
            backoff_initial_ms: 1000,
            backoff_max_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl FileConnectionConfig {
    pub fn to_connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            keepalive_timeout: Duration::from_secs(self.keepalive_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            max_handshake_attempts: self.max_handshake_attempts.max(1),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}
