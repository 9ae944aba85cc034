//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted into application and
//! infrastructure settings by the `to_*` methods of each section.

mod agent;
mod connection;
mod llm;
mod logging;
mod permissions;
mod persona;
mod servers;

pub use agent::FileAgentConfig;
pub use connection::FileConnectionConfig;
pub use llm::FileLlmConfig;
pub use logging::FileLoggingConfig;
pub use permissions::FilePermissionsConfig;
pub use persona::FilePersonaConfig;
pub use servers::FileServerConfig;

use crate::connection::Endpoint;
use concierge_domain::{ConfigIssue, ConfigIssueCode, ServerDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Configuration rejected at startup; carries every error-level issue.
#[derive(Error, Debug)]
#[error("invalid configuration:{}", render(.issues))]
pub struct ConfigValidationError {
    pub issues: Vec<ConfigIssue>,
}

fn render(issues: &[ConfigIssue]) -> String {
    issues.iter().map(|i| format!("\n  - {}", i.message)).collect()
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Tool servers, in connection order
    pub servers: Vec<FileServerConfig>,
    /// Reasoning loop bounds
    pub agent: FileAgentConfig,
    /// Connection lifecycle tuning
    pub connection: FileConnectionConfig,
    /// Administrator identities
    pub permissions: FilePermissionsConfig,
    /// Assistant wording
    pub persona: FilePersonaConfig,
    /// Completion model
    pub llm: FileLlmConfig,
    /// Log destinations
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    pub fn server_descriptors(&self) -> Vec<ServerDescriptor> {
        self.servers.iter().map(FileServerConfig::to_descriptor).collect()
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Checks, in order:
    /// 1. Server names: empty, containing `.`, duplicated
    /// 2. Server endpoints that do not parse
    /// 3. No enabled server at all (warning)
    /// 4. Zero step budget or timeouts
    /// 5. Empty fallback message
    /// 6. Invocation timeout longer than the turn deadline (warning)
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        // 1 + 2. Server descriptors
        let mut seen = HashSet::new();
        for (index, server) in self.servers.iter().enumerate() {
            let name = server.name.trim();
            if name.is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyServerName,
                    format!("servers[{}]: name cannot be empty", index),
                ));
            } else if name.contains('.') {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidServerName,
                    format!("servers[{}]: name '{}' must not contain '.'", index, name),
                ));
            } else if !seen.insert(name) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::DuplicateServerName,
                    format!("servers[{}]: name '{}' is already used", index, name),
                ));
            }

            if let Err(e) = Endpoint::parse(server.endpoint.trim()) {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidEndpoint,
                    format!("servers[{}] ({}): {}", index, name, e),
                ));
            }
        }

        // 3. Nothing to connect to
        if !self.servers.iter().any(|s| s.enabled) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::NoEnabledServers,
                "no enabled tool servers; every turn will fall back to plain completion",
            ));
        }

        // 4. Bounds
        if self.agent.max_steps == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroStepBudget,
                "agent.max_steps must be at least 1",
            ));
        }
        let timeouts = [
            ("agent.invocation_timeout_secs", self.agent.invocation_timeout_secs),
            ("agent.turn_deadline_secs", self.agent.turn_deadline_secs),
            ("connection.keepalive_interval_secs", self.connection.keepalive_interval_secs),
            ("connection.keepalive_timeout_secs", self.connection.keepalive_timeout_secs),
            ("connection.handshake_timeout_secs", self.connection.handshake_timeout_secs),
            ("llm.timeout_secs", self.llm.timeout_secs),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ZeroTimeout,
                    format!("{} cannot be 0", field),
                ));
            }
        }

        // 5. The static tier must always have something to say
        if let Some(message) = &self.persona.fallback_message
            && message.trim().is_empty()
        {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyFallbackMessage,
                "persona.fallback_message cannot be empty",
            ));
        }

        // 6. A single invocation that cannot finish inside the turn
        if self.agent.invocation_timeout_secs > self.agent.turn_deadline_secs {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::TimeoutExceedsDeadline,
                format!(
                    "agent.invocation_timeout_secs ({}) exceeds agent.turn_deadline_secs ({})",
                    self.agent.invocation_timeout_secs, self.agent.turn_deadline_secs
                ),
            ));
        }

        issues
    }

    /// Run [`validate`](Self::validate), failing on any error-level issue.
    ///
    /// On success returns the remaining warnings for the caller to log.
    pub fn check(&self) -> Result<Vec<ConfigIssue>, ConfigValidationError> {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            self.validate().into_iter().partition(ConfigIssue::is_error);
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigValidationError { issues: errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server(name: &str, endpoint: &str) -> FileServerConfig {
        FileServerConfig {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            enabled: true,
        }
    }

    fn codes(config: &FileConfig) -> Vec<ConfigIssueCode> {
        config.validate().into_iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[[servers]]
name = "search"
endpoint = "tcp://127.0.0.1:7001"

[[servers]]
name = "files"
endpoint = "stdio:files-server --root /srv"
enabled = false

[agent]
max_steps = 4
turn_deadline_secs = 60

[connection]
max_handshake_attempts = 2

[permissions]
admins = ["U_ADMIN"]

[persona]
fallback_message = "Try again later."

[llm]
model = "llama3.1"

[logging]
conversation_log = "/tmp/concierge.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert!(!config.servers[1].enabled);
        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(
            config.agent.to_execution_params().turn_deadline,
            Duration::from_secs(60)
        );
        assert_eq!(config.connection.max_handshake_attempts, 2);
        assert_eq!(config.permissions.admins, vec!["U_ADMIN".to_string()]);
        assert_eq!(config.persona.to_persona().fallback_message, "Try again later.");
        assert_eq!(config.llm.model, "llama3.1");
        assert!(config.logging.conversation_log_path().is_some());
        assert!(config.validate().iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_server_descriptors_keep_order() {
        let config = FileConfig {
            servers: vec![server("b", "localhost:1"), server("a", "localhost:2")],
            ..Default::default()
        };
        let names: Vec<_> = config
            .server_descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_default_config_only_warns_about_servers() {
        let issues = FileConfig::default().validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ConfigIssueCode::NoEnabledServers);
        assert!(!issues[0].is_error());
    }

    #[test]
    fn test_validate_reports_every_server_issue() {
        let config = FileConfig {
            servers: vec![
                server("", "localhost:1"),
                server("chat.v2", "localhost:2"),
                server("search", "localhost:3"),
                server("search", "localhost:4"),
                server("broken", "ftp://nowhere"),
            ],
            ..Default::default()
        };
        let codes = codes(&config);
        assert!(codes.contains(&ConfigIssueCode::EmptyServerName));
        assert!(codes.contains(&ConfigIssueCode::InvalidServerName));
        assert!(codes.contains(&ConfigIssueCode::DuplicateServerName));
        assert!(codes.contains(&ConfigIssueCode::InvalidEndpoint));
        assert!(!codes.contains(&ConfigIssueCode::NoEnabledServers));
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = FileConfig {
            servers: vec![server("search", "localhost:1")],
            ..Default::default()
        };
        config.agent.max_steps = 0;
        config.agent.invocation_timeout_secs = 0;
        config.llm.timeout_secs = 0;
        config.persona.fallback_message = Some("   ".to_string());

        let issues = config.validate();
        assert!(issues.iter().all(|i| i.is_error()));
        let codes: Vec<_> = issues.iter().map(|i| i.code).collect();
        assert!(codes.contains(&ConfigIssueCode::ZeroStepBudget));
        assert_eq!(
            codes.iter().filter(|c| **c == ConfigIssueCode::ZeroTimeout).count(),
            2
        );
        assert!(codes.contains(&ConfigIssueCode::EmptyFallbackMessage));
    }

    #[test]
    fn test_check_splits_errors_from_warnings() {
        let warnings = FileConfig::default().check().unwrap();
        assert_eq!(warnings.len(), 1);

        let mut config = FileConfig::default();
        config.agent.max_steps = 0;
        let err = config.check().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.to_string().contains("agent.max_steps"));
    }

    #[test]
    fn test_timeout_exceeding_deadline_is_warning() {
        let mut config = FileConfig {
            servers: vec![server("search", "localhost:1")],
            ..Default::default()
        };
        config.agent.invocation_timeout_secs = 300;

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ConfigIssueCode::TimeoutExceedsDeadline);
        assert!(!issues[0].is_error());
    }
}
