//! Configuration file support
//!
//! Loads `FileConfig` from TOML files and `CONCIERGE_*` environment
//! variables, and validates it before anything is connected.

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileAgentConfig, FileConfig, FileConnectionConfig, FileLlmConfig,
    FileLoggingConfig, FilePermissionsConfig, FilePersonaConfig, FileServerConfig,
};
pub use loader::{ConfigLoadError, ConfigLoader, ENV_PREFIX};
