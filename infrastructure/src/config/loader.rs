//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of environment overrides; `__` separates nested keys
/// (`CONCIERGE_AGENT__MAX_STEPS=4`).
pub const ENV_PREFIX: &str = "CONCIERGE_";

const PROJECT_CONFIG_FILE: &str = "concierge.toml";

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Invalid(#[from] Box<figment::Error>),
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `CONCIERGE_*` environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./concierge.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/concierge/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, ConfigLoadError> {
        if let Some(path) = config_path
            && !path.exists()
        {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }
        Self::figment(config_path)
            .extract()
            .map_err(|e| ConfigLoadError::Invalid(Box::new(e)))
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(project_path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(&project_path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/concierge/config.toml if set,
    /// otherwise falls back to ~/.config/concierge/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("concierge").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        let path = PathBuf::from(PROJECT_CONFIG_FILE);
        path.exists().then_some(path)
    }

    /// Describe the config file locations being consulted, highest priority first.
    pub fn config_sources(explicit: Option<&Path>) -> Vec<(String, PathBuf, bool)> {
        let mut sources = Vec::new();
        if let Some(path) = explicit {
            sources.push(("explicit".to_string(), path.to_path_buf(), path.exists()));
        }
        let project = PathBuf::from(PROJECT_CONFIG_FILE);
        let found = project.exists();
        sources.push(("project".to_string(), project, found));
        if let Some(global) = Self::global_config_path() {
            let found = global.exists();
            sources.push(("global".to_string(), global, found));
        }
        sources
    }
}
