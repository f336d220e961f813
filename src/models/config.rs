//! Configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment state file.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Maximum phases executed concurrently in parallel mode.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// External deployer hook.
    #[serde(default)]
    pub deployer: DeployerSettings,
}

/// External deployer hook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    /// Hook program. Called as `<command> <args..> deploy|rollback`.
    pub command: Option<String>,
    /// Extra arguments placed before the sub-command.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            max_workers: default_max_workers(),
            deployer: DeployerSettings::default(),
        }
    }
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            command: std::env::var("WORKSPACE_DEPLOYER_HOOK").ok(),
            args: Vec::new(),
        }
    }
}

fn default_state_file() -> PathBuf {
    dirs_config_path().join("state.json")
}

fn default_max_workers() -> usize {
    4
}

/// Get the configuration directory path.
fn dirs_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workspace_deployer")
}

/// Load configuration from file.
pub fn load_settings() -> Settings {
    let config_path = dirs_config_path().join("config.toml");

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("Ignoring invalid {}: {}", config_path.display(), e),
            },
            Err(e) => tracing::warn!("Cannot read {}: {}", config_path.display(), e),
        }
    }

    Settings::default()
}
