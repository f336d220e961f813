//! Error types for the workspace deployer.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the workspace deployer.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid workspace configuration: {0}")]
    ConfigValidation(String),

    // Scheduling errors
    #[error("'{unit}' depends on unknown '{missing}'")]
    UnknownDependency { unit: String, missing: String },

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Unit declared more than once: {0}")]
    DuplicateUnit(String),

    // Execution errors
    #[error("Deploy of app group '{app_group}' in phase '{phase}' failed: {message}")]
    Execution {
        phase: String,
        app_group: String,
        message: String,
    },

    // State store errors
    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("Invalid status transition for {record}: {from} -> {to}")]
    InvalidTransition {
        record: String,
        from: String,
        to: String,
    },

    // Rollback errors
    #[error("Rollback failed: {0}")]
    Rollback(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // TOML errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Create a rollback error from a string.
    pub fn rollback<S: Into<String>>(msg: S) -> Self {
        Error::Rollback(msg.into())
    }

    /// Create a state store error from a string.
    pub fn state_store<S: Into<String>>(msg: S) -> Self {
        Error::StateStore(msg.into())
    }

    /// Whether this error was raised while ordering units, before any execution.
    pub fn is_scheduling(&self) -> bool {
        matches!(
            self,
            Error::UnknownDependency { .. }
                | Error::CircularDependency { .. }
                | Error::DuplicateUnit(_)
        )
    }
}
