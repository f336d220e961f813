//! Workspace configuration model.
//!
//! Mirrors the workspace document: metadata, global settings and a map of
//! phases, each holding the app groups deployed together.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default timeout for a single app-group deploy, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Workspace configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Document version.
    #[serde(default, alias = "version")]
    pub api_version: String,
    /// Workspace metadata.
    pub metadata: WorkspaceMetadata,
    /// Global defaults applied to every phase.
    #[serde(default, alias = "global")]
    pub settings: GlobalSettings,
    /// Phases keyed by name, in declaration order.
    #[serde(default)]
    pub phases: IndexMap<String, PhaseConfig>,
}

impl WorkspaceConfig {
    /// Workspace name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Get a phase by name.
    pub fn phase(&self, name: &str) -> Option<&PhaseConfig> {
        self.phases.get(name)
    }

    /// On-failure policy in effect for a phase.
    pub fn effective_on_failure(&self, phase: &str) -> OnFailure {
        self.phases
            .get(phase)
            .and_then(|p| p.on_failure)
            .unwrap_or(self.settings.on_failure)
    }

    /// Timeout in effect for a phase.
    pub fn effective_timeout(&self, phase: &str) -> u64 {
        self.phases
            .get(phase)
            .and_then(|p| p.timeout_seconds)
            .unwrap_or(self.settings.timeout_seconds)
    }
}

/// Workspace metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    /// Workspace name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target environment (e.g. staging, prod).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Global settings and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Kubeconfig path hint for the deployer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// Kube context hint for the deployer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Default per app-group timeout.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Default on-failure policy.
    #[serde(default)]
    pub on_failure: OnFailure,
    /// Helm repositories (name -> url).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub helm_repos: BTreeMap<String, String>,
    /// Namespace overrides handed to the deployer (app group -> namespace).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_overrides: BTreeMap<String, String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            on_failure: OnFailure::default(),
            helm_repos: BTreeMap::new(),
            namespace_overrides: BTreeMap::new(),
        }
    }
}

/// A single phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    /// Phase description.
    #[serde(default)]
    pub description: String,
    /// Pointer to the app-group definitions.
    #[serde(default)]
    pub source: String,
    /// App groups, in declaration order.
    #[serde(default)]
    pub app_groups: Vec<String>,
    /// Phases this phase depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional dependency graph between this phase's app groups.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_group_deps: BTreeMap<String, Vec<String>>,
    /// Timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// On-failure override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<OnFailure>,
}

/// Behavior applied when a phase fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Skip every phase that has not started yet.
    #[default]
    Stop,
    /// Record the failure and keep going.
    Continue,
    /// Stop, then roll back to the last successful run.
    Rollback,
}

impl OnFailure {
    /// Whether this policy halts scheduling of further phases.
    pub fn halts(self) -> bool {
        matches!(self, OnFailure::Stop | OnFailure::Rollback)
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnFailure::Stop => write!(f, "stop"),
            OnFailure::Continue => write!(f, "continue"),
            OnFailure::Rollback => write!(f, "rollback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halting_policies() {
        assert!(OnFailure::Stop.halts());
        assert!(OnFailure::Rollback.halts());
        assert!(!OnFailure::Continue.halts());
    }
}
