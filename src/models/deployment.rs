//! Deployment history records.
//!
//! One `WorkspaceDeployment` per run, owning one `PhaseDeployment` per
//! scheduled phase. Both are persisted by the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a workspace run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    PartiallyFailed,
    Cancelled,
}

impl RunStatus {
    /// Terminal runs are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success
                | RunStatus::Failed
                | RunStatus::PartiallyFailed
                | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::PartiallyFailed => "PARTIALLY_FAILED",
            RunStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Status of a single phase within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Skipped,
    RolledBack,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "PENDING",
            PhaseStatus::InProgress => "IN_PROGRESS",
            PhaseStatus::Success => "SUCCESS",
            PhaseStatus::Failed => "FAILED",
            PhaseStatus::Skipped => "SKIPPED",
            PhaseStatus::RolledBack => "ROLLED_BACK",
        };
        write!(f, "{}", s)
    }
}

/// One run of a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDeployment {
    /// Internal numeric key.
    pub key: u64,
    /// External identity.
    pub deployment_id: String,
    /// Workspace name.
    pub workspace_name: String,
    /// Workspace file the run was started from.
    pub source_path: String,
    /// Start time.
    pub timestamp: DateTime<Utc>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Run status.
    pub status: RunStatus,
    pub total_phases: u32,
    pub completed_phases: u32,
    pub failed_phases: u32,
    pub skipped_phases: u32,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Whether force was requested.
    pub force: bool,
    /// Frozen copy of the workspace configuration used.
    pub config_snapshot: serde_json::Value,
    /// Phase requested for a partial run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_phase: Option<String>,
    /// Error summary for non-successful runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WorkspaceDeployment {
    /// Number of phases that have settled.
    pub fn settled_phases(&self) -> u32 {
        self.completed_phases + self.failed_phases + self.skipped_phases
    }
}

/// One phase of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDeployment {
    /// Internal numeric key.
    pub key: u64,
    /// External identity.
    pub phase_deployment_id: String,
    /// Key of the owning `WorkspaceDeployment`.
    pub workspace_deployment_key: u64,
    /// Phase name.
    pub phase_name: String,
    /// Position in the chosen schedule.
    pub execution_order: u32,
    /// Snapshot of the phase's dependencies.
    pub depends_on: serde_json::Value,
    /// Snapshot of the phase's app groups.
    pub app_groups: serde_json::Value,
    pub total_app_groups: u32,
    pub completed_app_groups: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Phase status.
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// What the deployer reported as applied for this phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<AppState>,
}

impl PhaseDeployment {
    /// App-group names from the snapshot.
    pub fn app_group_names(&self) -> Vec<String> {
        serde_json::from_value(self.app_groups.clone()).unwrap_or_default()
    }

    /// Dependency names from the snapshot.
    pub fn dependency_names(&self) -> Vec<String> {
        serde_json::from_value(self.depends_on.clone()).unwrap_or_default()
    }
}

/// A run together with its phases, ordered by execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDetail {
    pub deployment: WorkspaceDeployment,
    pub phases: Vec<PhaseDeployment>,
}

/// State of one application as reported by the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// App group the application belongs to.
    pub app_group: String,
    /// Application name.
    pub app: String,
    /// Helm release, if the app is managed by Helm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseState>,
    /// Kubernetes resources owned by the app.
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
}

/// A Helm release at a specific revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseState {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
}

/// Reference to a Kubernetes resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.namespace)
    }
}
