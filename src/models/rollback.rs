//! Rollback data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input to a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRequest {
    /// Run to roll back from.
    pub deployment_id: String,
    /// Run to roll back to. Resolved from history when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_deployment_id: Option<String>,
    /// Restrict the plan to these applications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_names: Vec<String>,
    /// Compute the plan only.
    #[serde(default)]
    pub dry_run: bool,
    /// Skip advisory pre-checks.
    #[serde(default)]
    pub force: bool,
}

/// A single undo step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RollbackAction {
    /// Roll a Helm release back to an earlier revision.
    HelmRollback {
        release: String,
        namespace: String,
        from_revision: u32,
        to_revision: u32,
    },
    /// Delete a resource absent from the target state.
    ResourceDelete {
        kind: String,
        name: String,
        namespace: String,
    },
    /// Restore a resource present in the target state.
    ResourceRestore {
        kind: String,
        name: String,
        namespace: String,
    },
}

impl fmt::Display for RollbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackAction::HelmRollback {
                release,
                namespace,
                from_revision,
                to_revision,
            } => write!(
                f,
                "helm rollback {} ({}) r{} -> r{}",
                release, namespace, from_revision, to_revision
            ),
            RollbackAction::ResourceDelete { kind, name, namespace } => {
                write!(f, "delete {}/{} ({})", kind, name, namespace)
            }
            RollbackAction::ResourceRestore { kind, name, namespace } => {
                write!(f, "restore {}/{} ({})", kind, name, namespace)
            }
        }
    }
}

/// An action with the application it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub app_group: String,
    pub app: String,
    pub action: RollbackAction,
}

/// Ordered list of actions that moves the cluster from one recorded state to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPlan {
    /// Run being rolled back.
    pub deployment_id: String,
    /// Run whose state is restored.
    pub target_deployment_id: String,
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
}

impl RollbackPlan {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Outcome of one executed (or simulated) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub app_group: String,
    pub app: String,
    pub action: RollbackAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    /// True when no action failed.
    pub success: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The plan that was executed.
    pub plan: RollbackPlan,
    /// Per-action outcomes, in plan order.
    pub rollbacks: Vec<ActionOutcome>,
    /// Error messages of failed actions.
    pub errors: Vec<String>,
    /// Applications whose actions all succeeded.
    pub succeeded_apps: Vec<String>,
    /// Applications with at least one failed action.
    pub failed_apps: Vec<String>,
}

/// A prior successful run usable as a rollback target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub deployment_id: String,
    pub workspace_name: String,
    pub timestamp: DateTime<Utc>,
    pub completed_phases: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_phase: Option<String>,
}
