//! Deployer boundary.
//!
//! The orchestrator never builds cluster commands itself. It hands one
//! app group at a time (or one rollback action) to an `AppGroupDeployer`.

mod hook;

pub use hook::HookDeployer;

use crate::models::deployment::AppState;
use crate::models::rollback::RollbackAction;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One app-group deploy call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub workspace: String,
    pub phase: String,
    pub app_group: String,
    /// Pointer to the app-group definitions.
    pub source: String,
    /// App group -> namespace.
    #[serde(default)]
    pub namespace_overrides: BTreeMap<String, String>,
    /// Advisory; enforced by the deployer.
    pub timeout_seconds: u64,
    pub dry_run: bool,
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// What a successful deploy left on the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
    #[serde(default)]
    pub apps: Vec<AppState>,
}

/// Applies app groups and rollback actions to a cluster.
#[async_trait]
pub trait AppGroupDeployer: Send + Sync {
    /// Deploy one app group. An error marks the app group as failed.
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome>;

    /// Apply one rollback action.
    async fn apply(&self, action: &RollbackAction) -> Result<()>;
}
