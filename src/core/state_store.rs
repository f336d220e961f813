//! Deployment state store.
//!
//! Durable history of workspace runs. The store is a small repository over
//! two tables, `workspace_deployments` and `phase_deployments`, kept in one
//! JSON document. Phase rows point at their run through a plain numeric
//! foreign key; deleting a run deletes its phases in the same write.
//!
//! Every mutation runs as a transaction. Inside one process a mutex serializes
//! writers; across processes an exclusive advisory lock on a sibling `.lock`
//! file does. Under that lock the tables are re-read from disk, the change is
//! applied, invariants are checked and the result is written back atomically.
//! Reads reload the file under a shared lock. Several handles on one file
//! therefore see each other's commits and never overwrite them.

use crate::models::deployment::{
    AppState, DeploymentDetail, PhaseDeployment, PhaseStatus, RunStatus, WorkspaceDeployment,
};
use crate::models::rollback::RollbackPoint;
use crate::models::workspace::WorkspaceConfig;
use crate::utils::{fs as fs_utils, hash};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const STATE_VERSION: &str = "1.0";

/// Options recorded on a new run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Workspace file the run was started from.
    pub source_path: String,
    pub dry_run: bool,
    pub force: bool,
    /// Phase requested for a partial run.
    pub target_phase: Option<String>,
}

/// A phase about to be scheduled.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub name: String,
    pub execution_order: u32,
    pub depends_on: Vec<String>,
    pub app_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tables {
    version: String,
    next_workspace_key: u64,
    next_phase_key: u64,
    workspace_deployments: Vec<WorkspaceDeployment>,
    phase_deployments: Vec<PhaseDeployment>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            next_workspace_key: 1,
            next_phase_key: 1,
            workspace_deployments: Vec::new(),
            phase_deployments: Vec::new(),
        }
    }
}

impl Tables {
    fn run(&self, deployment_id: &str) -> Result<&WorkspaceDeployment> {
        self.workspace_deployments
            .iter()
            .find(|r| r.deployment_id == deployment_id)
            .ok_or_else(|| Error::DeploymentNotFound(deployment_id.to_string()))
    }

    fn run_mut(&mut self, deployment_id: &str) -> Result<&mut WorkspaceDeployment> {
        self.workspace_deployments
            .iter_mut()
            .find(|r| r.deployment_id == deployment_id)
            .ok_or_else(|| Error::DeploymentNotFound(deployment_id.to_string()))
    }

    fn run_by_key_mut(&mut self, key: u64) -> Result<&mut WorkspaceDeployment> {
        self.workspace_deployments
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or_else(|| Error::state_store(format!("Orphaned phase row: run key {}", key)))
    }

    fn phase_mut(&mut self, phase_id: &str) -> Result<&mut PhaseDeployment> {
        self.phase_deployments
            .iter_mut()
            .find(|p| p.phase_deployment_id == phase_id)
            .ok_or_else(|| Error::DeploymentNotFound(format!("phase {}", phase_id)))
    }

    fn phases_of(&self, run_key: u64) -> Vec<PhaseDeployment> {
        let mut phases: Vec<PhaseDeployment> = self
            .phase_deployments
            .iter()
            .filter(|p| p.workspace_deployment_key == run_key)
            .cloned()
            .collect();
        phases.sort_by_key(|p| (p.execution_order, p.key));
        phases
    }

    /// Fails if the phase's run is terminal. Returns the run key.
    fn ensure_run_open(&self, phase_id: &str) -> Result<u64> {
        let phase = self
            .phase_deployments
            .iter()
            .find(|p| p.phase_deployment_id == phase_id)
            .ok_or_else(|| Error::DeploymentNotFound(format!("phase {}", phase_id)))?;
        let run = self
            .workspace_deployments
            .iter()
            .find(|r| r.key == phase.workspace_deployment_key)
            .ok_or_else(|| {
                Error::state_store(format!("Orphaned phase row: {}", phase.phase_deployment_id))
            })?;
        if run.status.is_terminal() {
            return Err(terminal_error(run));
        }
        Ok(run.key)
    }

    fn check_invariants(&self) -> Result<()> {
        for run in &self.workspace_deployments {
            if run.settled_phases() > run.total_phases {
                return Err(Error::state_store(format!(
                    "Counter invariant violated for {}: \
                     {} completed + {} failed + {} skipped > {} total",
                    run.deployment_id,
                    run.completed_phases,
                    run.failed_phases,
                    run.skipped_phases,
                    run.total_phases
                )));
            }
        }
        Ok(())
    }

    fn unique_run_id(&self, workspace: &str, source: &str, timestamp: &DateTime<Utc>) -> String {
        let mut attempt = 0;
        loop {
            let id = hash::deployment_id(workspace, source, timestamp, attempt);
            if !self.workspace_deployments.iter().any(|r| r.deployment_id == id) {
                return id;
            }
            attempt += 1;
        }
    }

    fn unique_phase_id(&self, run_id: &str, phase: &str, execution_order: u32) -> String {
        let mut attempt = 0;
        loop {
            let id = hash::phase_deployment_id(run_id, phase, execution_order, attempt);
            if !self.phase_deployments.iter().any(|p| p.phase_deployment_id == id) {
                return id;
            }
            attempt += 1;
        }
    }

    /// Runs of a workspace, newest first.
    fn runs_newest_first<'a>(
        &'a self,
        workspace: Option<&'a str>,
    ) -> Vec<&'a WorkspaceDeployment> {
        let mut runs: Vec<&WorkspaceDeployment> = self
            .workspace_deployments
            .iter()
            .filter(|r| workspace.map_or(true, |w| r.workspace_name == w))
            .collect();
        runs.sort_by(|a, b| (b.timestamp, b.key).cmp(&(a.timestamp, a.key)));
        runs
    }
}

fn load_tables(path: &Path) -> Result<Tables> {
    if !path.exists() {
        return Ok(Tables::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        Error::state_store(format!("Corrupted state file {}: {}", path.display(), e))
    })
}

fn lock_error(path: &Path, e: std::io::Error) -> Error {
    Error::state_store(format!("Failed to lock {}: {}", path.display(), e))
}

fn terminal_error(run: &WorkspaceDeployment) -> Error {
    Error::InvalidTransition {
        record: format!("run {}", run.deployment_id),
        from: run.status.to_string(),
        to: "any change (run is terminal)".to_string(),
    }
}

fn phase_transition_error(phase: &PhaseDeployment, to: PhaseStatus) -> Error {
    Error::InvalidTransition {
        record: format!("phase {} ({})", phase.phase_name, phase.phase_deployment_id),
        from: phase.status.to_string(),
        to: to.to_string(),
    }
}

/// Durable repository of run history.
pub struct StateStore {
    path: Option<PathBuf>,
    tables: Mutex<Tables>,
}

impl StateStore {
    /// Open a store backed by a JSON file, creating it on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let lock = fs_utils::open_lock(&path)?;
            let _held = lock.read().map_err(|e| lock_error(&path, e))?;
            load_tables(&path)?
        } else {
            Tables::default()
        };

        tracing::debug!("Opened state store at {}", path.display());
        Ok(Self {
            path: Some(path),
            tables: Mutex::new(tables),
        })
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: Mutex::new(Tables::default()),
        }
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| Error::state_store("lock poisoned"))?;

        let path = match &self.path {
            Some(path) => path,
            None => {
                let mut draft = guard.clone();
                let out = f(&mut draft)?;
                draft.check_invariants()?;
                *guard = draft;
                return Ok(out);
            }
        };

        let mut lock = fs_utils::open_lock(path)?;
        let _held = lock.write().map_err(|e| lock_error(path, e))?;

        // Start from what is on disk: another handle may have committed.
        let mut draft = load_tables(path)?;
        let out = f(&mut draft)?;
        draft.check_invariants()?;

        let json = serde_json::to_vec_pretty(&draft)?;
        fs_utils::write_atomic(path, &json).map_err(|e| {
            Error::state_store(format!("Failed to write {}: {}", path.display(), e))
        })?;

        *guard = draft;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| Error::state_store("lock poisoned"))?;

        if let Some(path) = self.path.as_deref().filter(|p| p.exists()) {
            let lock = fs_utils::open_lock(path)?;
            let _held = lock.read().map_err(|e| lock_error(path, e))?;
            *guard = load_tables(path)?;
        }
        Ok(f(&*guard))
    }

    // ========== RUNS ==========

    /// Record a new run in progress, with a frozen copy of the configuration.
    pub fn start_run(
        &self,
        config: &WorkspaceConfig,
        options: &RunOptions,
    ) -> Result<WorkspaceDeployment> {
        let snapshot = serde_json::to_value(config)?;
        let timestamp = Utc::now();

        let run = self.transaction(|tables| {
            let deployment_id =
                tables.unique_run_id(config.name(), &options.source_path, &timestamp);
            let run = WorkspaceDeployment {
                key: tables.next_workspace_key,
                deployment_id,
                workspace_name: config.name().to_string(),
                source_path: options.source_path.clone(),
                timestamp,
                completed_at: None,
                status: RunStatus::InProgress,
                total_phases: 0,
                completed_phases: 0,
                failed_phases: 0,
                skipped_phases: 0,
                dry_run: options.dry_run,
                force: options.force,
                config_snapshot: snapshot,
                target_phase: options.target_phase.clone(),
                error_message: None,
            };
            tables.next_workspace_key += 1;
            tables.workspace_deployments.push(run.clone());
            Ok(run)
        })?;

        tracing::info!(
            "Started run {} for workspace {}",
            run.deployment_id,
            run.workspace_name
        );
        Ok(run)
    }

    /// Finalize a run, deriving its status from the phase counters.
    ///
    /// All phases succeeded gives SUCCESS, some succeeded gives
    /// PARTIALLY_FAILED, none succeeded gives FAILED.
    pub fn complete_run(
        &self,
        deployment_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<WorkspaceDeployment> {
        let run = self.transaction(|tables| {
            let run = tables.run_mut(deployment_id)?;
            if run.status.is_terminal() {
                return Err(terminal_error(run));
            }

            run.status = if success && run.completed_phases == run.total_phases {
                RunStatus::Success
            } else if run.completed_phases > 0 {
                RunStatus::PartiallyFailed
            } else {
                RunStatus::Failed
            };
            run.completed_at = Some(Utc::now());
            run.error_message = error_message.map(ToOwned::to_owned);
            Ok(run.clone())
        })?;

        tracing::info!("Run {} finished with status {}", run.deployment_id, run.status);
        Ok(run)
    }

    /// Cancel a run that has not finished.
    pub fn cancel_run(&self, deployment_id: &str, reason: &str) -> Result<WorkspaceDeployment> {
        self.transaction(|tables| {
            let run = tables.run_mut(deployment_id)?;
            if run.status.is_terminal() {
                return Err(terminal_error(run));
            }
            run.status = RunStatus::Cancelled;
            run.completed_at = Some(Utc::now());
            run.error_message = Some(reason.to_string());
            Ok(run.clone())
        })
    }

    /// Delete a run and all of its phases.
    pub fn delete_run(&self, deployment_id: &str) -> Result<()> {
        self.transaction(|tables| {
            let key = tables.run(deployment_id)?.key;
            tables.workspace_deployments.retain(|r| r.key != key);
            tables
                .phase_deployments
                .retain(|p| p.workspace_deployment_key != key);
            Ok(())
        })?;
        tracing::info!("Deleted run {}", deployment_id);
        Ok(())
    }

    // ========== PHASES ==========

    /// Add a pending phase to an open run.
    pub fn add_phase(&self, deployment_id: &str, scheduled: &PhaseSpec) -> Result<PhaseDeployment> {
        let depends_on = serde_json::to_value(&scheduled.depends_on)?;
        let app_groups = serde_json::to_value(&scheduled.app_groups)?;

        self.transaction(|tables| {
            let run = tables.run(deployment_id)?;
            if run.status.is_terminal() {
                return Err(terminal_error(run));
            }
            let run_key = run.key;

            let phase_deployment_id =
                tables.unique_phase_id(deployment_id, &scheduled.name, scheduled.execution_order);
            let phase = PhaseDeployment {
                key: tables.next_phase_key,
                phase_deployment_id,
                workspace_deployment_key: run_key,
                phase_name: scheduled.name.clone(),
                execution_order: scheduled.execution_order,
                depends_on,
                app_groups,
                total_app_groups: scheduled.app_groups.len() as u32,
                completed_app_groups: 0,
                started_at: None,
                completed_at: None,
                duration_seconds: None,
                status: PhaseStatus::Pending,
                error_message: None,
                applied: Vec::new(),
            };
            tables.next_phase_key += 1;
            tables.phase_deployments.push(phase.clone());
            tables.run_mut(deployment_id)?.total_phases += 1;
            Ok(phase)
        })
    }

    /// Mark a pending phase as running.
    pub fn start_phase(&self, phase_id: &str) -> Result<PhaseDeployment> {
        self.transaction(|tables| {
            tables.ensure_run_open(phase_id)?;
            let phase = tables.phase_mut(phase_id)?;
            if phase.status != PhaseStatus::Pending {
                return Err(phase_transition_error(phase, PhaseStatus::InProgress));
            }
            phase.status = PhaseStatus::InProgress;
            phase.started_at = Some(Utc::now());
            Ok(phase.clone())
        })
    }

    /// Finish a running phase and fold the outcome into the run counters.
    pub fn complete_phase(
        &self,
        phase_id: &str,
        success: bool,
        error_message: Option<&str>,
        completed_app_groups: u32,
        applied: Vec<AppState>,
    ) -> Result<PhaseDeployment> {
        self.transaction(|tables| {
            let run_key = tables.ensure_run_open(phase_id)?;
            let target = if success {
                PhaseStatus::Success
            } else {
                PhaseStatus::Failed
            };

            let phase = tables.phase_mut(phase_id)?;
            if phase.status != PhaseStatus::InProgress {
                return Err(phase_transition_error(phase, target));
            }
            let now = Utc::now();
            phase.status = target;
            phase.completed_at = Some(now);
            phase.duration_seconds = phase
                .started_at
                .map(|started| (now - started).num_milliseconds() as f64 / 1000.0);
            phase.completed_app_groups = completed_app_groups.min(phase.total_app_groups);
            phase.error_message = error_message.map(ToOwned::to_owned);
            phase.applied = applied;
            let phase = phase.clone();

            let run = tables.run_by_key_mut(run_key)?;
            if success {
                run.completed_phases += 1;
            } else {
                run.failed_phases += 1;
            }
            Ok(phase)
        })
    }

    /// Skip a phase that never started.
    pub fn skip_phase(&self, phase_id: &str, reason: &str) -> Result<PhaseDeployment> {
        self.transaction(|tables| {
            let run_key = tables.ensure_run_open(phase_id)?;
            let phase = tables.phase_mut(phase_id)?;
            if phase.status != PhaseStatus::Pending {
                return Err(phase_transition_error(phase, PhaseStatus::Skipped));
            }
            phase.status = PhaseStatus::Skipped;
            phase.completed_at = Some(Utc::now());
            phase.error_message = Some(reason.to_string());
            let phase = phase.clone();

            tables.run_by_key_mut(run_key)?.skipped_phases += 1;
            Ok(phase)
        })
    }

    /// Record that a finished phase has been rolled back.
    ///
    /// Only the phase row changes; the owning run keeps its terminal fields.
    pub fn mark_phase_rolled_back(&self, phase_id: &str) -> Result<PhaseDeployment> {
        self.transaction(|tables| {
            let phase = tables.phase_mut(phase_id)?;
            if !matches!(phase.status, PhaseStatus::Success | PhaseStatus::Failed) {
                return Err(phase_transition_error(phase, PhaseStatus::RolledBack));
            }
            phase.status = PhaseStatus::RolledBack;
            Ok(phase.clone())
        })
    }

    // ========== QUERIES ==========

    /// Get a run by id.
    pub fn get(&self, deployment_id: &str) -> Result<Option<WorkspaceDeployment>> {
        self.read(|tables| tables.run(deployment_id).ok().cloned())
    }

    /// Get a phase by id.
    pub fn get_phase(&self, phase_id: &str) -> Result<Option<PhaseDeployment>> {
        self.read(|tables| {
            tables
                .phase_deployments
                .iter()
                .find(|p| p.phase_deployment_id == phase_id)
                .cloned()
        })
    }

    /// List runs, newest first.
    pub fn list(
        &self,
        workspace: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WorkspaceDeployment>> {
        self.read(|tables| {
            tables
                .runs_newest_first(workspace)
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    /// A run with its phases in execution order.
    pub fn detail(&self, deployment_id: &str) -> Result<Option<DeploymentDetail>> {
        self.read(|tables| {
            tables.run(deployment_id).ok().map(|run| DeploymentDetail {
                deployment: run.clone(),
                phases: tables.phases_of(run.key),
            })
        })
    }

    /// Most recent run of a workspace.
    pub fn latest(&self, workspace: &str) -> Result<Option<WorkspaceDeployment>> {
        self.read(|tables| {
            tables
                .runs_newest_first(Some(workspace))
                .first()
                .map(|r| (*r).clone())
        })
    }

    /// Nearest successful, non-dry run of the same workspace strictly before `before`.
    pub fn previous_successful(
        &self,
        before: &WorkspaceDeployment,
    ) -> Result<Option<WorkspaceDeployment>> {
        self.read(|tables| {
            tables
                .runs_newest_first(Some(before.workspace_name.as_str()))
                .into_iter()
                .filter(|r| (r.timestamp, r.key) < (before.timestamp, before.key))
                .find(|r| r.status == RunStatus::Success && !r.dry_run)
                .cloned()
        })
    }

    /// Successful, non-dry runs of a workspace, newest first.
    pub fn rollback_points(&self, workspace: &str, limit: usize) -> Result<Vec<RollbackPoint>> {
        self.read(|tables| {
            tables
                .runs_newest_first(Some(workspace))
                .into_iter()
                .filter(|r| r.status == RunStatus::Success && !r.dry_run)
                .take(limit)
                .map(|r| RollbackPoint {
                    deployment_id: r.deployment_id.clone(),
                    workspace_name: r.workspace_name.clone(),
                    timestamp: r.timestamp,
                    completed_phases: r.completed_phases,
                    target_phase: r.target_phase.clone(),
                })
                .collect()
        })
    }
}
