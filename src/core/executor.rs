//! Phase executor.
//!
//! Runs a workspace's phases in dependency order:
//! - sequential: one phase at a time, following the topological order
//! - parallel: level by level, phases of one level running concurrently on a
//!   bounded pool of `max_workers`
//!
//! Inside a phase, app groups are deployed one after another and the phase
//! stops at the first failed app group. Every step is written to the state
//! store before the next one starts.

use crate::context::EngineContext;
use crate::core::rollback::RollbackEngine;
use crate::core::scheduler::{self, Unit};
use crate::core::state_store::{PhaseSpec, RunOptions, StateStore};
use crate::core::workspace;
use crate::deployer::{DeployOutcome, DeployRequest};
use crate::models::deployment::{AppState, PhaseStatus, RunStatus};
use crate::models::rollback::{RollbackRequest, RollbackResult};
use crate::models::workspace::{OnFailure, WorkspaceConfig};
use crate::utils::progress;
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// How phases are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel { max_workers: usize },
}

/// Options for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Workspace file the configuration was loaded from.
    pub source_path: String,
    /// Run only this phase and what it depends on.
    pub target_phase: Option<String>,
    pub dry_run: bool,
    pub force: bool,
    pub mode: ExecutionMode,
}

/// Outcome of one scheduled phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    pub phase: String,
    pub phase_deployment_id: String,
    pub execution_order: u32,
    pub status: PhaseStatus,
    pub completed_app_groups: u32,
    pub total_app_groups: u32,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

/// What happened when a failed phase asked for a rollback.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoRollback {
    /// The rollback ran (or was simulated).
    Completed(RollbackResult),
    /// No rollback could be attempted.
    Unavailable(String),
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub deployment_id: String,
    pub status: RunStatus,
    /// True only when every scheduled phase succeeded.
    pub success: bool,
    /// Per-phase results in execution order.
    pub phases: Vec<PhaseResult>,
    pub auto_rollback: Option<AutoRollback>,
}

impl ExecutionReport {
    /// Results of phases that ended in a given status.
    pub fn phases_with(&self, status: PhaseStatus) -> impl Iterator<Item = &PhaseResult> {
        self.phases.iter().filter(move |p| p.status == status)
    }
}

/// Everything fixed before the first phase starts.
struct RunPlan<'a> {
    config: &'a WorkspaceConfig,
    options: &'a ExecuteOptions,
    deployment_id: String,
    /// Phase name -> (phase deployment id, execution order).
    phases: HashMap<String, (String, u32)>,
    /// Phase name -> app groups in deploy order.
    app_groups: HashMap<String, Vec<String>>,
}

/// Flags shared by concurrently running phases.
#[derive(Default)]
struct HaltFlags {
    halted: AtomicBool,
    rollback_requested: AtomicBool,
}

/// Drives phase execution and records progress.
pub struct PhaseExecutor {
    ctx: EngineContext,
    show_progress: bool,
}

impl PhaseExecutor {
    /// Create an executor.
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            show_progress: false,
        }
    }

    /// Show a progress bar while phases run.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Execute a workspace.
    ///
    /// Scheduling errors are returned before anything is recorded. Phase
    /// failures are folded into the report; only state store failures abort
    /// a run that has started.
    pub async fn execute(
        &self,
        config: &WorkspaceConfig,
        options: &ExecuteOptions,
    ) -> Result<ExecutionReport> {
        let all_units = workspace::phase_units(config);
        let order = match &options.target_phase {
            Some(target) => scheduler::with_dependencies(target, &all_units)?,
            None => scheduler::order(&all_units)?,
        };
        let units = scheduler::subset(&all_units, &order);
        let levels: Vec<Vec<String>> = match options.mode {
            ExecutionMode::Sequential => order.iter().map(|name| vec![name.clone()]).collect(),
            ExecutionMode::Parallel { .. } => scheduler::levels(&units)?,
        };

        let mut app_groups = HashMap::new();
        for name in &order {
            let phase = config
                .phase(name)
                .ok_or_else(|| Error::ConfigValidation(format!("Unknown phase: {}", name)))?;
            app_groups.insert(name.clone(), workspace::app_group_order(phase)?);
        }

        tracing::info!(
            "Deploying workspace '{}': {} phase(s) in {} level(s){}",
            config.name(),
            order.len(),
            levels.len(),
            if options.dry_run { " [dry run]" } else { "" }
        );

        let run = self.ctx.store.start_run(
            config,
            &RunOptions {
                source_path: options.source_path.clone(),
                dry_run: options.dry_run,
                force: options.force,
                target_phase: options.target_phase.clone(),
            },
        )?;
        let deployment_id = run.deployment_id.clone();

        let outcome = self
            .run_phases(config, options, &deployment_id, &units, app_groups, &levels)
            .await;

        let (results, flags) = cancel_on_error(&self.ctx.store, &deployment_id, outcome)?;

        let all_succeeded = results.iter().all(|r| r.status == PhaseStatus::Success);
        let error_message = summarize_failures(&results);
        let finished = self
            .ctx
            .store
            .complete_run(&deployment_id, all_succeeded, error_message.as_deref());
        let run = cancel_on_error(&self.ctx.store, &deployment_id, finished)?;

        let auto_rollback = if flags.rollback_requested.load(Ordering::SeqCst) {
            Some(self.auto_rollback(&deployment_id, options.dry_run).await)
        } else {
            None
        };

        Ok(ExecutionReport {
            deployment_id,
            status: run.status,
            success: run.status == RunStatus::Success,
            phases: results,
            auto_rollback,
        })
    }

    async fn run_phases(
        &self,
        config: &WorkspaceConfig,
        options: &ExecuteOptions,
        deployment_id: &str,
        units: &[Unit],
        app_groups: HashMap<String, Vec<String>>,
        levels: &[Vec<String>],
    ) -> Result<(Vec<PhaseResult>, HaltFlags)> {
        let order: Vec<&String> = levels.iter().flatten().collect();
        let mut phases = HashMap::with_capacity(order.len());

        for (position, name) in order.iter().enumerate() {
            let unit = units.iter().find(|u| &&u.name == name);
            let scheduled = PhaseSpec {
                name: (*name).clone(),
                execution_order: position as u32,
                depends_on: unit.map(|u| u.depends_on.clone()).unwrap_or_default(),
                app_groups: app_groups.get(*name).cloned().unwrap_or_default(),
            };
            let phase = self.ctx.store.add_phase(deployment_id, &scheduled)?;
            phases.insert((*name).clone(), (phase.phase_deployment_id, scheduled.execution_order));
        }

        let plan = RunPlan {
            config,
            options,
            deployment_id: deployment_id.to_string(),
            phases,
            app_groups,
        };
        let flags = HaltFlags::default();
        let pb = progress::bar(order.len() as u64, self.show_progress);
        let workers = match options.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { max_workers } => max_workers.max(1),
        };

        let mut results: Vec<PhaseResult> = Vec::with_capacity(order.len());
        let mut failed: HashSet<String> = HashSet::new();

        for level in levels {
            let level_results: Vec<Result<PhaseResult>> = stream::iter(level.iter())
                .map(|name| self.run_phase(name, &plan, &flags, &failed, &pb))
                .buffer_unordered(workers)
                .collect()
                .await;

            for result in level_results {
                let result = result?;
                if result.status == PhaseStatus::Failed {
                    failed.insert(result.phase.clone());
                }
                results.push(result);
            }
        }
        pb.finish_and_clear();

        results.sort_by_key(|r| r.execution_order);
        Ok((results, flags))
    }

    async fn run_phase(
        &self,
        name: &str,
        plan: &RunPlan<'_>,
        flags: &HaltFlags,
        failed: &HashSet<String>,
        pb: &ProgressBar,
    ) -> Result<PhaseResult> {
        let store = &self.ctx.store;
        let (phase_id, execution_order) = plan
            .phases
            .get(name)
            .cloned()
            .ok_or_else(|| Error::state_store(format!("Phase '{}' was never recorded", name)))?;
        let groups = plan.app_groups.get(name).cloned().unwrap_or_default();
        let total = groups.len() as u32;

        if flags.halted.load(Ordering::SeqCst) {
            let record = store.skip_phase(&phase_id, "skipped after an earlier phase failed")?;
            tracing::info!("Skipping phase '{}'", name);
            pb.inc(1);
            return Ok(PhaseResult {
                phase: name.to_string(),
                phase_deployment_id: phase_id,
                execution_order,
                status: record.status,
                completed_app_groups: 0,
                total_app_groups: total,
                duration_seconds: None,
                error: record.error_message,
            });
        }

        let phase_config = plan.config.phase(name).cloned().unwrap_or_default();
        let failed_prerequisites: Vec<&str> = phase_config
            .depends_on
            .iter()
            .filter(|dep| failed.contains(*dep))
            .map(String::as_str)
            .collect();
        if !failed_prerequisites.is_empty() {
            tracing::warn!(
                "Phase '{}' runs although prerequisite(s) failed: {}",
                name,
                failed_prerequisites.join(", ")
            );
        }

        store.start_phase(&phase_id)?;
        pb.set_message(format!("phase {}", name));
        tracing::info!("Starting phase '{}' ({} app group(s))", name, total);

        let mut completed = 0u32;
        let mut applied: Vec<AppState> = Vec::new();
        let mut error: Option<String> = None;

        for group in &groups {
            let request = deploy_request(plan, name, &phase_config.source, group);
            let outcome = if plan.options.dry_run {
                tracing::info!("[DRY RUN] Would deploy app group '{}' of phase '{}'", group, name);
                Ok(DeployOutcome::default())
            } else {
                self.ctx.deployer.deploy(&request).await
            };

            match outcome {
                Ok(outcome) => {
                    completed += 1;
                    applied.extend(outcome.apps);
                    tracing::debug!("App group '{}' of phase '{}' deployed", group, name);
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    error = Some(match e {
                        Error::Execution { .. } => e.to_string(),
                        other => Error::Execution {
                            phase: name.to_string(),
                            app_group: group.clone(),
                            message: other.to_string(),
                        }
                        .to_string(),
                    });
                    break;
                }
            }
        }

        let success = error.is_none();
        let record =
            store.complete_phase(&phase_id, success, error.as_deref(), completed, applied)?;
        pb.inc(1);

        if success {
            tracing::info!("Phase '{}' succeeded", name);
        } else {
            let policy = plan.config.effective_on_failure(name);
            if policy.halts() {
                tracing::warn!(
                    "Phase '{}' failed; halting run {} (onFailure: {})",
                    name,
                    plan.deployment_id,
                    policy
                );
                flags.halted.store(true, Ordering::SeqCst);
                if policy == OnFailure::Rollback {
                    flags.rollback_requested.store(true, Ordering::SeqCst);
                }
            } else {
                tracing::warn!("Phase '{}' failed; continuing (onFailure: {})", name, policy);
            }
        }

        Ok(PhaseResult {
            phase: name.to_string(),
            phase_deployment_id: phase_id,
            execution_order,
            status: record.status,
            completed_app_groups: record.completed_app_groups,
            total_app_groups: record.total_app_groups,
            duration_seconds: record.duration_seconds,
            error: record.error_message,
        })
    }

    async fn auto_rollback(&self, deployment_id: &str, dry_run: bool) -> AutoRollback {
        tracing::info!("Rolling back run {} after failure", deployment_id);
        let engine = RollbackEngine::new(self.ctx.clone()).with_progress(self.show_progress);
        let request = RollbackRequest {
            deployment_id: deployment_id.to_string(),
            dry_run,
            ..Default::default()
        };

        match engine.rollback(&request).await {
            Ok(result) => {
                if !result.success {
                    tracing::error!(
                        "Automatic rollback of {} finished with {} error(s)",
                        deployment_id,
                        result.errors.len()
                    );
                }
                AutoRollback::Completed(result)
            }
            Err(e) => {
                tracing::warn!("Automatic rollback of {} not performed: {}", deployment_id, e);
                AutoRollback::Unavailable(e.to_string())
            }
        }
    }
}

fn deploy_request(plan: &RunPlan<'_>, phase: &str, source: &str, group: &str) -> DeployRequest {
    let settings = &plan.config.settings;
    DeployRequest {
        workspace: plan.config.name().to_string(),
        phase: phase.to_string(),
        app_group: group.to_string(),
        source: source.to_string(),
        namespace_overrides: settings
            .namespace_overrides
            .iter()
            .filter(|(key, _)| key.as_str() == group)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        timeout_seconds: plan.config.effective_timeout(phase),
        dry_run: plan.options.dry_run,
        force: plan.options.force,
        kubeconfig: settings.kubeconfig.clone(),
        context: settings.context.clone(),
    }
}

/// Cancel a started run when a later step fails, then pass the error on.
///
/// Keeps a run from staying IN_PROGRESS after the executor gave up on it.
fn cancel_on_error<T>(store: &StateStore, deployment_id: &str, outcome: Result<T>) -> Result<T> {
    outcome.map_err(|e| {
        tracing::error!("Run {} aborted: {}", deployment_id, e);
        if let Err(cancel) = store.cancel_run(deployment_id, &e.to_string()) {
            tracing::error!("Could not cancel run {}: {}", deployment_id, cancel);
        }
        e
    })
}

fn summarize_failures(results: &[PhaseResult]) -> Option<String> {
    let failures: Vec<String> = results
        .iter()
        .filter(|r| r.status == PhaseStatus::Failed)
        .map(|r| match &r.error {
            Some(e) => format!("{}: {}", r.phase, e),
            None => r.phase.clone(),
        })
        .collect();
    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}
