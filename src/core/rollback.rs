//! Rollback engine.
//!
//! Moves a workspace from the state recorded by one run back to the state
//! recorded by an earlier successful run. Planning is a pure diff over stored
//! history; executing the plan goes through the same deployer used for
//! deploys.
//!
//! Plan order:
//! 1. `ResourceDelete` for everything present now but absent in the target
//! 2. `ResourceRestore` for everything present in the target but missing now
//! 3. `HelmRollback` for every release whose revision differs
//!
//! Within each group, apps follow phase execution order and then the order in
//! which the deployer reported them.

use crate::context::EngineContext;
use crate::models::deployment::{
    AppState, DeploymentDetail, PhaseStatus, ReleaseState, ResourceRef, RunStatus,
};
use crate::models::rollback::{
    ActionOutcome, PlannedAction, RollbackAction, RollbackPlan, RollbackPoint, RollbackRequest,
    RollbackResult,
};
use crate::utils::progress;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Resource kind used when a whole Helm release exists on one side only.
pub const HELM_RELEASE_KIND: &str = "HelmRelease";

type AppKey = (String, String);

/// Recorded app states, remembering first-seen order.
#[derive(Default)]
struct StateView {
    order: Vec<AppKey>,
    apps: HashMap<AppKey, AppState>,
}

impl StateView {
    fn insert(&mut self, app: &AppState) {
        let key = (app.app_group.clone(), app.app.clone());
        if !self.apps.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.apps.insert(key, app.clone());
    }
}

/// A computed plan plus the source phases it covers.
struct Prepared {
    plan: RollbackPlan,
    phases_in_scope: Vec<String>,
}

/// Plans and executes rollbacks against recorded history.
pub struct RollbackEngine {
    ctx: EngineContext,
    show_progress: bool,
}

impl RollbackEngine {
    /// Create a rollback engine.
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            show_progress: false,
        }
    }

    /// Show a progress bar while actions run.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Prior successful runs of a workspace, newest first.
    pub fn list_points(&self, workspace: &str, limit: usize) -> Result<Vec<RollbackPoint>> {
        self.ctx.store.rollback_points(workspace, limit)
    }

    /// Compute the plan for a request without executing anything.
    pub fn plan(&self, request: &RollbackRequest) -> Result<RollbackPlan> {
        self.prepare(request).map(|prepared| prepared.plan)
    }

    /// Execute (or, for a dry run, simulate) a rollback.
    ///
    /// Unknown runs, a missing target and failed pre-checks abort before any
    /// action runs. A failing action is recorded and the remaining actions
    /// still run.
    pub async fn rollback(&self, request: &RollbackRequest) -> Result<RollbackResult> {
        let prepared = self.prepare(request)?;
        let plan = prepared.plan;

        tracing::info!(
            "Rolling back {} to {} ({} actions{})",
            plan.deployment_id,
            plan.target_deployment_id,
            plan.actions.len(),
            if request.dry_run { ", dry run" } else { "" }
        );

        let pb = progress::bar(plan.actions.len() as u64, self.show_progress);
        let mut outcomes = Vec::with_capacity(plan.actions.len());
        let mut errors = Vec::new();

        for planned in &plan.actions {
            pb.set_message(format!("{}: {}", planned.app, planned.action));

            let outcome = if request.dry_run {
                tracing::info!("[DRY RUN] {}: {}", planned.app, planned.action);
                Ok(())
            } else {
                self.ctx.deployer.apply(&planned.action).await
            };

            let error = match outcome {
                Ok(()) => None,
                Err(e) => {
                    let message = format!("{}/{}: {}", planned.app_group, planned.app, e);
                    tracing::error!("Rollback action failed: {}", message);
                    errors.push(message.clone());
                    Some(message)
                }
            };

            outcomes.push(ActionOutcome {
                app_group: planned.app_group.clone(),
                app: planned.app.clone(),
                action: planned.action.clone(),
                success: error.is_none(),
                error,
            });
            pb.inc(1);
        }
        pb.finish_and_clear();

        let (succeeded_apps, failed_apps) = split_apps(&outcomes);
        let success = errors.is_empty();

        if success && !request.dry_run && !plan.is_empty() {
            for phase_id in &prepared.phases_in_scope {
                self.ctx.store.mark_phase_rolled_back(phase_id)?;
            }
        }

        Ok(RollbackResult {
            success,
            dry_run: request.dry_run,
            plan,
            rollbacks: outcomes,
            errors,
            succeeded_apps,
            failed_apps,
        })
    }

    fn prepare(&self, request: &RollbackRequest) -> Result<Prepared> {
        let current = self
            .ctx
            .store
            .detail(&request.deployment_id)?
            .ok_or_else(|| {
                Error::rollback(format!("deployment not found: {}", request.deployment_id))
            })?;
        let target = self.resolve_target(&current, request)?;

        let issues = advisories(&current, &target);
        if !issues.is_empty() {
            if !request.force {
                return Err(Error::rollback(format!(
                    "{} (use force to override)",
                    issues.join("; ")
                )));
            }
            for issue in &issues {
                tracing::warn!("Ignoring pre-check: {}", issue);
            }
        }

        let (now, then, phases) = scoped_states(&current, &target, &request.app_names);
        let actions = diff(&now, &then, &request.app_names);

        Ok(Prepared {
            plan: RollbackPlan {
                deployment_id: current.deployment.deployment_id.clone(),
                target_deployment_id: target.deployment.deployment_id.clone(),
                actions,
            },
            phases_in_scope: phases,
        })
    }

    fn resolve_target(
        &self,
        current: &DeploymentDetail,
        request: &RollbackRequest,
    ) -> Result<DeploymentDetail> {
        let target_id = match &request.target_deployment_id {
            Some(id) => id.clone(),
            None => self
                .ctx
                .store
                .previous_successful(&current.deployment)?
                .map(|run| run.deployment_id)
                .ok_or_else(|| {
                    Error::rollback(format!(
                        "no eligible rollback target before {} for workspace '{}'",
                        current.deployment.deployment_id, current.deployment.workspace_name
                    ))
                })?,
        };

        if target_id == current.deployment.deployment_id {
            return Err(Error::rollback(format!(
                "cannot roll {} back to itself",
                target_id
            )));
        }

        let target = self
            .ctx
            .store
            .detail(&target_id)?
            .ok_or_else(|| Error::rollback(format!("target deployment not found: {}", target_id)))?;

        if target.deployment.workspace_name != current.deployment.workspace_name {
            return Err(Error::rollback(format!(
                "target {} belongs to workspace '{}', not '{}'",
                target_id, target.deployment.workspace_name, current.deployment.workspace_name
            )));
        }
        Ok(target)
    }
}

/// Conditions that abort a rollback unless forced.
fn advisories(current: &DeploymentDetail, target: &DeploymentDetail) -> Vec<String> {
    let mut issues = Vec::new();
    let run = &target.deployment;

    if !current.deployment.status.is_terminal() {
        issues.push(format!(
            "run {} is still {}",
            current.deployment.deployment_id, current.deployment.status
        ));
    }
    if run.status != RunStatus::Success {
        issues.push(format!("target {} has status {}", run.deployment_id, run.status));
    }
    if run.dry_run {
        issues.push(format!("target {} was a dry run", run.deployment_id));
    }

    let missing: Vec<&str> = target
        .phases
        .iter()
        .filter(|p| p.status == PhaseStatus::Success && p.applied.is_empty())
        .map(|p| p.phase_name.as_str())
        .collect();
    if !missing.is_empty() {
        issues.push(format!(
            "target revision metadata missing for phase(s): {}",
            missing.join(", ")
        ));
    }
    issues
}

/// Current and target state restricted to the phases the current run recorded.
///
/// A phase the target run never executed because it was a partial run is left
/// alone. A phase unknown to a full target run is treated as absent there.
/// App groups a failed phase never finished report no state; what the target
/// recorded for them is taken as still in place, so they get no actions.
fn scoped_states(
    current: &DeploymentDetail,
    target: &DeploymentDetail,
    app_names: &[String],
) -> (StateView, StateView, Vec<String>) {
    let mut now = StateView::default();
    let mut then = StateView::default();
    let mut phases = Vec::new();
    let target_is_partial = target.deployment.target_phase.is_some();

    for phase in &current.phases {
        if !matches!(phase.status, PhaseStatus::Success | PhaseStatus::Failed) {
            continue;
        }

        let recorded = target.phases.iter().find(|p| p.phase_name == phase.phase_name);
        if recorded.is_none() && target_is_partial {
            tracing::warn!(
                "Phase '{}' was not part of partial run {}; leaving it untouched",
                phase.phase_name,
                target.deployment.deployment_id
            );
            continue;
        }
        let recorded_apps = recorded.map(|p| p.applied.as_slice()).unwrap_or_default();
        recorded_apps.iter().for_each(|app| then.insert(app));
        phase.applied.iter().for_each(|app| now.insert(app));

        if phase.status == PhaseStatus::Failed {
            let reported: HashSet<&str> =
                phase.applied.iter().map(|app| app.app_group.as_str()).collect();
            let unfinished: Vec<&AppState> = recorded_apps
                .iter()
                .filter(|app| !reported.contains(app.app_group.as_str()))
                .collect();
            if !unfinished.is_empty() {
                tracing::warn!(
                    "Phase '{}' failed before finishing {} app(s); keeping their recorded state",
                    phase.phase_name,
                    unfinished.len()
                );
            }
            unfinished.into_iter().for_each(|app| now.insert(app));
        }

        let whole_phase = app_names.is_empty()
            || phase.applied.iter().all(|app| app_names.contains(&app.app));
        if whole_phase {
            phases.push(phase.phase_deployment_id.clone());
        }
    }
    (now, then, phases)
}

fn planned(key: &AppKey, action: RollbackAction) -> PlannedAction {
    PlannedAction {
        app_group: key.0.clone(),
        app: key.1.clone(),
        action,
    }
}

fn delete(resource: &ResourceRef) -> RollbackAction {
    RollbackAction::ResourceDelete {
        kind: resource.kind.clone(),
        name: resource.name.clone(),
        namespace: resource.namespace.clone(),
    }
}

fn restore(resource: &ResourceRef) -> RollbackAction {
    RollbackAction::ResourceRestore {
        kind: resource.kind.clone(),
        name: resource.name.clone(),
        namespace: resource.namespace.clone(),
    }
}

fn release_ref(release: &ReleaseState) -> ResourceRef {
    ResourceRef {
        kind: HELM_RELEASE_KIND.to_string(),
        name: release.name.clone(),
        namespace: release.namespace.clone(),
    }
}

/// Ordered actions that turn `now` into `then`.
fn diff(now: &StateView, then: &StateView, app_names: &[String]) -> Vec<PlannedAction> {
    let keys = now
        .order
        .iter()
        .chain(then.order.iter().filter(|key| !now.apps.contains_key(*key)))
        .filter(|(_, app)| app_names.is_empty() || app_names.contains(app));

    let mut deletes = Vec::new();
    let mut restores = Vec::new();
    let mut helm = Vec::new();

    for key in keys {
        let current = now.apps.get(key);
        let target = then.apps.get(key);

        let current_resources: HashSet<&ResourceRef> =
            current.map(|a| a.resources.iter().collect()).unwrap_or_default();
        let target_resources: HashSet<&ResourceRef> =
            target.map(|a| a.resources.iter().collect()).unwrap_or_default();

        if let Some(app) = current {
            for resource in app.resources.iter().filter(|r| !target_resources.contains(r)) {
                deletes.push(planned(key, delete(resource)));
            }
        }
        if let Some(app) = target {
            for resource in app.resources.iter().filter(|r| !current_resources.contains(r)) {
                restores.push(planned(key, restore(resource)));
            }
        }

        match (
            current.and_then(|a| a.release.as_ref()),
            target.and_then(|a| a.release.as_ref()),
        ) {
            (Some(from), Some(to)) if from.name == to.name && from.namespace == to.namespace => {
                if from.revision != to.revision {
                    helm.push(planned(
                        key,
                        RollbackAction::HelmRollback {
                            release: from.name.clone(),
                            namespace: from.namespace.clone(),
                            from_revision: from.revision,
                            to_revision: to.revision,
                        },
                    ));
                }
            }
            (from, to) => {
                if let Some(from) = from {
                    deletes.push(planned(key, delete(&release_ref(from))));
                }
                if let Some(to) = to {
                    restores.push(planned(key, restore(&release_ref(to))));
                }
            }
        }
    }

    deletes.into_iter().chain(restores).chain(helm).collect()
}

/// Apps whose actions all succeeded, and apps with at least one failure.
fn split_apps(outcomes: &[ActionOutcome]) -> (Vec<String>, Vec<String>) {
    let mut order: Vec<&str> = Vec::new();
    let mut failed: HashSet<&str> = HashSet::new();
    for outcome in outcomes {
        if !order.contains(&outcome.app.as_str()) {
            order.push(&outcome.app);
        }
        if !outcome.success {
            failed.insert(&outcome.app);
        }
    }

    let (bad, good): (Vec<&str>, Vec<&str>) =
        order.into_iter().partition(|app| failed.contains(app));
    (
        good.into_iter().map(String::from).collect(),
        bad.into_iter().map(String::from).collect(),
    )
}
