//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workspace_deployer::core::state_store::StateStore;
use workspace_deployer::deployer::{AppGroupDeployer, DeployOutcome, DeployRequest};
use workspace_deployer::models::deployment::{AppState, ReleaseState, ResourceRef};
use workspace_deployer::models::rollback::RollbackAction;
use workspace_deployer::models::workspace::{
    GlobalSettings, OnFailure, PhaseConfig, WorkspaceConfig, WorkspaceMetadata,
};
use workspace_deployer::{EngineContext, Error, Result};

/// Deployer that records calls and reports one app per app group.
///
/// Each app group `g` yields app `g-app` with Helm release `g-app` at the
/// configured revision and a ConfigMap `g-config-r<revision>`.
pub struct MockDeployer {
    revision: u32,
    report_state: bool,
    delay: Option<Duration>,
    fail_groups: HashSet<String>,
    fail_releases: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    pub actions: Mutex<Vec<RollbackAction>>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockDeployer {
    pub fn new(revision: u32) -> Self {
        Self {
            revision,
            report_state: true,
            delay: None,
            fail_groups: HashSet::new(),
            fail_releases: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Fail every deploy of this app group.
    pub fn failing(mut self, group: &str) -> Self {
        self.fail_groups.insert(group.to_string());
        self
    }

    /// Fail every rollback action touching this release or resource name.
    pub fn failing_action(mut self, name: &str) -> Self {
        self.fail_releases.insert(name.to_string());
        self
    }

    /// Report nothing about what was applied.
    pub fn without_state(mut self) -> Self {
        self.report_state = false;
        self
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<RollbackAction> {
        self.actions.lock().unwrap().clone()
    }

    fn app_state(&self, group: &str) -> AppState {
        let app = format!("{}-app", group);
        AppState {
            app_group: group.to_string(),
            app: app.clone(),
            release: Some(ReleaseState {
                name: app,
                namespace: "default".to_string(),
                revision: self.revision,
            }),
            resources: vec![ResourceRef {
                kind: "ConfigMap".to_string(),
                name: format!("{}-config-r{}", group, self.revision),
                namespace: "default".to_string(),
            }],
        }
    }
}

#[async_trait]
impl AppGroupDeployer for MockDeployer {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}/{}", request.phase, request.app_group));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_groups.contains(&request.app_group) {
            return Err(Error::Execution {
                phase: request.phase.clone(),
                app_group: request.app_group.clone(),
                message: "simulated failure".to_string(),
            });
        }

        Ok(DeployOutcome {
            apps: if self.report_state {
                vec![self.app_state(&request.app_group)]
            } else {
                vec![]
            },
        })
    }

    async fn apply(&self, action: &RollbackAction) -> Result<()> {
        self.actions.lock().unwrap().push(action.clone());
        let name = match action {
            RollbackAction::HelmRollback { release, .. } => release,
            RollbackAction::ResourceDelete { name, .. } => name,
            RollbackAction::ResourceRestore { name, .. } => name,
        };
        if self.fail_releases.contains(name) {
            return Err(Error::other(format!("simulated failure on {}", name)));
        }
        Ok(())
    }
}

pub fn context(store: &Arc<StateStore>, deployer: &Arc<MockDeployer>) -> EngineContext {
    EngineContext::new(store.clone(), deployer.clone())
}

/// Build a workspace from `(phase, depends_on, app_groups)` triples.
pub fn workspace(
    name: &str,
    on_failure: OnFailure,
    phases: &[(&str, &[&str], &[&str])],
) -> WorkspaceConfig {
    let phases: IndexMap<String, PhaseConfig> = phases
        .iter()
        .map(|(phase, deps, groups)| {
            (
                phase.to_string(),
                PhaseConfig {
                    source: format!("{}/groups.yaml", phase),
                    app_groups: groups.iter().map(|g| g.to_string()).collect(),
                    depends_on: deps.iter().map(|d| d.to_string()).collect(),
                    ..Default::default()
                },
            )
        })
        .collect();

    WorkspaceConfig {
        api_version: "v1".to_string(),
        metadata: WorkspaceMetadata {
            name: name.to_string(),
            ..Default::default()
        },
        settings: GlobalSettings {
            on_failure,
            ..Default::default()
        },
        phases,
    }
}

/// infra -> data -> apps, and infra -> monitoring.
pub fn platform(on_failure: OnFailure) -> WorkspaceConfig {
    workspace(
        "platform",
        on_failure,
        &[
            ("infra", &[], &["network"]),
            ("data", &["infra"], &["postgres"]),
            ("apps", &["data"], &["backend"]),
            ("monitoring", &["infra"], &["prometheus"]),
        ],
    )
}
