//! Integration tests for the rollback engine.
//!
//! Tests cover:
//! - Target resolution from history
//! - Plan construction and app filtering
//! - Dry runs and plan determinism
//! - Partial failure aggregation and pre-checks

mod common;

use common::{context, platform, workspace, MockDeployer};
use std::sync::Arc;
use workspace_deployer::core::executor::{ExecuteOptions, ExecutionReport, PhaseExecutor};
use workspace_deployer::core::rollback::RollbackEngine;
use workspace_deployer::core::state_store::StateStore;
use workspace_deployer::models::deployment::PhaseStatus;
use workspace_deployer::models::rollback::{RollbackAction, RollbackRequest};
use workspace_deployer::models::workspace::{OnFailure, WorkspaceConfig};
use workspace_deployer::Error;

async fn deploy(
    store: &Arc<StateStore>,
    deployer: MockDeployer,
    config: &WorkspaceConfig,
) -> ExecutionReport {
    let deployer = Arc::new(deployer);
    PhaseExecutor::new(context(store, &deployer))
        .execute(
            config,
            &ExecuteOptions {
                source_path: "platform.yaml".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

/// Two successful runs, depA at revision 1 and depB at revision 2.
async fn history(store: &Arc<StateStore>) -> (String, String) {
    let config = platform(OnFailure::Stop);
    let dep_a = deploy(store, MockDeployer::new(1), &config).await;
    let dep_b = deploy(store, MockDeployer::new(2), &config).await;
    assert!(dep_a.success && dep_b.success);
    (dep_a.deployment_id, dep_b.deployment_id)
}

fn request(deployment_id: &str) -> RollbackRequest {
    RollbackRequest {
        deployment_id: deployment_id.to_string(),
        ..Default::default()
    }
}

// ========== TARGET RESOLUTION TESTS ==========

#[tokio::test]
async fn test_target_defaults_to_previous_success() {
    let store = Arc::new(StateStore::in_memory());
    let (dep_a, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let plan = engine.plan(&request(&dep_b)).unwrap();
    assert_eq!(plan.deployment_id, dep_b);
    assert_eq!(plan.target_deployment_id, dep_a);
}

#[tokio::test]
async fn test_unknown_deployment_is_a_rollback_error() {
    let store = Arc::new(StateStore::in_memory());
    let deployer = Arc::new(MockDeployer::new(1));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let result = engine.rollback(&request("0000000000000000")).await;
    assert!(matches!(result, Err(Error::Rollback(_))));
    assert!(deployer.actions().is_empty());
}

#[tokio::test]
async fn test_no_eligible_target() {
    let store = Arc::new(StateStore::in_memory());
    let only = deploy(&store, MockDeployer::new(1), &platform(OnFailure::Stop)).await;
    let deployer = Arc::new(MockDeployer::new(1));
    let engine = RollbackEngine::new(context(&store, &deployer));

    match engine.rollback(&request(&only.deployment_id)).await {
        Err(Error::Rollback(message)) => assert!(message.contains("no eligible rollback target")),
        other => panic!("expected rollback error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_runs_are_not_targets() {
    let store = Arc::new(StateStore::in_memory());
    let config = platform(OnFailure::Stop);
    let good = deploy(&store, MockDeployer::new(1), &config).await;
    let bad = deploy(&store, MockDeployer::new(2).failing("postgres"), &config).await;
    let latest = deploy(&store, MockDeployer::new(3), &config).await;
    assert!(!bad.success);

    let deployer = Arc::new(MockDeployer::new(3));
    let engine = RollbackEngine::new(context(&store, &deployer));
    let plan = engine.plan(&request(&latest.deployment_id)).unwrap();
    assert_eq!(plan.target_deployment_id, good.deployment_id);

    // Explicitly naming the failed run needs force.
    let explicit = RollbackRequest {
        target_deployment_id: Some(bad.deployment_id.clone()),
        ..request(&latest.deployment_id)
    };
    assert!(matches!(engine.plan(&explicit), Err(Error::Rollback(_))));
    let forced = RollbackRequest {
        force: true,
        ..explicit
    };
    assert_eq!(engine.plan(&forced).unwrap().target_deployment_id, bad.deployment_id);
}

#[tokio::test]
async fn test_target_from_another_workspace_is_rejected() {
    let store = Arc::new(StateStore::in_memory());
    let mine = deploy(&store, MockDeployer::new(1), &platform(OnFailure::Stop)).await;
    let mut other_config = platform(OnFailure::Stop);
    other_config.metadata.name = "other".to_string();
    let other = deploy(&store, MockDeployer::new(1), &other_config).await;

    let deployer = Arc::new(MockDeployer::new(1));
    let engine = RollbackEngine::new(context(&store, &deployer));
    let req = RollbackRequest {
        target_deployment_id: Some(other.deployment_id),
        force: true,
        ..request(&mine.deployment_id)
    };
    assert!(matches!(engine.plan(&req), Err(Error::Rollback(_))));
}

// ========== PLAN TESTS ==========

#[tokio::test]
async fn test_plan_orders_deletes_before_restores_before_helm() {
    let store = Arc::new(StateStore::in_memory());
    let (_, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let plan = engine.plan(&request(&dep_b)).unwrap();

    // Four apps: one delete, one restore and one helm rollback each.
    assert_eq!(plan.actions.len(), 12);
    let kinds: Vec<&str> = plan
        .actions
        .iter()
        .map(|p| match p.action {
            RollbackAction::ResourceDelete { .. } => "delete",
            RollbackAction::ResourceRestore { .. } => "restore",
            RollbackAction::HelmRollback { .. } => "helm",
        })
        .collect();
    assert_eq!(&kinds[0..4], &["delete"; 4]);
    assert_eq!(&kinds[4..8], &["restore"; 4]);
    assert_eq!(&kinds[8..12], &["helm"; 4]);

    // Apps follow phase execution order.
    let apps: Vec<&str> = plan.actions[8..].iter().map(|p| p.app.as_str()).collect();
    assert_eq!(apps, vec!["network-app", "postgres-app", "backend-app", "prometheus-app"]);
    assert_eq!(
        plan.actions[0].action,
        RollbackAction::ResourceDelete {
            kind: "ConfigMap".to_string(),
            name: "network-config-r2".to_string(),
            namespace: "default".to_string(),
        }
    );
}

#[tokio::test]
async fn test_app_filter_limits_plan() {
    let store = Arc::new(StateStore::in_memory());
    let (_, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let req = RollbackRequest {
        app_names: vec!["backend-app".to_string()],
        ..request(&dep_b)
    };
    let result = engine.rollback(&req).await.unwrap();

    assert_eq!(result.plan.actions.len(), 3);
    assert!(result.plan.actions.iter().all(|p| p.app == "backend-app"));
    assert_eq!(result.succeeded_apps, vec!["backend-app"]);

    // Only the phase whose apps were all in scope is marked.
    let detail = store.detail(&dep_b).unwrap().unwrap();
    let rolled_back: Vec<&str> = detail
        .phases
        .iter()
        .filter(|p| p.status == PhaseStatus::RolledBack)
        .map(|p| p.phase_name.as_str())
        .collect();
    assert_eq!(rolled_back, vec!["apps"]);
}

#[tokio::test]
async fn test_unfinished_app_groups_of_failed_phase_are_left_alone() {
    let store = Arc::new(StateStore::in_memory());
    let config = workspace(
        "platform",
        OnFailure::Stop,
        &[("infra", &[], &["network"]), ("data", &["infra"], &["postgres", "cache"])],
    );
    let good = deploy(&store, MockDeployer::new(1), &config).await;
    let bad = deploy(&store, MockDeployer::new(2).failing("cache"), &config).await;
    assert!(good.success && !bad.success);

    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));
    let plan = engine.plan(&request(&bad.deployment_id)).unwrap();

    // network and postgres were redeployed; cache never reported new state.
    assert!(plan.actions.iter().all(|p| p.app != "cache-app"));
    let apps: Vec<&str> = plan.actions.iter().map(|p| p.app.as_str()).collect();
    assert_eq!(apps.iter().filter(|a| **a == "network-app").count(), 3);
    assert_eq!(apps.iter().filter(|a| **a == "postgres-app").count(), 3);
    let postgres = RollbackAction::HelmRollback {
        release: "postgres-app".to_string(),
        namespace: "default".to_string(),
        from_revision: 2,
        to_revision: 1,
    };
    assert!(plan.actions.iter().any(|p| p.action == postgres));
}

// ========== DRY RUN TESTS ==========

#[tokio::test]
async fn test_dry_run_is_pure_and_repeatable() {
    let store = Arc::new(StateStore::in_memory());
    let (dep_a, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let before_b = store.detail(&dep_b).unwrap().unwrap();
    let before_a = store.detail(&dep_a).unwrap().unwrap();

    let req = RollbackRequest {
        dry_run: true,
        ..request(&dep_b)
    };
    let first = engine.rollback(&req).await.unwrap();
    let second = engine.rollback(&req).await.unwrap();

    assert!(first.dry_run && first.success);
    assert_eq!(
        serde_json::to_string(&first.plan).unwrap(),
        serde_json::to_string(&second.plan).unwrap()
    );
    assert!(deployer.actions().is_empty());
    assert_eq!(store.detail(&dep_b).unwrap().unwrap(), before_b);
    assert_eq!(store.detail(&dep_a).unwrap().unwrap(), before_a);
}

// ========== EXECUTION TESTS ==========

#[tokio::test]
async fn test_real_rollback_applies_plan_and_marks_phases() {
    let store = Arc::new(StateStore::in_memory());
    let (_, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let result = engine.rollback(&request(&dep_b)).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    let planned: Vec<RollbackAction> =
        result.plan.actions.iter().map(|p| p.action.clone()).collect();
    assert_eq!(deployer.actions(), planned);
    assert_eq!(result.succeeded_apps.len(), 4);

    let detail = store.detail(&dep_b).unwrap().unwrap();
    assert!(detail.phases.iter().all(|p| p.status == PhaseStatus::RolledBack));
}

#[tokio::test]
async fn test_failed_actions_do_not_abort_the_rest() {
    let store = Arc::new(StateStore::in_memory());
    let (_, dep_b) = history(&store).await;
    let deployer = Arc::new(MockDeployer::new(2).failing_action("postgres-app"));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let result = engine.rollback(&request(&dep_b)).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("postgres-app"));
    assert_eq!(deployer.actions().len(), result.plan.actions.len());
    assert_eq!(result.failed_apps, vec!["postgres-app"]);
    assert_eq!(result.succeeded_apps, vec!["network-app", "backend-app", "prometheus-app"]);

    // A partial rollback leaves the phase records alone.
    let detail = store.detail(&dep_b).unwrap().unwrap();
    assert!(detail.phases.iter().all(|p| p.status == PhaseStatus::Success));
}

// ========== PRE-CHECK TESTS ==========

#[tokio::test]
async fn test_missing_revision_metadata_requires_force() {
    let store = Arc::new(StateStore::in_memory());
    let config = platform(OnFailure::Stop);
    deploy(&store, MockDeployer::new(1).without_state(), &config).await;
    let dep_b = deploy(&store, MockDeployer::new(2), &config).await;

    let deployer = Arc::new(MockDeployer::new(2));
    let engine = RollbackEngine::new(context(&store, &deployer));

    match engine.rollback(&request(&dep_b.deployment_id)).await {
        Err(Error::Rollback(message)) => assert!(message.contains("metadata missing")),
        other => panic!("expected rollback error, got {:?}", other),
    }
    assert!(deployer.actions().is_empty());

    let forced = RollbackRequest {
        force: true,
        dry_run: true,
        ..request(&dep_b.deployment_id)
    };
    let result = engine.rollback(&forced).await.unwrap();
    assert!(result.success);
}

// ========== ROLLBACK POINT TESTS ==========

#[tokio::test]
async fn test_list_points_newest_first() {
    let store = Arc::new(StateStore::in_memory());
    let config = platform(OnFailure::Stop);
    let first = deploy(&store, MockDeployer::new(1), &config).await;
    deploy(&store, MockDeployer::new(2).failing("network"), &config).await;
    let third = deploy(&store, MockDeployer::new(3), &config).await;

    let deployer = Arc::new(MockDeployer::new(3));
    let engine = RollbackEngine::new(context(&store, &deployer));

    let points = engine.list_points("platform", 10).unwrap();
    let ids: Vec<&str> = points.iter().map(|p| p.deployment_id.as_str()).collect();
    assert_eq!(ids, vec![third.deployment_id.as_str(), first.deployment_id.as_str()]);
    assert_eq!(points[0].completed_phases, 4);

    assert_eq!(engine.list_points("platform", 1).unwrap().len(), 1);
    assert!(engine.list_points("unknown", 10).unwrap().is_empty());
}
