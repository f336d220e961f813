//! Integration tests for workspace loading and validation.

use std::path::Path;
use tempfile::TempDir;
use workspace_deployer::core::scheduler;
use workspace_deployer::core::workspace::{
    load_workspace, parse_workspace, phase_units, validate_workspace,
};
use workspace_deployer::models::workspace::{OnFailure, DEFAULT_TIMEOUT_SECONDS};
use workspace_deployer::Error;

const WORKSPACE: &str = r#"
version: v1
metadata:
  name: platform
  environment: staging
  tags: [core, k8s]
global:
  kubeconfig: /home/deploy/.kube/config
  onFailure: rollback
  helmRepos:
    bitnami: https://charts.bitnami.com/bitnami
phases:
  infra:
    description: Base infrastructure
    source: infra/groups.yaml
    appGroups: [network, storage]
  data:
    source: data/groups.yaml
    appGroups: [postgres]
    dependsOn: [infra]
    timeoutSeconds: 900
    onFailure: continue
"#;

fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("workspace.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

fn invalid(content: &str) -> String {
    let config = parse_workspace(content).unwrap();
    match validate_workspace(&config) {
        Err(e) => e.to_string(),
        Ok(()) => panic!("expected validation to fail"),
    }
}

// ========== LOADING TESTS ==========

#[test]
fn test_load_workspace_with_aliases() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_workspace(&write(&temp_dir, WORKSPACE)).unwrap();

    assert_eq!(config.api_version, "v1");
    assert_eq!(config.name(), "platform");
    assert_eq!(config.metadata.environment.as_deref(), Some("staging"));
    assert_eq!(config.settings.on_failure, OnFailure::Rollback);
    assert_eq!(config.settings.helm_repos.len(), 1);

    assert_eq!(config.effective_on_failure("infra"), OnFailure::Rollback);
    assert_eq!(config.effective_on_failure("data"), OnFailure::Continue);
    assert_eq!(config.effective_timeout("infra"), DEFAULT_TIMEOUT_SECONDS);
    assert_eq!(config.effective_timeout("data"), 900);

    validate_workspace(&config).unwrap();
}

#[test]
fn test_missing_file() {
    let result = load_workspace(Path::new("/nonexistent/workspace.yaml"));
    assert!(matches!(result, Err(Error::ConfigValidation(_))));
}

#[test]
fn test_unknown_policy_is_a_parse_error() {
    let content = WORKSPACE.replace("onFailure: continue", "onFailure: retry");
    assert!(matches!(parse_workspace(&content), Err(Error::Yaml(_))));
}

#[test]
fn test_phases_keep_declaration_order() {
    let content = r#"
metadata:
  name: ordered
phases:
  zeta:
    appGroups: [z]
  alpha:
    appGroups: [a]
  mid:
    appGroups: [m]
    dependsOn: [alpha]
"#;
    let config = parse_workspace(content).unwrap();
    let names: Vec<&str> = config.phases.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);

    // Independent phases are scheduled as declared, not alphabetically.
    let units = phase_units(&config);
    assert_eq!(scheduler::order(&units).unwrap(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(scheduler::levels(&units).unwrap()[0], vec!["zeta", "alpha"]);
}

// ========== VALIDATION TESTS ==========

#[test]
fn test_requires_phases() {
    let message = invalid("metadata:\n  name: empty\n");
    assert!(message.contains("no phases"));
}

#[test]
fn test_requires_app_groups() {
    let message = invalid(
        "metadata:\n  name: ws\nphases:\n  infra:\n    source: x\n    appGroups: []\n",
    );
    assert!(message.contains("infra"));
}

#[test]
fn test_rejects_unknown_phase_dependency() {
    let content = WORKSPACE.replace("dependsOn: [infra]", "dependsOn: [network]");
    let message = invalid(&content);
    assert!(message.contains("unknown phase 'network'"));
}

#[test]
fn test_rejects_self_dependency() {
    let content = WORKSPACE.replace("dependsOn: [infra]", "dependsOn: [data]");
    assert!(invalid(&content).contains("depends on itself"));
}

#[test]
fn test_rejects_duplicate_app_group() {
    let content = WORKSPACE.replace("[network, storage]", "[network, network]");
    assert!(invalid(&content).contains("more than once"));
}

#[test]
fn test_rejects_phase_cycle() {
    let content = WORKSPACE.replace(
        "appGroups: [network, storage]",
        "appGroups: [network, storage]\n    dependsOn: [data]",
    );
    let config = parse_workspace(&content).unwrap();
    assert!(matches!(
        validate_workspace(&config),
        Err(Error::CircularDependency { .. })
    ));
}

#[test]
fn test_rejects_app_group_cycle() {
    let content = WORKSPACE.replace(
        "appGroups: [network, storage]",
        "appGroups: [network, storage]\n    appGroupDeps:\n      \
         network: [storage]\n      storage: [network]",
    );
    let config = parse_workspace(&content).unwrap();
    match validate_workspace(&config) {
        Err(Error::CircularDependency { cycle }) => {
            assert!(cycle.contains(&"network".to_string()));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}
