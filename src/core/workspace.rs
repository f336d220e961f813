//! Workspace loading and validation.

use crate::core::scheduler::{self, Unit};
use crate::models::workspace::{PhaseConfig, WorkspaceConfig};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parse a workspace document from a YAML file.
pub fn load_workspace(path: &Path) -> Result<WorkspaceConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigValidation(format!("Cannot read workspace file {}: {}", path.display(), e))
    })?;
    parse_workspace(&content)
}

/// Parse a workspace document from YAML text.
pub fn parse_workspace(content: &str) -> Result<WorkspaceConfig> {
    let config: WorkspaceConfig = serde_yaml::from_str(content)?;
    tracing::debug!(
        "Loaded workspace '{}' with {} phases",
        config.name(),
        config.phases.len()
    );
    Ok(config)
}

/// Check a workspace before anything is scheduled.
pub fn validate_workspace(config: &WorkspaceConfig) -> Result<()> {
    if config.name().trim().is_empty() {
        return Err(Error::ConfigValidation("metadata.name is required".to_string()));
    }
    if config.phases.is_empty() {
        return Err(Error::ConfigValidation(format!(
            "Workspace '{}' defines no phases",
            config.name()
        )));
    }

    for (name, phase) in &config.phases {
        validate_phase(config, name, phase)?;
    }

    scheduler::validate(&phase_units(config))
}

fn validate_phase(config: &WorkspaceConfig, name: &str, phase: &PhaseConfig) -> Result<()> {
    if phase.app_groups.is_empty() {
        return Err(Error::ConfigValidation(format!(
            "Phase '{}' has no app groups",
            name
        )));
    }

    let mut seen = HashSet::new();
    for group in &phase.app_groups {
        if !seen.insert(group.as_str()) {
            return Err(Error::ConfigValidation(format!(
                "Phase '{}' lists app group '{}' more than once",
                name, group
            )));
        }
    }

    for dep in &phase.depends_on {
        if dep == name {
            return Err(Error::ConfigValidation(format!(
                "Phase '{}' depends on itself",
                name
            )));
        }
        if !config.phases.contains_key(dep) {
            return Err(Error::ConfigValidation(format!(
                "Phase '{}' depends on unknown phase '{}'",
                name, dep
            )));
        }
    }

    for (group, deps) in &phase.app_group_deps {
        for referenced in std::iter::once(group).chain(deps.iter()) {
            if !seen.contains(referenced.as_str()) {
                return Err(Error::ConfigValidation(format!(
                    "Phase '{}': appGroupDeps references unknown app group '{}'",
                    name, referenced
                )));
            }
        }
    }

    scheduler::validate(&app_group_units(phase))
}

/// Phases as scheduler units, in declaration order.
pub fn phase_units(config: &WorkspaceConfig) -> Vec<Unit> {
    config
        .phases
        .iter()
        .map(|(name, phase)| Unit::new(name.clone(), phase.depends_on.clone()))
        .collect()
}

/// A phase's app groups as scheduler units, in declaration order.
pub fn app_group_units(phase: &PhaseConfig) -> Vec<Unit> {
    phase
        .app_groups
        .iter()
        .map(|group| {
            let deps = phase.app_group_deps.get(group).cloned().unwrap_or_default();
            Unit::new(group.clone(), deps)
        })
        .collect()
}

/// Order in which a phase's app groups are deployed.
///
/// Declaration order, unless `appGroupDeps` imposes a sub-graph.
pub fn app_group_order(phase: &PhaseConfig) -> Result<Vec<String>> {
    if phase.app_group_deps.is_empty() {
        return Ok(phase.app_groups.clone());
    }
    scheduler::order(&app_group_units(phase))
}
