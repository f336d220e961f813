//! Status command implementation.

use super::{engine_context, phase_status, run_status};
use crate::core::scheduler;
use crate::core::workspace;
use crate::models::config::Settings;
use crate::utils::fs as fs_utils;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Show the schedule of a workspace and the state of its latest run.
pub async fn status(
    workspace_file: &Path,
    phase: Option<&str>,
    settings: &Settings,
) -> Result<bool> {
    fs_utils::ensure_file(workspace_file)?;
    let config = workspace::load_workspace(workspace_file)?;

    println!("{} {}", "[STATUS] Workspace:".bold().cyan(), config.name());
    if let Some(environment) = &config.metadata.environment {
        println!("  {} {}", "Environment:".bold(), environment);
    }
    println!();

    let all_units = workspace::phase_units(&config);
    let units = match phase {
        Some(target) => {
            let names = scheduler::with_dependencies(target, &all_units)?;
            scheduler::subset(&all_units, &names)
        }
        None => all_units,
    };

    println!("{}", "Schedule:".bold());
    for (index, level) in scheduler::levels(&units)?.iter().enumerate() {
        println!("  Level {}: {}", index, level.join(", "));
    }
    println!();

    let ctx = engine_context(settings)?;
    let latest = match ctx.store.latest(config.name())? {
        Some(run) => run,
        None => {
            println!("No deployments recorded for this workspace.");
            return Ok(true);
        }
    };

    let detail = match ctx.store.detail(&latest.deployment_id)? {
        Some(detail) => detail,
        None => return Ok(true),
    };

    println!("{}", "Latest run:".bold());
    println!("  {} {}", "Deployment ID:".bold(), latest.deployment_id);
    println!(
        "  {} {}",
        "Started:".bold(),
        latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {} {}{}",
        "Status:".bold(),
        run_status(latest.status),
        if latest.dry_run { " (dry run)" } else { "" }
    );
    println!(
        "  {} {} completed, {} failed, {} skipped of {}",
        "Phases:".bold(),
        latest.completed_phases,
        latest.failed_phases,
        latest.skipped_phases,
        latest.total_phases
    );
    println!();

    for record in detail
        .phases
        .iter()
        .filter(|p| phase.is_none() || units.iter().any(|u| u.name == p.phase_name))
    {
        println!(
            "  {:<24} {:<14} {}/{} app groups",
            record.phase_name,
            phase_status(record.status),
            record.completed_app_groups,
            record.total_app_groups
        );
        if let Some(error) = &record.error_message {
            println!("  {:<24} {}", "", error.dimmed());
        }
    }

    Ok(true)
}
