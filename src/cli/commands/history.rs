//! History command implementation.

use super::{engine_context, phase_status, run_status};
use crate::models::config::Settings;
use crate::{Error, Result};
use colored::Colorize;

/// List runs, or show one run in detail.
pub async fn history(
    workspace: Option<&str>,
    deployment_id: Option<&str>,
    limit: usize,
    settings: &Settings,
) -> Result<bool> {
    let ctx = engine_context(settings)?;

    if let Some(id) = deployment_id {
        let detail = ctx
            .store
            .detail(id)?
            .ok_or_else(|| Error::DeploymentNotFound(id.to_string()))?;
        let run = &detail.deployment;

        println!("{} {}", "[HISTORY] Deployment:".bold().cyan(), run.deployment_id);
        println!();
        println!("  {} {}", "Workspace:".bold(), run.workspace_name);
        println!("  {} {}", "Source:".bold(), run.source_path);
        println!("  {} {}", "Started:".bold(), run.timestamp.to_rfc3339());
        if let Some(done) = run.completed_at {
            println!("  {} {}", "Completed:".bold(), done.to_rfc3339());
        }
        println!("  {} {}", "Status:".bold(), run_status(run.status));
        if let Some(target) = &run.target_phase {
            println!("  {} {}", "Target phase:".bold(), target);
        }
        println!("  {} {}", "Dry run:".bold(), run.dry_run);
        if let Some(error) = &run.error_message {
            println!("  {} {}", "Error:".bold(), error.red());
        }
        println!();

        for phase in &detail.phases {
            println!(
                "  {:<4} {:<24} {:<14} {}/{} {}",
                phase.execution_order + 1,
                phase.phase_name,
                phase_status(phase.status),
                phase.completed_app_groups,
                phase.total_app_groups,
                phase
                    .duration_seconds
                    .map(|d| format!("({:.1}s)", d))
                    .unwrap_or_default()
            );
            let dependencies = phase.dependency_names();
            if !dependencies.is_empty() {
                println!("         {} {}", "after:".dimmed(), dependencies.join(", "));
            }
            println!(
                "         {} {}",
                "groups:".dimmed(),
                phase.app_group_names().join(", ")
            );
            for app in &phase.applied {
                if let Some(release) = &app.release {
                    println!(
                        "         {}/{} release {} r{}",
                        app.app_group, app.app, release.name, release.revision
                    );
                } else {
                    println!(
                        "         {}/{} {} resource(s)",
                        app.app_group,
                        app.app,
                        app.resources.len()
                    );
                }
            }
        }
        return Ok(true);
    }

    let runs = ctx.store.list(workspace, limit, 0)?;
    println!("{}", "[HISTORY] Deployments".bold().cyan());
    println!();

    if runs.is_empty() {
        println!("No deployments found.");
        return Ok(true);
    }

    println!(
        "{:<18} {:<20} {:<22} {:<18} {}",
        "Deployment ID".bold(),
        "Workspace".bold(),
        "Started".bold(),
        "Status".bold(),
        "Phases".bold()
    );
    println!("{}", "-".repeat(90));

    for run in runs {
        println!(
            "{:<18} {:<20} {:<22} {:<18} {}/{}{}",
            run.deployment_id,
            run.workspace_name,
            run.timestamp.format("%Y-%m-%d %H:%M:%S"),
            run_status(run.status),
            run.completed_phases,
            run.total_phases,
            if run.dry_run { " (dry run)" } else { "" }
        );
    }

    Ok(true)
}
