//! Deploy command implementation.

use super::{engine_context, phase_status, run_status};
use crate::core::executor::{
    AutoRollback, ExecuteOptions, ExecutionMode, ExecutionReport, PhaseExecutor,
};
use crate::core::workspace;
use crate::models::config::Settings;
use crate::utils::fs as fs_utils;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Flags of the deploy command.
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub phase: Option<String>,
    pub dry_run: bool,
    pub force: bool,
    pub skip_validation: bool,
    pub parallel: bool,
    pub max_workers: Option<usize>,
}

/// Deploy a workspace file.
pub async fn deploy(workspace_file: &Path, args: &DeployArgs, settings: &Settings) -> Result<bool> {
    println!("{}", "[DEPLOY] Workspace deployment".bold().cyan());
    println!();

    fs_utils::ensure_file(workspace_file)?;
    let config = workspace::load_workspace(workspace_file)?;

    if args.skip_validation {
        println!("{}", "[WARNING] Skipping workspace validation".yellow());
    } else {
        workspace::validate_workspace(&config)?;
    }

    let mode = if args.parallel {
        ExecutionMode::Parallel {
            max_workers: args.max_workers.unwrap_or(settings.max_workers),
        }
    } else {
        ExecutionMode::Sequential
    };

    println!("  {} {}", "Workspace:".bold(), config.name());
    println!("  {} {}", "File:".bold(), workspace_file.display());
    if let Some(phase) = &args.phase {
        println!("  {} {} (with dependencies)", "Phase:".bold(), phase);
    }
    match mode {
        ExecutionMode::Sequential => println!("  {} sequential", "Mode:".bold()),
        ExecutionMode::Parallel { max_workers } => {
            println!("  {} parallel ({} workers)", "Mode:".bold(), max_workers)
        }
    }
    if args.dry_run {
        println!("{}", "[DRY-RUN] No changes will be made to the cluster".bold().yellow());
    }
    println!();

    let ctx = engine_context(settings)?;
    let executor = PhaseExecutor::new(ctx).with_progress(true);
    let options = ExecuteOptions {
        source_path: workspace_file.display().to_string(),
        target_phase: args.phase.clone(),
        dry_run: args.dry_run,
        force: args.force,
        mode,
    };

    let report = executor.execute(&config, &options).await?;
    print_report(&report);

    Ok(report.success)
}

fn print_report(report: &ExecutionReport) {
    println!(
        "{:<6} {:<24} {:<14} {:<10} {}",
        "#".bold(),
        "Phase".bold(),
        "Status".bold(),
        "Groups".bold(),
        "Duration".bold()
    );
    println!("{}", "-".repeat(70));

    for phase in &report.phases {
        println!(
            "{:<6} {:<24} {:<14} {:<10} {}",
            phase.execution_order + 1,
            phase.phase,
            phase_status(phase.status),
            format!("{}/{}", phase.completed_app_groups, phase.total_app_groups),
            phase
                .duration_seconds
                .map(|d| format!("{:.1}s", d))
                .unwrap_or_else(|| "-".to_string())
        );
        if let Some(error) = &phase.error {
            println!("       {}", error.dimmed());
        }
    }

    println!();
    println!("  {} {}", "Deployment ID:".bold(), report.deployment_id);
    println!("  {} {}", "Status:".bold(), run_status(report.status));

    match &report.auto_rollback {
        Some(AutoRollback::Completed(result)) => {
            println!();
            let label = if result.dry_run {
                "[ROLLBACK] Simulated automatic rollback"
            } else {
                "[ROLLBACK] Automatic rollback"
            };
            println!(
                "{} to {}: {} action(s), {} error(s)",
                label.bold().yellow(),
                result.plan.target_deployment_id,
                result.rollbacks.len(),
                result.errors.len()
            );
            for error in &result.errors {
                println!("  {} {}", "x".red(), error);
            }
        }
        Some(AutoRollback::Unavailable(reason)) => {
            println!();
            println!("{} {}", "[ROLLBACK] Not performed:".bold().yellow(), reason);
        }
        None => {}
    }

    println!();
    if report.success {
        println!("{}", "[OK] Deployment complete".green());
    } else {
        println!("{}", "[FAILED] Deployment did not complete".red());
    }
}
