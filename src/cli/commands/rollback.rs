//! Rollback command implementation.

use super::engine_context;
use crate::core::rollback::RollbackEngine;
use crate::models::config::Settings;
use crate::models::rollback::RollbackRequest;
use crate::Result;
use colored::Colorize;

/// Roll a deployment back and print the outcome.
pub async fn rollback(request: &RollbackRequest, settings: &Settings) -> Result<bool> {
    println!("{}", "[ROLLBACK] Rollback command".bold().cyan());
    println!();

    let engine = RollbackEngine::new(engine_context(settings)?).with_progress(true);

    if request.dry_run {
        println!("{}", "[DRY-RUN] Showing what would be done:".bold().yellow());
    } else {
        println!("{}", "[WARNING] This will change the cluster!".bold().yellow());
    }
    println!();

    let result = engine.rollback(request).await?;

    println!("  {} {}", "From:".bold(), result.plan.deployment_id);
    println!("  {} {}", "To:".bold(), result.plan.target_deployment_id);
    println!("  {} {}", "Actions:".bold(), result.plan.actions.len());
    println!();

    if result.plan.is_empty() {
        println!("{}", "[OK] Nothing to roll back".green());
        return Ok(true);
    }

    for outcome in &result.rollbacks {
        let mark = if result.dry_run {
            "[DRY RUN]".yellow()
        } else if outcome.success {
            "ok".green()
        } else {
            "x".red()
        };
        println!("  {} {}/{}: {}", mark, outcome.app_group, outcome.app, outcome.action);
    }
    println!();

    if !result.succeeded_apps.is_empty() {
        println!("  {} {}", "Succeeded:".bold(), result.succeeded_apps.join(", "));
    }
    if !result.failed_apps.is_empty() {
        println!("  {} {}", "Failed:".bold(), result.failed_apps.join(", ").red());
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
    println!();

    if result.success {
        if result.dry_run {
            println!("{}", "[OK] Dry run complete - no changes were made".green());
        } else {
            println!("{}", "[OK] Rollback complete".green());
        }
    } else {
        println!(
            "{}",
            format!("[FAILED] {} action(s) failed", result.errors.len()).red()
        );
    }

    Ok(result.success)
}
