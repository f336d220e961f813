//! Rollback points command implementation.

use super::engine_context;
use crate::core::rollback::RollbackEngine;
use crate::models::config::Settings;
use crate::Result;
use colored::Colorize;

/// List the successful runs a workspace can be rolled back to.
pub async fn points(workspace: &str, limit: usize, settings: &Settings) -> Result<bool> {
    let engine = RollbackEngine::new(engine_context(settings)?);
    let points = engine.list_points(workspace, limit)?;

    println!("{} {}", "[POINTS] Rollback points:".bold().cyan(), workspace);
    println!();

    if points.is_empty() {
        println!("No successful deployments recorded.");
        return Ok(true);
    }

    println!(
        "{:<18} {:<22} {:<8} {}",
        "Deployment ID".bold(),
        "Started".bold(),
        "Phases".bold(),
        "Target phase".bold()
    );
    println!("{}", "-".repeat(70));
    for point in points {
        println!(
            "{:<18} {:<22} {:<8} {}",
            point.deployment_id,
            point.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.completed_phases,
            point.target_phase.as_deref().unwrap_or("(all)")
        );
    }

    Ok(true)
}
