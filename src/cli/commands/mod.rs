//! CLI command implementations.
//!
//! Every command returns `Ok(true)` when its outcome was fully successful.

pub mod deploy;
pub mod history;
pub mod points;
pub mod rollback;
pub mod status;

use crate::context::EngineContext;
use crate::core::state_store::StateStore;
use crate::deployer::HookDeployer;
use crate::models::config::Settings;
use crate::models::deployment::{PhaseStatus, RunStatus};
use crate::Result;
use colored::{ColoredString, Colorize};
use std::sync::Arc;

/// Open the state store and wire the hook deployer.
pub fn engine_context(settings: &Settings) -> Result<EngineContext> {
    let store = StateStore::open(&settings.state_file)?;
    let deployer = HookDeployer::from_settings(&settings.deployer);
    Ok(EngineContext::new(Arc::new(store), Arc::new(deployer)))
}

/// Run status colored for the terminal.
pub fn run_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Success => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::PartiallyFailed => text.yellow(),
        RunStatus::Cancelled => text.dimmed(),
        RunStatus::Pending | RunStatus::InProgress => text.cyan(),
    }
}

/// Phase status colored for the terminal.
pub fn phase_status(status: PhaseStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        PhaseStatus::Success => text.green(),
        PhaseStatus::Failed => text.red(),
        PhaseStatus::Skipped => text.yellow(),
        PhaseStatus::RolledBack => text.magenta(),
        PhaseStatus::Pending | PhaseStatus::InProgress => text.cyan(),
    }
}
