//! Workspace Deployer CLI
//!
//! Deploys multi-phase Kubernetes workspaces, records every run and rolls runs back.

use clap::Parser;
use std::process::ExitCode;
use workspace_deployer::cli::{
    args::{Cli, Commands},
    commands::{deploy, history, points, rollback, status},
};
use workspace_deployer::models::config;
use workspace_deployer::models::rollback::RollbackRequest;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let mut settings = config::load_settings();
    if let Some(state_file) = cli.state_file {
        settings.state_file = state_file;
    }

    // Run the appropriate command
    let success = match cli.command {
        Commands::Deploy {
            workspace_file,
            phase,
            dry_run,
            force,
            skip_validation,
            parallel,
            max_workers,
        } => {
            let args = deploy::DeployArgs {
                phase,
                dry_run,
                force,
                skip_validation,
                parallel,
                max_workers,
            };
            deploy::deploy(&workspace_file, &args, &settings).await?
        }

        Commands::Status { workspace_file, phase } => {
            status::status(&workspace_file, phase.as_deref(), &settings).await?
        }

        Commands::History { workspace, id, limit } => {
            history::history(workspace.as_deref(), id.as_deref(), limit, &settings).await?
        }

        Commands::Rollback {
            deployment_id,
            target,
            apps,
            dry_run,
            force,
        } => {
            let request = RollbackRequest {
                deployment_id,
                target_deployment_id: target,
                app_names: apps,
                dry_run,
                force,
            };
            rollback::rollback(&request, &settings).await?
        }

        Commands::Points { workspace, limit } => {
            points::points(&workspace, limit, &settings).await?
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize the logging system.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("workspace_deployer=debug")
    } else {
        EnvFilter::new("workspace_deployer=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
