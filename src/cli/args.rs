//! Command line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Workspace Deployer - Deploy Kubernetes workspaces phase by phase
#[derive(Parser, Debug)]
#[command(name = "workspace-deployer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Deployment state file (overrides config.toml)
    #[arg(long, global = true, value_name = "STATE_FILE")]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a workspace
    Deploy {
        /// Path to the workspace file
        #[arg(value_name = "WORKSPACE_FILE")]
        workspace_file: PathBuf,

        /// Deploy only this phase and the phases it depends on
        #[arg(short, long)]
        phase: Option<String>,

        /// Dry run - schedule and record without touching the cluster
        #[arg(long)]
        dry_run: bool,

        /// Pass force to the deployer
        #[arg(long)]
        force: bool,

        /// Skip workspace validation
        #[arg(long)]
        skip_validation: bool,

        /// Run independent phases concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum concurrent phases (overrides config.toml)
        #[arg(long, value_name = "N")]
        max_workers: Option<usize>,
    },

    /// Show the schedule and latest run of a workspace
    Status {
        /// Path to the workspace file
        #[arg(value_name = "WORKSPACE_FILE")]
        workspace_file: PathBuf,

        /// Limit the report to one phase
        #[arg(short, long)]
        phase: Option<String>,
    },

    /// Show deployment history
    History {
        /// Only runs of this workspace
        #[arg(short, long)]
        workspace: Option<String>,

        /// Show one run in detail
        #[arg(long, value_name = "DEPLOYMENT_ID")]
        id: Option<String>,

        /// Maximum number of runs listed
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Roll a deployment back to an earlier successful one
    Rollback {
        /// Deployment to roll back
        #[arg(value_name = "DEPLOYMENT_ID")]
        deployment_id: String,

        /// Deployment to restore (default: the previous successful one)
        #[arg(short, long)]
        target: Option<String>,

        /// Only roll back these applications
        #[arg(long = "app", value_name = "APP")]
        apps: Vec<String>,

        /// Dry run - show the plan only
        #[arg(long)]
        dry_run: bool,

        /// Ignore pre-check failures
        #[arg(long)]
        force: bool,
    },

    /// List rollback points of a workspace
    Points {
        /// Workspace name
        #[arg(value_name = "WORKSPACE")]
        workspace: String,

        /// Maximum number of points
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
