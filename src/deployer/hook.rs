//! Deployer backed by an external hook program.
//!
//! The hook is invoked as `<command> <args..> deploy` or
//! `<command> <args..> rollback`. The request (or action) is written to its
//! stdin as JSON. Exit status 0 means success; on deploy, stdout may carry a
//! JSON `DeployOutcome` describing the releases and resources now present.

use super::{AppGroupDeployer, DeployOutcome, DeployRequest};
use crate::models::config::DeployerSettings;
use crate::models::rollback::RollbackAction;
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs an external program for every deploy and rollback call.
#[derive(Debug, Clone)]
pub struct HookDeployer {
    command: Option<String>,
    args: Vec<String>,
}

/// Captured result of one hook invocation.
struct HookOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl HookDeployer {
    /// Create a hook deployer.
    pub fn new<S: Into<String>>(command: S, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
        }
    }

    /// Build from settings. A missing hook only fails once the hook is called,
    /// so dry runs and read-only commands work without one.
    pub fn from_settings(settings: &DeployerSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
        }
    }

    async fn invoke(&self, verb: &str, payload: &[u8]) -> Result<HookOutput> {
        let command = self.command.as_deref().ok_or_else(|| {
            Error::ConfigValidation(
                "No deployer hook configured. \
                 Set [deployer].command in config.toml or WORKSPACE_DEPLOYER_HOOK"
                    .to_string(),
            )
        })?;
        tracing::debug!("Running hook: {} {:?} {}", command, self.args, verb);

        let mut child = Command::new(command)
            .args(&self.args)
            .arg(verb)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::other(format!("Failed to start hook '{}': {}", command, e)))?;

        // Feed stdin while stdout and stderr drain, so a chatty hook cannot
        // block on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = payload.to_vec();
            tokio::spawn(async move {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The hook exited without reading all of its input.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("Hook '{}' closed stdin early", command);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(e) => return Err(Error::other(format!("Hook input writer failed: {}", e))),
            }
        }
        Ok(HookOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl AppGroupDeployer for HookDeployer {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let payload = serde_json::to_vec(request)?;
        let output = self.invoke("deploy", &payload).await?;

        if !output.success {
            return Err(Error::Execution {
                phase: request.phase.clone(),
                app_group: request.app_group.clone(),
                message: if output.stderr.is_empty() {
                    "hook exited with non-zero status".to_string()
                } else {
                    output.stderr
                },
            });
        }

        if output.stdout.trim().is_empty() {
            return Ok(DeployOutcome::default());
        }
        serde_json::from_str(&output.stdout).map_err(|e| Error::Execution {
            phase: request.phase.clone(),
            app_group: request.app_group.clone(),
            message: format!("hook printed an invalid outcome: {}", e),
        })
    }

    async fn apply(&self, action: &RollbackAction) -> Result<()> {
        let payload = serde_json::to_vec(action)?;
        let output = self.invoke("rollback", &payload).await?;

        if output.success {
            Ok(())
        } else {
            Err(Error::other(format!("{}: {}", action, output.stderr)))
        }
    }
}
