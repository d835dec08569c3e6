//! Run a queued command through the platform shell

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run `command` until the shell exits. Output goes straight to our own
/// stdout/stderr, so a background job started by the command (`app &`) does
/// not hold us up. A non-zero exit is an outcome, not an error; only a failure
/// to spawn is.
pub async fn run_shell(command: &str) -> Result<CommandOutcome> {
    debug!("Running shell command: {}", command);
    let status = shell_command(command)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to run command: {}", command))?;

    let outcome = CommandOutcome {
        success: status.success(),
        exit_code: status.code(),
    };
    if !outcome.success {
        warn!("Command exited with {}: {}", status, command);
    }
    Ok(outcome)
}
