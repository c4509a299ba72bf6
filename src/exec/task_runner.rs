// src/exec/task_runner.rs

//! One-shot shell command runner.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ConvoyError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
}

/// Run `command` through the platform shell and collect its stdout.
///
/// - `timeout` bounds the whole run; the child is killed when it elapses.
/// - If `cancel` fires first the child is killed and an error is returned.
/// - stderr is consumed and logged at debug so buffers never fill.
pub async fn run_command(
    label: &str,
    command: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    info!(label, cmd = %command, "starting command");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for '{label}'"))?;

    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(label = %label, "stderr: {}", line);
            }
        });
    }

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout of '{label}' was not captured"))?;

    let run = async {
        let mut buf = String::new();
        stdout
            .read_to_string(&mut buf)
            .await
            .with_context(|| format!("reading stdout of '{label}'"))?;
        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of '{label}'"))?;
        Ok::<_, anyhow::Error>((status, buf))
    };

    tokio::select! {
        res = tokio::time::timeout(timeout, run) => {
            let (status, stdout) = res.map_err(|_| {
                warn!(label, ?timeout, "command timed out; killing");
                ConvoyError::Timeout(timeout)
            })??;
            let exit_code = status.code().unwrap_or(-1);
            info!(label, exit_code, success = status.success(), "command exited");
            Ok(CommandOutput {
                success: status.success(),
                exit_code,
                stdout,
            })
        }
        _ = cancel.cancelled() => {
            info!(label, "cancellation requested; killing command");
            Err(ConvoyError::Other(anyhow!("'{label}' cancelled")))
        }
    }
}
