// src/exec/command.rs

//! Subprocess-backed dispatcher.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::convoy::StrandedConvoy;
use crate::errors::{ConvoyError, Result};
use crate::exec::backend::{DispatchFuture, Dispatcher};
use crate::exec::task_runner::run_command;

/// Command templates, as configured under `[dispatch]`.
///
/// Placeholders: `{item}` and `{target}` in `dispatch`, `{convoy}` in
/// `check`. `stranded` takes none and must print the stranded JSON list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplates {
    pub dispatch: String,
    pub stranded: String,
    pub check: String,
}

/// Runs the configured templates through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    templates: CommandTemplates,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(templates: CommandTemplates, timeout: Duration) -> Self {
        Self { templates, timeout }
    }

    async fn run_checked(&self, label: &str, command: String, cancel: &CancellationToken) -> Result<String> {
        let out = run_command(label, &command, self.timeout, cancel).await?;
        if !out.success {
            return Err(ConvoyError::Other(anyhow::anyhow!(
                "'{label}' exited with code {}",
                out.exit_code
            )));
        }
        Ok(out.stdout)
    }
}

impl Dispatcher for CommandDispatcher {
    fn dispatch<'a>(
        &'a self,
        item: &'a str,
        target: &'a str,
        cancel: &'a CancellationToken,
    ) -> DispatchFuture<'a, ()> {
        Box::pin(async move {
            let command = render(&self.templates.dispatch, &[("item", item), ("target", target)])?;
            self.run_checked("dispatch", command, cancel)
                .await
                .map_err(|e| ConvoyError::Dispatch {
                    item: item.to_string(),
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
            info!(item, target, "item dispatched");
            Ok(())
        })
    }

    fn query_stranded<'a>(&'a self, cancel: &'a CancellationToken) -> DispatchFuture<'a, Vec<StrandedConvoy>> {
        Box::pin(async move {
            let stdout = self
                .run_checked("stranded", self.templates.stranded.clone(), cancel)
                .await?;
            parse_stranded(&stdout)
        })
    }

    fn check_convoy<'a>(&'a self, convoy: &'a str, cancel: &'a CancellationToken) -> DispatchFuture<'a, ()> {
        Box::pin(async move {
            let command = render(&self.templates.check, &[("convoy", convoy)])?;
            self.run_checked("check", command, cancel).await?;
            Ok(())
        })
    }
}

/// Substitute `{name}` placeholders. Values must be plain identifiers so
/// they can never change the shell command's structure.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = template.to_string();
    for (name, value) in vars {
        if !is_safe_value(value) {
            return Err(ConvoyError::InvalidInput(format!(
                "refusing to substitute unsafe {name} value {value:?}"
            )));
        }
        out = out.replace(&format!("{{{name}}}"), value);
    }
    Ok(out)
}

fn is_safe_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'))
}

/// Parse the stranded-discovery output.
///
/// Empty output and a bare `null` mean "nothing stranded". Anything that is
/// not a JSON array of entries fails with the first line of the raw output.
pub fn parse_stranded(raw: &str) -> Result<Vec<StrandedConvoy>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<StrandedConvoy>>(trimmed).map_err(|e| {
        let first_line = trimmed.lines().next().unwrap_or_default().to_string();
        warn!(first_line = %first_line, error = %e, "unparseable stranded output");
        ConvoyError::StrandedParse {
            first_line,
            reason: e.to_string(),
        }
    })
}
