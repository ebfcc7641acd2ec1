// src/bindings/command.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{LocalsvcError, Result};
use crate::types::BoxFuture;

use super::{parse_env_lines, BindingResolver, BindingValues};

/// What secrets-listing CLIs print when a stage has nothing configured.
const NO_SECRETS_MARKER: &str = "No secrets set";

/// Runs a shell command and parses its stdout as `KEY=VALUE` lines.
///
/// Suited to secrets CLIs such as `sst secrets list env --stage dev`.
#[derive(Debug, Clone)]
pub struct CommandBindingResolver {
    cmd: String,
    cwd: PathBuf,
}

impl CommandBindingResolver {
    pub fn new(cmd: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.into(),
        }
    }
}

impl BindingResolver for CommandBindingResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<BindingValues>> {
        Box::pin(async move {
            let mut command = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&self.cmd);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&self.cmd);
                c
            };

            let output = command
                .current_dir(&self.cwd)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| {
                    LocalsvcError::BindingFetchError(format!("running `{}`: {e}", self.cmd))
                })?;

            if !output.status.success() {
                return Err(LocalsvcError::BindingFetchError(format!(
                    "`{}` exited with {}: {}",
                    self.cmd,
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim() == NO_SECRETS_MARKER {
                debug!(cmd = %self.cmd, "binding command reported no secrets");
                return Ok(BindingValues::new());
            }

            let values = parse_env_lines(&stdout);
            debug!(cmd = %self.cmd, keys = values.len(), "resolved bindings from command");
            Ok(values)
        })
    }
}
