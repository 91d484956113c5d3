//! Shell commands run from the workspace

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::path_utils::validate_workspace_path;
use crate::{parse_args, ActionOutcome, ActionSpec, BoxError, Capability, ParamSpec, Params};

const MAX_OUTPUT: usize = 10_000;

/// `shell` provider
pub struct ShellProvider {
    timeout_secs: u64,
    workspace: PathBuf,
}

impl ShellProvider {
    pub fn new(timeout_secs: u64, workspace: PathBuf) -> Self {
        Self {
            timeout_secs,
            workspace,
        }
    }

    pub fn with_workspace(workspace: PathBuf) -> Self {
        Self::new(60, workspace)
    }

    async fn execute_command(&self, args: ExecArgs) -> Result<ActionOutcome, BoxError> {
        let working_dir = match args.working_dir {
            Some(dir) => match validate_workspace_path(&dir, &self.workspace).await {
                Ok(dir) => dir,
                Err(e) => {
                    return Ok(ActionOutcome::failure_with_details(
                        "working directory outside workspace",
                        e.to_string(),
                    ))
                }
            },
            None => self.workspace.clone(),
        };
        let timeout_secs = args.timeout_secs.unwrap_or(self.timeout_secs);

        debug!("◆ EXECUTING: {}", args.command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Ok(ActionOutcome::failure_with_details(
                        "command could not be started",
                        e.to_string(),
                    ))
                }
                Err(_) => {
                    return Ok(ActionOutcome::failure(format!(
                        "command timed out after {} seconds",
                        timeout_secs
                    )))
                }
            };

        let stdout = truncate(String::from_utf8_lossy(&output.stdout).to_string());
        let stderr = truncate(String::from_utf8_lossy(&output.stderr).to_string());
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            let details = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Ok(ActionOutcome::failure_with_details(
                format!("command exited with code {}", exit_code),
                details,
            ));
        }

        Ok(ActionOutcome::success_with_message(
            json!({ "stdout": stdout, "stderr": stderr, "exit_code": exit_code }),
            format!("exit 0, {} bytes of output", stdout.len()),
        ))
    }
}

#[derive(Deserialize)]
struct ExecArgs {
    command: String,
    working_dir: Option<String>,
    timeout_secs: Option<u64>,
}

fn truncate(text: String) -> String {
    if text.len() <= MAX_OUTPUT {
        return text;
    }
    let mut cut = MAX_OUTPUT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n◆ OUTPUT TRUNCATED: {} BYTES REMAINING",
        &text[..cut],
        text.len() - cut
    )
}

#[async_trait]
impl Capability for ShellProvider {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run shell commands with the workspace as working directory."
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![ActionSpec::new(
            "execute_command",
            "Run a command through `sh -c`. Non-zero exit is a failure.",
        )
        .param(ParamSpec::required("command", "Command line"))
        .param(ParamSpec::optional(
            "working_dir",
            "Directory inside the workspace",
        ))
        .param(ParamSpec::optional("timeout_secs", "Override the timeout"))]
    }

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionOutcome, BoxError> {
        match action {
            "execute_command" => self.execute_command(parse_args(params)?).await,
            other => Err(format!("◆ shell HAS NO ACTION '{}'", other).into()),
        }
    }
}
