//! Shell command: execute system commands in the workspace.
//!
//! Supports command allow/deny lists. Only offered when local command
//! execution is enabled, and only on a disk-backed workspace.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use thinkloop_core::command::{Command, CommandArgs, CommandContext, CommandHandler, CommandOutput};
use thinkloop_core::error::CommandError;
use thinkloop_core::schema::JsonSchema;
use tokio::process::Command as Process;
use tracing::{debug, warn};

use crate::str_arg;

/// Characters that chain, pipe, background or substitute commands.
const CONTROL_OPERATORS: &[&str] = &[";", "&", "|", "`", "$(", "\n", "\r"];

/// Which shell commands may run, judged by the program name of the first
/// word. Chained command lines are refused while either list is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellPolicy {
    /// If non-empty, only these commands are allowed.
    pub allowlist: Vec<String>,
    /// Never allowed, even when allowlisted.
    pub denylist: Vec<String>,
}

impl ShellPolicy {
    pub fn new(allowlist: Vec<String>, denylist: Vec<String>) -> Self {
        Self { allowlist, denylist }
    }

    /// `Err` with the reason when `command_line` may not run.
    pub fn check(&self, command_line: &str) -> Result<(), String> {
        let first = command_line.split_whitespace().next().unwrap_or("");
        if first.is_empty() {
            return Err("empty command".into());
        }
        if self.allowlist.is_empty() && self.denylist.is_empty() {
            return Ok(());
        }
        if let Some(op) = CONTROL_OPERATORS.iter().find(|op| command_line.contains(**op)) {
            return Err(format!(
                "Shell control operator '{}' is not allowed while command lists are set",
                op.escape_default()
            ));
        }
        let base = Path::new(first)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(first);
        if self.denylist.iter().any(|d| d == base) {
            return Err(format!("Command '{base}' is denied"));
        }
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|a| a == base) {
            return Err(format!("Command '{base}' is not in the allowlist"));
        }
        Ok(())
    }
}

pub struct ExecuteShell {
    policy: ShellPolicy,
}

#[async_trait]
impl CommandHandler for ExecuteShell {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let command_line = str_arg(&args, "execute_shell", "command_line")?;

        self.policy
            .check(command_line)
            .map_err(|reason| CommandError::OperationNotAllowed {
                command: "execute_shell".into(),
                reason,
            })?;

        let root = ctx
            .workspace
            .local_root()
            .ok_or_else(|| CommandError::OperationNotAllowed {
                command: "execute_shell".into(),
                reason: "the workspace is not on local disk".into(),
            })?
            .to_path_buf();

        debug!(command = %command_line, cwd = %root.display(), "Executing shell command");

        let mut process = if cfg!(target_os = "windows") {
            let mut p = Process::new("cmd");
            p.args(["/C", command_line]);
            p
        } else {
            let mut p = Process::new("sh");
            p.args(["-c", command_line]);
            p
        };
        // A timed-out or cancelled cycle drops this future; take the child with it
        process.current_dir(&root).kill_on_drop(true);

        let output = process
            .output()
            .await
            .map_err(|e| CommandError::ExecutionFailed {
                command: "execute_shell".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command_line, exit_code = code, "Shell command failed");
            return Ok(Value::String(format!(
                "[exit code: {code}]\nSTDOUT:\n{}\nSTDERR:\n{}",
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(Value::String(format!(
            "STDOUT:\n{}\nSTDERR:\n{}",
            stdout.trim(),
            stderr.trim()
        )))
    }
}

pub fn execute_shell(policy: ShellPolicy) -> Command {
    Command::new(
        "execute_shell",
        "Execute a shell command in the workspace and return its STDOUT and STDERR",
        ExecuteShell { policy },
    )
    .with_parameter(
        "command_line",
        JsonSchema::string()
            .describe("The command line to execute")
            .required(),
    )
    .available_when(|settings| settings.execute_local_commands)
}
