//! Commands that manage the agent context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thinkloop_core::command::{Command, CommandArgs, CommandContext, CommandHandler, CommandOutput};
use thinkloop_core::context::AgentContext;
use thinkloop_core::error::CommandError;
use thinkloop_core::schema::JsonSchema;

use crate::files::workspace_failure;
use crate::str_arg;

pub struct OpenFile {
    context: Arc<AgentContext>,
}

#[async_trait]
impl CommandHandler for OpenFile {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let path = str_arg(&args, "open_file", "file_path")?;
        let content = ctx
            .workspace
            .read_text(path)
            .await
            .map_err(|e| workspace_failure("open_file", e))?;

        let message = if self.context.add(path, content) {
            format!("File {path} has been opened and added to the context.")
        } else {
            format!("File {path} is already open in the context.")
        };
        Ok(Value::String(message))
    }
}

pub fn open_file(context: Arc<AgentContext>) -> Command {
    Command::new(
        "open_file",
        "Open a file for editing or continued viewing; keeps its contents visible in your context",
        OpenFile { context },
    )
    .with_parameter(
        "file_path",
        JsonSchema::string()
            .describe("The path of the file to open")
            .required(),
    )
}

pub struct CloseContextItem {
    context: Arc<AgentContext>,
}

#[async_trait]
impl CommandHandler for CloseContextItem {
    async fn call(&self, args: CommandArgs, _ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let number = args
            .get("number")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| CommandError::InvalidArguments {
                command: "close_context_item".into(),
                fields: vec!["number: expected a positive integer".into()],
            })?;

        let closed = usize::try_from(number)
            .ok()
            .and_then(|n| self.context.close(n))
            .ok_or_else(|| CommandError::ExecutionFailed {
                command: "close_context_item".into(),
                reason: format!("There is no context item with number {number}"),
            })?;
        Ok(Value::String(format!("Context item {number} ({}) was closed.", closed.source)))
    }
}

pub fn close_context_item(context: Arc<AgentContext>) -> Command {
    Command::new(
        "close_context_item",
        "Close an item in your context when you no longer need it",
        CloseContextItem { context },
    )
    .with_parameter(
        "number",
        JsonSchema::integer()
            .describe("The number of the context item to close")
            .required(),
    )
}
