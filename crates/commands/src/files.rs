//! Workspace file commands.
//!
//! All paths are relative to the agent workspace; the workspace itself
//! enforces confinement and forbidden paths.

use async_trait::async_trait;
use serde_json::Value;
use thinkloop_core::command::{Command, CommandArgs, CommandContext, CommandHandler, CommandOutput};
use thinkloop_core::error::{CommandError, WorkspaceError};
use thinkloop_core::schema::JsonSchema;
use tracing::debug;

use crate::str_arg;

/// Translate a workspace failure into the command taxonomy.
pub fn workspace_failure(command: &str, err: WorkspaceError) -> CommandError {
    match err {
        WorkspaceError::AccessDenied { .. } => CommandError::AccessDenied {
            command: command.to_string(),
            reason: err.to_string(),
        },
        WorkspaceError::NotFound(_) | WorkspaceError::Io { .. } => CommandError::ExecutionFailed {
            command: command.to_string(),
            reason: err.to_string(),
        },
    }
}

pub struct ReadFile;

#[async_trait]
impl CommandHandler for ReadFile {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let filename = str_arg(&args, "read_file", "filename")?;
        let text = ctx
            .workspace
            .read_text(filename)
            .await
            .map_err(|e| workspace_failure("read_file", e))?;
        debug!(filename, bytes = text.len(), "File read");
        Ok(Value::String(text))
    }
}

pub fn read_file() -> Command {
    Command::new("read_file", "Read an existing file", ReadFile).with_parameter(
        "filename",
        JsonSchema::string()
            .describe("The path of the file to read")
            .required(),
    )
}

pub struct WriteFile;

#[async_trait]
impl CommandHandler for WriteFile {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let filename = str_arg(&args, "write_file", "filename")?;
        let contents = str_arg(&args, "write_file", "contents")?;

        let exists = ctx
            .workspace
            .exists(filename)
            .await
            .map_err(|e| workspace_failure("write_file", e))?;
        if exists {
            let current = ctx
                .workspace
                .read(filename)
                .await
                .map_err(|e| workspace_failure("write_file", e))?;
            if current == contents.as_bytes() {
                return Err(CommandError::DuplicateOperation {
                    command: "write_file".into(),
                    reason: format!("{filename} already has exactly this content"),
                });
            }
        }

        ctx.workspace
            .write(filename, contents.as_bytes())
            .await
            .map_err(|e| workspace_failure("write_file", e))?;
        Ok(Value::String(format!("File {filename} has been written successfully.")))
    }
}

pub fn write_file() -> Command {
    Command::new(
        "write_file",
        "Write a file, creating it if necessary. If the file exists, it is overwritten",
        WriteFile,
    )
    .with_parameter(
        "filename",
        JsonSchema::string()
            .describe("The name of the file to write to")
            .required(),
    )
    .with_parameter(
        "contents",
        JsonSchema::string()
            .describe("The contents to write to the file")
            .required(),
    )
}

pub struct ListFolder;

#[async_trait]
impl CommandHandler for ListFolder {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let folder = str_arg(&args, "list_folder", "folder")?;
        let files = ctx
            .workspace
            .list(folder)
            .await
            .map_err(|e| workspace_failure("list_folder", e))?;
        Ok(Value::Array(files.into_iter().map(Value::String).collect()))
    }
}

pub fn list_folder() -> Command {
    Command::new("list_folder", "List the items in a folder", ListFolder).with_parameter(
        "folder",
        JsonSchema::string()
            .describe("The folder to list files in")
            .required(),
    )
}

pub struct DeleteFile;

#[async_trait]
impl CommandHandler for DeleteFile {
    async fn call(&self, args: CommandArgs, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let filename = str_arg(&args, "delete_file", "filename")?;
        ctx.workspace
            .delete(filename)
            .await
            .map_err(|e| workspace_failure("delete_file", e))?;
        Ok(Value::String(format!("File {filename} has been deleted successfully.")))
    }
}

pub fn delete_file() -> Command {
    Command::new("delete_file", "Delete a file", DeleteFile).with_parameter(
        "filename",
        JsonSchema::string()
            .describe("The name of the file to delete")
            .required(),
    )
}
