use std::sync::Arc;

use serde_json::Value;
use thinkloop_core::command::{Command, CommandArgs, CommandContext, CommandOutput, CommandRegistry};
use thinkloop_core::error::CommandError;
use thinkloop_core::workspace::Workspace;
use thinkloop_core::AgentSettings;
use thinkloop_storage::InMemoryWorkspace;

pub fn ctx_with(workspace: Arc<dyn Workspace>) -> CommandContext {
    CommandContext {
        agent_id: "test-agent".into(),
        workspace,
        settings: AgentSettings::default(),
    }
}

pub fn memory_ctx() -> (Arc<InMemoryWorkspace>, CommandContext) {
    let ws = Arc::new(InMemoryWorkspace::new());
    let ctx = ctx_with(ws.clone());
    (ws, ctx)
}

pub fn args(value: Value) -> CommandArgs {
    value.as_object().cloned().unwrap_or_default()
}

/// Resolve and invoke `command` the way the agent loop does.
pub async fn run(
    command: Command,
    args: CommandArgs,
    ctx: CommandContext,
) -> Result<CommandOutput, CommandError> {
    let name = command.name().to_string();
    let mut registry = CommandRegistry::new();
    registry.register(command).unwrap();
    let bound = registry.resolve(&name, &args, &ctx.settings)?;
    registry.invoke(bound, ctx).await
}
