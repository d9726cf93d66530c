//! Asking the user for input.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thinkloop_core::command::{Command, CommandArgs, CommandContext, CommandHandler, CommandOutput};
use thinkloop_core::error::CommandError;
use thinkloop_core::interaction::UserInteraction;
use thinkloop_core::schema::JsonSchema;

use crate::str_arg;

pub struct AskUser {
    interaction: Arc<dyn UserInteraction>,
}

#[async_trait]
impl CommandHandler for AskUser {
    async fn call(&self, args: CommandArgs, _ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let question = str_arg(&args, "ask_user", "question")?;
        match self.interaction.ask(question).await {
            Some(answer) => Ok(Value::String(format!("The user's answer: '{answer}'"))),
            None => Err(CommandError::OperationNotAllowed {
                command: "ask_user".into(),
                reason: "no user is available to answer questions".into(),
            }),
        }
    }
}

/// Only offered when a user is present.
pub fn ask_user(interaction: Arc<dyn UserInteraction>) -> Command {
    Command::new(
        "ask_user",
        "If you need more details or information regarding the given goals, you can ask the user for input",
        AskUser { interaction },
    )
    .with_parameter(
        "question",
        JsonSchema::string()
            .describe("The question or prompt to the user")
            .required(),
    )
    .available_when(|settings| !settings.noninteractive)
}
