//! Built-in commands for the thinkloop agent.
//!
//! Commands give the agent the ability to act on the world: read and write
//! workspace files, keep files open in its context, ask the user questions,
//! run shell commands, and finish the task.
//!
//! Every command is an explicit [`Command`] value; [`builtin_registry`]
//! registers the full set in a fixed order so prompts stay reproducible.

pub mod context;
pub mod files;
pub mod finish;
pub mod shell;
pub mod time;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use thinkloop_core::command::{CommandArgs, CommandRegistry};
use thinkloop_core::context::AgentContext;
use thinkloop_core::error::{CommandError, RegistryError};
use thinkloop_core::interaction::UserInteraction;

pub use shell::ShellPolicy;

/// Create a registry with every built-in command.
///
/// Availability still depends on the agent settings: `execute_shell` needs
/// `execute_local_commands`, `ask_user` needs a user, and anything listed in
/// `disabled_commands` is hidden.
pub fn builtin_registry(
    shell: ShellPolicy,
    context: Arc<AgentContext>,
    interaction: Arc<dyn UserInteraction>,
) -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry.register(files::read_file())?;
    registry.register(files::write_file())?;
    registry.register(files::list_folder())?;
    registry.register(files::delete_file())?;
    registry.register(context::open_file(Arc::clone(&context)))?;
    registry.register(context::close_context_item(context))?;
    registry.register(user::ask_user(interaction))?;
    registry.register(shell::execute_shell(shell))?;
    registry.register(time::get_current_datetime())?;
    registry.register(finish::finish())?;
    Ok(registry)
}

/// Fetch a string argument. The registry validates arguments before a
/// handler runs, so a miss here means a handler was called directly.
pub(crate) fn str_arg<'a>(
    args: &'a CommandArgs,
    command: &str,
    name: &str,
) -> Result<&'a str, CommandError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CommandError::InvalidArguments {
            command: command.to_string(),
            fields: vec![format!("{name}: missing required argument")],
        })
}
