//! Commands and the command registry.
//!
//! A command is an explicit value: name, description, typed parameters, an
//! availability predicate over the agent settings, and a handler. The
//! registry is built once at startup and is read-only while the loop runs.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::agent::AgentSettings;
use crate::error::{CommandError, RegistryError};
use crate::provider::FunctionDefinition;
use crate::schema::{CommandParameter, JsonSchema};
use crate::workspace::Workspace;

/// Name of the command that ends the run.
pub const FINISH_COMMAND: &str = "finish";

/// Arguments as the model sent them.
pub type CommandArgs = serde_json::Map<String, Value>;

/// Whatever a handler returns on success.
pub type CommandOutput = Value;

/// What a handler gets to work with besides its arguments.
#[derive(Clone)]
pub struct CommandContext {
    pub agent_id: String,
    pub workspace: Arc<dyn Workspace>,
    pub settings: AgentSettings,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

/// The executable half of a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(
        &self,
        args: CommandArgs,
        ctx: CommandContext,
    ) -> std::result::Result<CommandOutput, CommandError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(CommandArgs, CommandContext) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<CommandOutput, CommandError>> + Send + 'static,
{
    async fn call(
        &self,
        args: CommandArgs,
        ctx: CommandContext,
    ) -> std::result::Result<CommandOutput, CommandError> {
        (self.0)(args, ctx).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> impl CommandHandler
where
    F: Fn(CommandArgs, CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CommandOutput, CommandError>> + Send + 'static,
{
    FnHandler(f)
}

type Availability = Arc<dyn Fn(&AgentSettings) -> bool + Send + Sync>;

/// A named, schema-typed, invokable capability exposed to the model.
#[derive(Clone)]
pub struct Command {
    name: String,
    description: String,
    parameters: Vec<CommandParameter>,
    available: Availability,
    handler: Arc<dyn CommandHandler>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            available: Arc::new(|_| true),
            handler: Arc::new(handler),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.parameters.push(CommandParameter::new(name, schema));
        self
    }

    /// Restrict availability to settings satisfying `predicate`.
    pub fn available_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&AgentSettings) -> bool + Send + Sync + 'static,
    {
        self.available = Arc::new(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[CommandParameter] {
        &self.parameters
    }

    pub fn is_available(&self, settings: &AgentSettings) -> bool {
        !settings.is_disabled(&self.name) && (self.available)(settings)
    }

    /// The parameters as one object schema.
    pub fn parameters_schema(&self) -> JsonSchema {
        self.parameters
            .iter()
            .fold(JsonSchema::object(), |schema, p| {
                schema.with_property(p.name.clone(), p.schema.clone())
            })
    }

    pub fn to_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema().to_json(),
        }
    }

    /// One-line listing used in the prompt, e.g.
    /// `read_file: Read a file. Params: (filename: string)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.signature()).collect();
        format!("{}: {}. Params: ({})", self.name, self.description.trim_end_matches('.'), params.join(", "))
    }

    fn validate(&self, args: &CommandArgs) -> Vec<String> {
        let mut problems = Vec::new();
        for param in &self.parameters {
            match args.get(&param.name) {
                // An explicit null for an optional argument counts as absent
                Some(Value::Null) if !param.schema.required => {}
                Some(value) => problems.extend(param.schema.validate(&param.name, value)),
                None if param.schema.required => {
                    problems.push(format!("{}: missing required argument", param.name))
                }
                None => {}
            }
        }
        for key in args.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                problems.push(format!("{key}: unexpected argument"));
            }
        }
        problems
    }
}

/// A resolved, validated invocation ready to run.
#[derive(Clone)]
pub struct BoundCommand {
    pub name: String,
    pub args: CommandArgs,
    handler: Arc<dyn CommandHandler>,
}

impl std::fmt::Debug for BoundCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundCommand")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// The set of commands an agent can use.
///
/// Listing order is registration order, so prompts are reproducible.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names must be unique.
    pub fn register(&mut self, command: Command) -> std::result::Result<(), RegistryError> {
        if self.index.contains_key(command.name()) {
            return Err(RegistryError::DuplicateCommand(command.name().to_string()));
        }
        self.index.insert(command.name().to_string(), self.commands.len());
        self.commands.push(command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All registered command names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// Commands whose availability predicate holds for `settings`.
    pub fn get_available_commands(&self, settings: &AgentSettings) -> Vec<&Command> {
        self.commands
            .iter()
            .filter(|c| c.is_available(settings))
            .collect()
    }

    /// Look up `name` and validate `args` against its parameters.
    pub fn resolve(
        &self,
        name: &str,
        args: &CommandArgs,
        settings: &AgentSettings,
    ) -> std::result::Result<BoundCommand, CommandError> {
        let command = self.get(name).ok_or_else(|| CommandError::UnknownCommand {
            name: name.to_string(),
            reason: None,
        })?;

        if settings.is_disabled(name) {
            return Err(CommandError::UnknownCommand {
                name: name.to_string(),
                reason: Some("this command is disabled".into()),
            });
        }
        if !command.is_available(settings) {
            return Err(CommandError::UnknownCommand {
                name: name.to_string(),
                reason: Some("this command is not available in the current configuration".into()),
            });
        }

        let problems = command.validate(args);
        if !problems.is_empty() {
            return Err(CommandError::InvalidArguments {
                command: name.to_string(),
                fields: problems,
            });
        }

        Ok(BoundCommand {
            name: command.name().to_string(),
            args: args.clone(),
            handler: Arc::clone(&command.handler),
        })
    }

    /// Run a resolved command.
    ///
    /// Handler errors pass through unchanged; a panicking handler becomes an
    /// `ExecutionFailed` carrying the panic message.
    pub async fn invoke(
        &self,
        bound: BoundCommand,
        ctx: CommandContext,
    ) -> std::result::Result<CommandOutput, CommandError> {
        debug!(command = %bound.name, "Invoking command");
        let name = bound.name.clone();
        match AssertUnwindSafe(bound.handler.call(bound.args, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "command handler panicked".to_string());
                Err(CommandError::ExecutionFailed { command: name, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::error::WorkspaceError;

    struct NullWorkspace;

    #[async_trait]
    impl Workspace for NullWorkspace {
        async fn read(&self, path: &str) -> std::result::Result<Vec<u8>, WorkspaceError> {
            Err(WorkspaceError::NotFound(path.into()))
        }
        async fn write(&self, _: &str, _: &[u8]) -> std::result::Result<(), WorkspaceError> {
            Ok(())
        }
        async fn list(&self, _: &str) -> std::result::Result<Vec<String>, WorkspaceError> {
            Ok(Vec::new())
        }
        async fn delete(&self, _: &str) -> std::result::Result<(), WorkspaceError> {
            Ok(())
        }
        async fn exists(&self, _: &str) -> std::result::Result<bool, WorkspaceError> {
            Ok(false)
        }
    }

    fn ctx() -> CommandContext {
        CommandContext {
            agent_id: "test-agent".into(),
            workspace: Arc::new(NullWorkspace),
            settings: AgentSettings::default(),
        }
    }

    fn echo() -> Command {
        Command::new(
            "echo",
            "Echo the text back",
            handler_fn(|args, _ctx| async move {
                Ok(args.get("text").cloned().unwrap_or(Value::Null))
            }),
        )
        .with_parameter("text", JsonSchema::string().required())
        .with_parameter("times", JsonSchema::integer())
    }

    fn named(name: &str) -> Command {
        Command::new(name, "test", handler_fn(|_, _| async { Ok(Value::Null) }))
    }

    fn args(value: Value) -> CommandArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let err = registry.register(echo()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateCommand("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn available_commands_are_stable_and_ordered() {
        let mut registry = CommandRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(named(name)).unwrap();
        }
        registry
            .register(named("shell").available_when(|s| s.execute_local_commands))
            .unwrap();

        let settings = AgentSettings::default();
        let first: Vec<&str> = registry.get_available_commands(&settings).iter().map(|c| c.name()).collect();
        let second: Vec<&str> = registry.get_available_commands(&settings).iter().map(|c| c.name()).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);

        let enabled = AgentSettings { execute_local_commands: true, ..AgentSettings::default() };
        assert_eq!(registry.get_available_commands(&enabled).len(), 4);
    }

    #[test]
    fn disabled_commands_are_unavailable() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let settings = AgentSettings { disabled_commands: vec!["echo".into()], ..AgentSettings::default() };
        assert!(registry.get_available_commands(&settings).is_empty());

        let err = registry.resolve("echo", &args(json!({"text": "x"})), &settings).unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand { reason: Some(_), .. }));
    }

    #[test]
    fn resolve_unknown_command() {
        let registry = CommandRegistry::new();
        let err = registry
            .resolve("fly_to_moon", &CommandArgs::new(), &AgentSettings::default())
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::UnknownCommand { name: "fly_to_moon".into(), reason: None }
        );
    }

    #[test]
    fn resolve_unavailable_command_is_unknown() {
        let mut registry = CommandRegistry::new();
        registry
            .register(named("shell").available_when(|s| s.execute_local_commands))
            .unwrap();
        let err = registry
            .resolve("shell", &CommandArgs::new(), &AgentSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::UnknownCommand);
    }

    #[test]
    fn resolve_lists_every_offending_field() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let err = registry
            .resolve("echo", &args(json!({"times": "twice", "loud": true})), &AgentSettings::default())
            .unwrap_err();
        match err {
            CommandError::InvalidArguments { command, fields } => {
                assert_eq!(command, "echo");
                assert_eq!(fields.len(), 3);
                assert!(fields.iter().any(|f| f.starts_with("text")));
                assert!(fields.iter().any(|f| f.starts_with("times")));
                assert!(fields.iter().any(|f| f.starts_with("loud")));
            }
            other => panic!("Expected InvalidArguments, got {other:?}"),
        }
    }

    #[test]
    fn null_optional_argument_is_accepted() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let bound = registry.resolve("echo", &args(json!({"text": "hi", "times": null})), &AgentSettings::default());
        assert!(bound.is_ok());
    }

    #[tokio::test]
    async fn invoke_runs_handler() {
        let mut registry = CommandRegistry::new();
        registry.register(echo()).unwrap();
        let bound = registry
            .resolve("echo", &args(json!({"text": "hello"})), &AgentSettings::default())
            .unwrap();
        let output = registry.invoke(bound, ctx()).await.unwrap();
        assert_eq!(output, json!("hello"));
    }

    #[tokio::test]
    async fn invoke_preserves_permission_errors() {
        let mut registry = CommandRegistry::new();
        registry
            .register(Command::new(
                "guarded",
                "Refuses",
                handler_fn(|_, _| async {
                    Err(CommandError::OperationNotAllowed {
                        command: "guarded".into(),
                        reason: "container runtime unavailable".into(),
                    })
                }),
            ))
            .unwrap();
        let bound = registry.resolve("guarded", &CommandArgs::new(), &AgentSettings::default()).unwrap();
        let err = registry.invoke(bound, ctx()).await.unwrap_err();
        assert!(matches!(err, CommandError::OperationNotAllowed { .. }));
    }

    #[tokio::test]
    async fn invoke_converts_panics() {
        let mut registry = CommandRegistry::new();
        registry
            .register(Command::new(
                "boom",
                "Panics",
                handler_fn(|_, _| async {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(Value::Null)
                }),
            ))
            .unwrap();
        let bound = registry.resolve("boom", &CommandArgs::new(), &AgentSettings::default()).unwrap();
        let err = registry.invoke(bound, ctx()).await.unwrap_err();
        assert_eq!(
            err,
            CommandError::ExecutionFailed { command: "boom".into(), reason: "kaboom".into() }
        );
    }

    #[test]
    fn definition_and_signature() {
        let command = echo();
        let def = command.to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["required"], json!(["text"]));
        assert_eq!(command.signature(), "echo: Echo the text back. Params: (text: string, times?: integer)");
    }
}
