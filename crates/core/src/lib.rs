//! # ThinkLoop Core
//!
//! Domain types, traits, and error definitions for the ThinkLoop autonomous
//! agent runtime. Everything the execution loop needs from the outside world
//! (model providers, workspaces, state storage, the user) is a trait here;
//! implementations live in their own crates.

pub mod agent;
pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod history;
pub mod interaction;
pub mod message;
pub mod provider;
pub mod schema;
pub mod state;
pub mod workspace;

// Re-export key types at crate root for ergonomics
pub use agent::{AIDirectives, AIProfile, AgentSettings};
pub use command::{
    BoundCommand, Command, CommandArgs, CommandContext, CommandHandler, CommandOutput,
    CommandRegistry, FINISH_COMMAND, handler_fn,
};
pub use context::{AgentContext, ContextItem, ContextProvider};
pub use error::{
    AgentError, CommandError, FailureKind, HistoryError, ProviderError, RegistryError, Result,
    StateError, WorkspaceError,
};
pub use event::{DomainEvent, EventBus};
pub use history::{Action, ActionHistory, ActionResult, AgentThoughts, Episode};
pub use interaction::{Authorization, AutoApprove, UserInteraction};
pub use message::{FunctionCall, Message, Role};
pub use provider::{FunctionDefinition, ModelTier, Provider, ProviderRequest, ProviderResponse, Usage};
pub use schema::{CommandParameter, JsonSchema, SchemaType};
pub use state::{AgentState, BudgetTotals, StateStore};
pub use workspace::Workspace;
