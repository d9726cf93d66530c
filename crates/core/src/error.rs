//! Error types for the thinkloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `AgentError` is the only one
//! that escapes the execution loop, and only for unrecoverable conditions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors surfaced by the agent execution loop.
///
/// Everything recoverable (bad command names, invalid arguments, failed
/// commands) is folded into an `ActionResult` and shown to the model on the
/// next cycle instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid agent response after {attempts} attempt(s): {message}")]
    InvalidAgentResponse { attempts: u32, message: String },

    #[error("Agent terminated: {0}")]
    Terminated(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl AgentError {
    /// Remediation hint for the operator.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAgentResponse { .. } => {
                Some("Ensure the LLM follows the correct response format.")
            }
            Self::Configuration(_) => Some("Check the configuration and try again."),
            Self::Provider(ProviderError::AuthenticationFailed(_)) => {
                Some("Check the API key for the configured model provider.")
            }
            _ => None,
        }
    }

    /// A transient provider failure; the caller may resume the agent later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_retryable())
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Result type alias using the fatal agent error.
pub type Result<T> = std::result::Result<T, AgentError>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a think step that hit this error may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        ) || matches!(self, Self::ApiError { status_code, .. } if *status_code >= 500)
    }
}

/// Classification of a failed action, persisted with the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownCommand,
    InvalidArgument,
    OperationNotAllowed,
    AccessDenied,
    DuplicateOperation,
    CommandExecution,
    Timeout,
    Cancelled,
    Terminated,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownCommand => "UnknownCommandError",
            Self::InvalidArgument => "InvalidArgumentError",
            Self::OperationNotAllowed => "OperationNotAllowedError",
            Self::AccessDenied => "AccessDeniedError",
            Self::DuplicateOperation => "DuplicateOperationError",
            Self::CommandExecution => "CommandExecutionError",
            Self::Timeout => "CommandTimeoutError",
            Self::Cancelled => "CommandCancelledError",
            Self::Terminated => "AgentTerminated",
        };
        f.write_str(s)
    }
}

/// Errors from resolving or running a command.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command '{name}'{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    UnknownCommand { name: String, reason: Option<String> },

    #[error("Invalid arguments for '{command}': {}", fields.join("; "))]
    InvalidArguments { command: String, fields: Vec<String> },

    #[error("Operation not allowed: {command}: {reason}")]
    OperationNotAllowed { command: String, reason: String },

    #[error("Access denied: {command}: {reason}")]
    AccessDenied { command: String, reason: String },

    #[error("Operation already executed: {command}: {reason}")]
    DuplicateOperation { command: String, reason: String },

    #[error("Command execution failed: {command}: {reason}")]
    ExecutionFailed { command: String, reason: String },

    #[error("Command timed out: {command} after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Command cancelled: {command}")]
    Cancelled { command: String },

    /// The handler decided the whole agent must stop.
    #[error("Agent terminated by {command}: {reason}")]
    Terminated { command: String, reason: String },
}

impl CommandError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnknownCommand { .. } => FailureKind::UnknownCommand,
            Self::InvalidArguments { .. } => FailureKind::InvalidArgument,
            Self::OperationNotAllowed { .. } => FailureKind::OperationNotAllowed,
            Self::AccessDenied { .. } => FailureKind::AccessDenied,
            Self::DuplicateOperation { .. } => FailureKind::DuplicateOperation,
            Self::ExecutionFailed { .. } => FailureKind::CommandExecution,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::Terminated { .. } => FailureKind::Terminated,
        }
    }

    /// Corrective hint shown to the model alongside the failure.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownCommand { .. } => Some("Do not try to use this command again."),
            Self::InvalidArguments { .. } => Some("Check the command arguments and try again."),
            Self::OperationNotAllowed { .. } => {
                Some("The agent does not have permission to execute this operation.")
            }
            Self::AccessDenied { .. } => {
                Some("Access to the required resource was denied. Try another approach.")
            }
            Self::DuplicateOperation { .. } => Some("The operation has already been executed."),
            Self::Timeout { .. } => Some("Try a smaller or faster operation."),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

/// Raised while building a command registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate command: '{0}' is already registered")]
    DuplicateCommand(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Episode {index} is not the episode in progress")]
    NotInProgress { index: usize },

    #[error("An episode is already in progress at index {index}")]
    EpisodeInProgress { index: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Access denied to '{path}': {reason}")]
    AccessDenied { path: String, reason: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("No agent with ID '{0}'")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
