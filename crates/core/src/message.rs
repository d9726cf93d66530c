//! Message value objects exchanged with the model.
//!
//! Messages carry no ids or timestamps: the same history must always render
//! the same prompt, so two builds of a cycle's prompt compare equal.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Directives and constraints
    System,
    /// Driver-side content (history, requests for the next action)
    User,
    /// What the model said
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A structured command choice returned through function calling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Raw JSON-encoded arguments as the model produced them
    pub arguments: String,
}

/// A single message in a prompt or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Set on assistant replies when the provider returned a function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            function_call: None,
        }
    }

    /// Attach a function call to this message.
    pub fn with_function_call(mut self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.function_call = Some(FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }
}
