//! Provider trait: the abstraction over LLM backends.
//!
//! The agent loop hands a prompt and a tier to a Provider and gets back a
//! reply plus token accounting. How the reply travels is the provider's
//! business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Which model tier a request is made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Smart,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Smart => write!(f, "smart"),
        }
    }
}

/// A single model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The concrete model identifier for the chosen tier
    pub model: String,

    pub tier: ModelTier,

    pub messages: Vec<Message>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Command definitions, sent only in function-calling mode
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
}

/// A command definition sent to the model so it can pick one as a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the command's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this. The loop calls `complete()` once per
/// think attempt without knowing which backend is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: Some(Usage::new(3, 1)),
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn provider_trait_object_round_trip() {
        let provider: Box<dyn Provider> = Box::new(Echo);
        let response = provider
            .complete(ProviderRequest {
                model: "m".into(),
                tier: ModelTier::Fast,
                messages: vec![Message::user("ping")],
                temperature: 0.0,
                max_tokens: None,
                functions: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(response.message.content, "ping");
        assert_eq!(response.usage.unwrap().total_tokens, 4);
        assert_eq!(provider.name(), "echo");
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ModelTier::Smart).unwrap(), "\"smart\"");
        assert_eq!(ModelTier::Fast.to_string(), "fast");
    }
}
