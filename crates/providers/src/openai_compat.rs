//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions`. Commands are offered as tools when the request
//! carries function definitions; the first returned tool call becomes the
//! reply's function call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thinkloop_config::AppConfig;
use thinkloop_core::error::ProviderError;
use thinkloop_core::message::{FunctionCall, Message, Role};
use thinkloop_core::provider::{FunctionDefinition, Provider, ProviderRequest, ProviderResponse, Usage};
use tracing::{debug, warn};

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from the application config. Fails if no API key is set.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key: set api_key in config.toml or export THINKLOOP_API_KEY".into(),
            )
        })?;
        Ok(Self::new("openai", config.api_base_url.clone(), api_key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ApiMessage {
                role: m.role.to_string(),
                content: Some(m.content.clone()),
                tool_calls: m.function_call.as_ref().map(|fc| {
                    vec![ApiToolCall {
                        id: format!("call_{i}"),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: fc.name.clone(),
                            arguments: fc.arguments.clone(),
                        },
                    }]
                }),
            })
            .collect()
    }

    /// Convert command definitions to OpenAI tool format.
    fn to_api_tools(functions: &[FunctionDefinition]) -> Vec<ApiToolDefinition> {
        functions
            .iter()
            .map(|f| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.functions.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.functions));
        }
        body
    }

    fn into_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let function_call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|tc| FunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            });

        let message = Message {
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
            function_call,
        };

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            tier = %request.tier,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::into_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinkloop_core::provider::ModelTier;

    fn request(functions: Vec<FunctionDefinition>) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-3.5-turbo".into(),
            tier: ModelTier::Fast,
            messages: vec![Message::system("You are helpful"), Message::user("Hello")],
            temperature: 0.0,
            max_tokens: Some(256),
            functions,
        }
    }

    #[test]
    fn constructors() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url(), "https://api.openai.com/v1");

        let local = OpenAiCompatProvider::openai("x").with_base_url("http://localhost:11434/v1/");
        assert_eq!(local.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn from_config_requires_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = AppConfig {
            api_key: Some("sk".into()),
            api_base_url: "https://proxy.example/v1".into(),
            ..AppConfig::default()
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url(), "https://proxy.example/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::assistant("").with_function_call("finish", r#"{"reason":"done"}"#),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert!(api[1].tool_calls.is_none());
        let calls = api[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "finish");
        assert_eq!(calls[0].r#type, "function");
    }

    #[test]
    fn body_includes_tools_only_in_function_mode() {
        let plain = OpenAiCompatProvider::build_body(&request(vec![]));
        assert!(plain.get("tools").is_none());
        assert_eq!(plain["max_tokens"], 256);

        let with_tools = OpenAiCompatProvider::build_body(&request(vec![FunctionDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]));
        assert_eq!(with_tools["tools"][0]["function"]["name"], "read_file");
        assert_eq!(with_tools["tools"][0]["type"], "function");
    }

    #[test]
    fn parse_text_response() {
        let data = r#"{
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "{\"command\": {\"name\": \"finish\"}}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::into_response(parsed).unwrap();
        assert_eq!(response.model, "gpt-3.5-turbo-0125");
        assert!(response.message.content.contains("finish"));
        assert!(response.message.function_call.is_none());
        assert_eq!(response.usage.unwrap().total_tokens, 20);
    }

    #[test]
    fn parse_tool_call_response() {
        let data = r#"{
            "model": "gpt-4-turbo",
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "write_file", "arguments": "{\"filename\":\"a.txt\"}"}}
            ]}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::into_response(parsed).unwrap();
        let call = response.message.function_call.unwrap();
        assert_eq!(call.name, "write_file");
        assert_eq!(call.arguments, r#"{"filename":"a.txt"}"#);
        assert!(response.usage.is_none());
        assert_eq!(response.message.content, "");
    }

    #[test]
    fn empty_choices_is_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::into_response(parsed),
            Err(ProviderError::ApiError { status_code: 200, .. })
        ));
    }
}
