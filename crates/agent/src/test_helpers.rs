//! Shared test helpers for loop tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use thinkloop_core::command::{Command, CommandRegistry, FINISH_COMMAND, handler_fn};
use thinkloop_core::error::{CommandError, ProviderError};
use thinkloop_core::history::Action;
use thinkloop_core::interaction::{Authorization, UserInteraction};
use thinkloop_core::message::Message;
use thinkloop_core::provider::{ModelTier, Provider, ProviderRequest, ProviderResponse, Usage};
use thinkloop_core::schema::JsonSchema;

/// A provider that replays a script and records every request.
///
/// Once the script runs out every call fails with a non-retryable error.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_texts(texts: Vec<String>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(text_response(&t))).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tiers(&self) -> Vec<ModelTier> {
        self.requests().iter().map(|r| r.tier).collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Everything the model was shown on call `n`, joined.
    pub fn prompt_text(&self, n: usize) -> String {
        self.requests()[n]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())))
    }
}

/// A provider that never answers.
pub struct StallingProvider;

#[async_trait::async_trait]
impl Provider for StallingProvider {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

/// A well-formed reply choosing `name(args)`.
pub fn command_reply(name: &str, args: Value) -> String {
    json!({
        "thoughts": {
            "text": format!("I will use {name}"),
            "reasoning": "It moves the task forward",
            "plan": "- act\n- finish",
            "self_criticism": "",
            "speak": format!("Running {name}")
        },
        "command": {"name": name, "args": args}
    })
    .to_string()
}

/// Commands for loop tests: `write_file`, `search`, `fail`, `terminate`,
/// `slow` and `finish`.
pub fn test_registry() -> Arc<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    registry
        .register(
            Command::new(
                "write_file",
                "Write a file",
                handler_fn(|args, ctx| async move {
                    let filename = args["filename"].as_str().unwrap_or_default().to_string();
                    let contents = args["contents"].as_str().unwrap_or_default().to_string();
                    ctx.workspace
                        .write(&filename, contents.as_bytes())
                        .await
                        .map_err(|e| CommandError::ExecutionFailed {
                            command: "write_file".into(),
                            reason: e.to_string(),
                        })?;
                    Ok::<_, CommandError>(json!(format!("Wrote {filename}")))
                }),
            )
            .with_parameter("filename", JsonSchema::string().required())
            .with_parameter("contents", JsonSchema::string().required()),
        )
        .unwrap();
    registry
        .register(
            Command::new(
                "search",
                "Search the web",
                handler_fn(|args, _| async move { Ok(json!(format!("results for {}", args["query"]))) }),
            )
            .with_parameter("query", JsonSchema::string().required()),
        )
        .unwrap();
    registry
        .register(Command::new(
            "fail",
            "Always fails",
            handler_fn(|_, _| async {
                Err(CommandError::ExecutionFailed {
                    command: "fail".into(),
                    reason: "disk on fire".into(),
                })
            }),
        ))
        .unwrap();
    registry
        .register(Command::new(
            "terminate",
            "Stops the agent",
            handler_fn(|_, _| async {
                Err(CommandError::Terminated {
                    command: "terminate".into(),
                    reason: "operator kill switch".into(),
                })
            }),
        ))
        .unwrap();
    registry
        .register(Command::new(
            "slow",
            "Takes ten seconds",
            handler_fn(|_, _| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!("finally"))
            }),
        ))
        .unwrap();
    registry
        .register(
            Command::new(
                FINISH_COMMAND,
                "Finish the task",
                handler_fn(|args, _| async move {
                    Ok(args.get("reason").cloned().unwrap_or(Value::Null))
                }),
            )
            .with_parameter("reason", JsonSchema::string().required()),
        )
        .unwrap();
    Arc::new(registry)
}

/// Answers authorization requests from a script; approves once it runs out.
pub struct ScriptedInteraction {
    answers: Mutex<VecDeque<Authorization>>,
    asked: Mutex<Vec<Action>>,
}

impl ScriptedInteraction {
    pub fn new(answers: Vec<Authorization>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<Action> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl UserInteraction for ScriptedInteraction {
    async fn authorize(&self, action: &Action) -> Authorization {
        self.asked.lock().unwrap().push(action.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Authorization::Approve)
    }

    async fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}
