//! User interaction: authorization prompts and questions from the agent.

use async_trait::async_trait;

use crate::history::Action;

/// The user's answer to "run this command?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Run it.
    Approve,
    /// Run it, and the next `n - 1` commands without asking.
    ApproveFor(u32),
    /// Don't run it; tell the model this instead.
    Feedback(String),
    /// Stop the agent.
    Exit,
}

impl Authorization {
    /// Parse a console reply: `y`, `y -N`, `n`, or free-text feedback.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();
        match lower.as_str() {
            "y" | "yes" | "" => Self::Approve,
            "n" | "no" | "exit" | "q" => Self::Exit,
            _ => {
                if let Some(count) = lower.strip_prefix("y -").and_then(|n| n.trim().parse::<u32>().ok()) {
                    if count > 0 {
                        return Self::ApproveFor(count);
                    }
                }
                Self::Feedback(trimmed.to_string())
            }
        }
    }
}

#[async_trait]
pub trait UserInteraction: Send + Sync {
    /// Ask whether `action` may run.
    async fn authorize(&self, action: &Action) -> Authorization;

    /// Put a question to the user. `None` if nobody can answer.
    async fn ask(&self, question: &str) -> Option<String>;

    /// Show the model's thoughts and proposed action.
    async fn present(&self, _ai_name: &str, _action: &Action) {}
}

/// Approves everything and answers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl UserInteraction for AutoApprove {
    async fn authorize(&self, _action: &Action) -> Authorization {
        Authorization::Approve
    }

    async fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}
