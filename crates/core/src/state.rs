//! Persisted agent state, for resuming a run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AIDirectives, AIProfile, AgentSettings};
use crate::error::StateError;
use crate::history::ActionHistory;

/// Running model-usage totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost_usd: f64,
    pub model_calls: u64,
}

impl BudgetTotals {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Everything needed to pick a run back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: AgentSettings,
    pub profile: AIProfile,
    #[serde(default)]
    pub directives: AIDirectives,
    #[serde(default)]
    pub history: ActionHistory,
    #[serde(default)]
    pub budget: BudgetTotals,
    #[serde(default)]
    pub cycles_completed: u32,
}

impl AgentState {
    pub fn new(
        agent_id: impl Into<String>,
        settings: AgentSettings,
        profile: AIProfile,
        directives: AIDirectives,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            created_at: now,
            updated_at: now,
            settings,
            profile,
            directives,
            history: ActionHistory::new(),
            budget: BudgetTotals::default(),
            cycles_completed: 0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable storage for agent state, keyed by agent id.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, agent_id: &str) -> std::result::Result<AgentState, StateError>;

    async fn save(&self, state: &AgentState) -> std::result::Result<(), StateError>;

    /// Ids of all stored agents, sorted.
    async fn list(&self) -> std::result::Result<Vec<String>, StateError>;

    async fn delete(&self, agent_id: &str) -> std::result::Result<(), StateError>;
}
