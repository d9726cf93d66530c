//! Agent settings, profile and directives.

use serde::{Deserialize, Serialize};

use crate::provider::ModelTier;

/// Per-agent tunables the loop reads every cycle.
///
/// Only the watchdog mutates these at runtime (temporary `big_brain`),
/// everything else is fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub fast_llm: String,

    pub smart_llm: String,

    /// Force the smart tier for every request
    #[serde(default)]
    pub big_brain: bool,

    /// Cycles allowed before the loop stops (0 = unlimited)
    #[serde(default)]
    pub cycle_limit: u32,

    /// No user present: commands are never authorized and cannot ask questions
    #[serde(default)]
    pub noninteractive: bool,

    /// A user is present but commands run without authorization
    #[serde(default)]
    pub continuous: bool,

    #[serde(default = "default_true")]
    pub restrict_to_workspace: bool,

    #[serde(default)]
    pub execute_local_commands: bool,

    #[serde(default)]
    pub disabled_commands: Vec<String>,

    /// Commands that run without asking even in interactive mode
    #[serde(default)]
    pub auto_approved_commands: Vec<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Send commands as functions instead of a JSON schema in the prompt
    #[serde(default)]
    pub use_functions: bool,

    /// How many completed episodes are rendered into the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_true() -> bool {
    true
}

fn default_history_window() -> usize {
    10
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            fast_llm: "gpt-3.5-turbo".into(),
            smart_llm: "gpt-4-turbo".into(),
            big_brain: false,
            cycle_limit: 0,
            noninteractive: false,
            continuous: false,
            restrict_to_workspace: true,
            execute_local_commands: false,
            disabled_commands: Vec::new(),
            auto_approved_commands: Vec::new(),
            temperature: 0.0,
            max_tokens: None,
            use_functions: false,
            history_window: default_history_window(),
        }
    }
}

impl AgentSettings {
    /// The tier requests are currently made on.
    pub fn active_tier(&self) -> ModelTier {
        if self.big_brain {
            ModelTier::Smart
        } else {
            ModelTier::Fast
        }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_llm,
            ModelTier::Smart => &self.smart_llm,
        }
    }

    /// Whether switching to the smart tier would change anything.
    pub fn can_escalate(&self) -> bool {
        !self.big_brain && self.fast_llm != self.smart_llm
    }

    /// Whether the user must approve each command.
    pub fn requires_authorization(&self) -> bool {
        !self.noninteractive && !self.continuous
    }

    pub fn is_disabled(&self, command: &str) -> bool {
        self.disabled_commands.iter().any(|c| c == command)
    }

    pub fn is_auto_approved(&self, command: &str) -> bool {
        self.auto_approved_commands.iter().any(|c| c == command)
    }
}

/// Who the agent is and what it is trying to achieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AIProfile {
    pub ai_name: String,
    pub ai_role: String,
    #[serde(default)]
    pub goals: Vec<String>,
}

impl Default for AIProfile {
    fn default() -> Self {
        Self {
            ai_name: "ThinkLoop".into(),
            ai_role: "an AI designed to autonomously complete tasks using the commands available to it".into(),
            goals: Vec::new(),
        }
    }
}

/// Static rules rendered into the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AIDirectives {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub best_practices: Vec<String>,
}

impl AIDirectives {
    pub fn standard() -> Self {
        Self {
            resources: vec![
                "Internet access for searches and information gathering.".into(),
                "The ability to read and write files.".into(),
                "You are a Large Language Model, trained on millions of pages of text, including a lot of factual knowledge. Make use of this factual knowledge to avoid unnecessary gathering of information.".into(),
            ],
            constraints: vec![
                "Exclusively use the commands listed below.".into(),
                "You can only act proactively, and are unable to start background jobs or set up webhooks for yourself. Take this into account when planning your actions.".into(),
                "You are unable to interact with physical objects. If this is absolutely necessary to fulfill a task or objective or to complete a step, you must ask the user to do it for you. If the user refuses this, and there is no other way to achieve your goals, you must terminate to avoid wasting time and energy.".into(),
            ],
            best_practices: vec![
                "Continuously review and analyze your actions to ensure you are performing to the best of your abilities.".into(),
                "Constructively self-criticize your big-picture behavior constantly.".into(),
                "Reflect on past decisions and strategies to refine your approach.".into(),
                "Every command has a cost, so be smart and efficient. Aim to complete tasks in the least number of steps.".into(),
                "Only make use of your information gathering abilities to find information that you don't yet have knowledge of.".into(),
            ],
        }
    }
}
