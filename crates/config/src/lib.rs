//! Configuration loading, validation, and management for thinkloop.
//!
//! Loads configuration from `~/.thinkloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thinkloop_core::{AIDirectives, AIProfile, AgentSettings};

/// The root configuration structure.
///
/// Maps directly to `~/.thinkloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model used for routine cycles
    #[serde(default = "default_fast_llm")]
    pub fast_llm: String,

    /// Model used when forced or escalated
    #[serde(default = "default_smart_llm")]
    pub smart_llm: String,

    #[serde(default)]
    pub temperature: f32,

    /// Max tokens per model response (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Offer commands as functions instead of a JSON schema in the prompt
    #[serde(default)]
    pub openai_functions: bool,

    /// Where agent state is kept (default `~/.thinkloop`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default = "AIDirectives::standard")]
    pub directives: AIDirectives,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub budget: BudgetConfig,
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_fast_llm() -> String {
    "gpt-3.5-turbo".into()
}
fn default_smart_llm() -> String {
    "gpt-4-turbo".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("fast_llm", &self.fast_llm)
            .field("smart_llm", &self.smart_llm)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("openai_functions", &self.openai_functions)
            .field("data_dir", &self.data_dir)
            .field("profile", &self.profile)
            .field("directives", &self.directives)
            .field("run", &self.run)
            .field("workspace", &self.workspace)
            .field("commands", &self.commands)
            .field("budget", &self.budget)
            .finish()
    }
}

/// Who the agent is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_ai_name")]
    pub ai_name: String,

    #[serde(default = "default_ai_role")]
    pub ai_role: String,

    #[serde(default)]
    pub goals: Vec<String>,
}

fn default_ai_name() -> String {
    AIProfile::default().ai_name
}
fn default_ai_role() -> String {
    AIProfile::default().ai_role
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            ai_name: default_ai_name(),
            ai_role: default_ai_role(),
            goals: vec![],
        }
    }
}

/// How the loop runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run without asking for authorization
    #[serde(default)]
    pub continuous_mode: bool,

    /// Cycles allowed in continuous mode (0 = unlimited)
    #[serde(default)]
    pub continuous_limit: u32,

    /// No user present at all: authorization skipped, `ask_user` unavailable
    #[serde(default)]
    pub noninteractive_mode: bool,

    /// Always use the smart model
    #[serde(default)]
    pub big_brain: bool,

    /// Commands that never need authorization
    #[serde(default)]
    pub auto_approved_commands: Vec<String>,

    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Think attempts before an unparsable reply becomes fatal
    #[serde(default = "default_max_parse_attempts")]
    pub max_parse_attempts: u32,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_history_window() -> usize {
    10
}
fn default_max_parse_attempts() -> u32 {
    3
}
fn default_model_timeout() -> u64 {
    120
}
fn default_command_timeout() -> u64 {
    300
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            continuous_mode: false,
            continuous_limit: 0,
            noninteractive_mode: false,
            big_brain: false,
            auto_approved_commands: vec![],
            history_window: default_history_window(),
            max_parse_attempts: default_max_parse_attempts(),
            model_timeout_secs: default_model_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// The directory the agent works in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Default `~/.thinkloop/workspace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Refuse any path that escapes the root
    #[serde(default = "default_true")]
    pub restrict_to_root: bool,

    /// Relative path prefixes that are never accessible
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            restrict_to_root: true,
            forbidden_paths: vec![],
        }
    }
}

/// Which commands exist and what they may do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub disabled_commands: Vec<String>,

    /// Enables `execute_shell`
    #[serde(default)]
    pub execute_local_commands: bool,

    /// If non-empty, only these executables may run
    #[serde(default)]
    pub shell_allowlist: Vec<String>,

    #[serde(default)]
    pub shell_denylist: Vec<String>,
}

/// Spending limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum spend in USD (0 = unlimited)
    #[serde(default)]
    pub max_cost_usd: f64,

    /// Maximum tokens (0 = unlimited)
    #[serde(default)]
    pub max_tokens: u64,

    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.thinkloop/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    ///
    /// - `THINKLOOP_API_KEY`, then `OPENAI_API_KEY` (only if no key is configured)
    /// - `OPENAI_API_BASE_URL`, `FAST_LLM`, `SMART_LLM`, `TEMPERATURE`
    /// - `EXECUTE_LOCAL_COMMANDS`, `RESTRICT_TO_WORKSPACE` (`true`/`false`)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("THINKLOOP_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("OPENAI_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(model) = lookup("FAST_LLM") {
            self.fast_llm = model;
        }
        if let Some(model) = lookup("SMART_LLM") {
            self.smart_llm = model;
        }
        if let Some(temp) = lookup("TEMPERATURE") {
            match temp.trim().parse::<f32>() {
                Ok(t) => self.temperature = t,
                Err(_) => tracing::warn!(value = %temp, "Ignoring unparsable TEMPERATURE"),
            }
        }
        if let Some(flag) = lookup("EXECUTE_LOCAL_COMMANDS").and_then(|v| parse_bool(&v)) {
            self.commands.execute_local_commands = flag;
        }
        if let Some(flag) = lookup("RESTRICT_TO_WORKSPACE").and_then(|v| parse_bool(&v)) {
            self.workspace.restrict_to_root = flag;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".thinkloop")
    }

    /// Where agent state lives.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::config_dir)
    }

    /// The workspace root directory.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.fast_llm.trim().is_empty() || self.smart_llm.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "fast_llm and smart_llm must not be empty".into(),
            ));
        }

        if self.budget.max_cost_usd < 0.0 {
            return Err(ConfigError::ValidationError(
                "budget.max_cost_usd must not be negative".into(),
            ));
        }

        if self.run.max_parse_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "run.max_parse_attempts must be at least 1".into(),
            ));
        }

        if let Some(cmd) = self
            .commands
            .shell_allowlist
            .iter()
            .find(|c| self.commands.shell_denylist.contains(c))
        {
            return Err(ConfigError::ValidationError(format!(
                "'{cmd}' is in both shell_allowlist and shell_denylist"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Derive the settings snapshot the agent loop runs with.
    ///
    /// Cycle limit: `continuous_limit` in continuous mode, unlimited when
    /// non-interactive, otherwise a single step re-armed by each user
    /// authorization.
    pub fn agent_settings(&self) -> AgentSettings {
        let cycle_limit = if self.run.continuous_mode {
            self.run.continuous_limit
        } else if self.run.noninteractive_mode {
            0
        } else {
            1
        };

        AgentSettings {
            fast_llm: self.fast_llm.clone(),
            smart_llm: self.smart_llm.clone(),
            big_brain: self.run.big_brain,
            cycle_limit,
            noninteractive: self.run.noninteractive_mode,
            continuous: self.run.continuous_mode,
            restrict_to_workspace: self.workspace.restrict_to_root,
            execute_local_commands: self.commands.execute_local_commands,
            disabled_commands: self.commands.disabled_commands.clone(),
            auto_approved_commands: self.run.auto_approved_commands.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            use_functions: self.openai_functions,
            history_window: self.run.history_window,
        }
    }

    pub fn profile(&self) -> AIProfile {
        AIProfile {
            ai_name: self.profile.ai_name.clone(),
            ai_role: self.profile.ai_role.clone(),
            goals: self.profile.goals.clone(),
        }
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        format!(
            "# thinkloop configuration\n\
             # API key: set api_key here or export THINKLOOP_API_KEY / OPENAI_API_KEY.\n\
             # [run] continuous_mode = true skips authorization prompts.\n\n{body}"
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            fast_llm: default_fast_llm(),
            smart_llm: default_smart_llm(),
            temperature: 0.0,
            max_tokens: None,
            openai_functions: false,
            data_dir: None,
            profile: ProfileConfig::default(),
            directives: AIDirectives::standard(),
            run: RunConfig::default(),
            workspace: WorkspaceConfig::default(),
            commands: CommandsConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
