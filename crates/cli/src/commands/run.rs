//! `thinkloop run`: create a new agent and run it.

use std::path::PathBuf;

use clap::Args;
use thinkloop_config::AppConfig;
use thinkloop_core::state::AgentState;
use thinkloop_storage::generate_agent_id;

use crate::session;

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// A goal for the agent (repeatable; replaces the configured goals)
    #[arg(short, long = "goal")]
    pub goals: Vec<String>,

    /// The agent's name
    #[arg(long)]
    pub name: Option<String>,

    /// The agent's role, e.g. "an assistant that writes reports"
    #[arg(long)]
    pub role: Option<String>,

    /// Run without asking for authorization
    #[arg(long)]
    pub continuous: bool,

    /// Stop continuous mode after N cycles (0 = unlimited)
    #[arg(long, value_name = "N")]
    pub continuous_limit: Option<u32>,

    /// No user at all: no authorization, no questions
    #[arg(long)]
    pub non_interactive: bool,

    /// Use the smart model for every cycle
    #[arg(long)]
    pub big_brain: bool,

    #[arg(long, value_name = "MODEL")]
    pub fast_llm: Option<String>,

    #[arg(long, value_name = "MODEL")]
    pub smart_llm: Option<String>,

    /// Workspace directory the agent's file commands operate in
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
}

impl RunArgs {
    /// Layer the flags over the loaded configuration.
    pub fn apply(self, config: &mut AppConfig) {
        if !self.goals.is_empty() {
            config.profile.goals = self.goals;
        }
        if let Some(name) = self.name {
            config.profile.ai_name = name;
        }
        if let Some(role) = self.role {
            config.profile.ai_role = role;
        }
        if self.continuous {
            config.run.continuous_mode = true;
        }
        if let Some(limit) = self.continuous_limit {
            config.run.continuous_mode = true;
            config.run.continuous_limit = limit;
        }
        if self.non_interactive {
            config.run.noninteractive_mode = true;
        }
        if self.big_brain {
            config.run.big_brain = true;
        }
        if let Some(model) = self.fast_llm {
            config.fast_llm = model;
        }
        if let Some(model) = self.smart_llm {
            config.smart_llm = model;
        }
        if let Some(dir) = self.workspace {
            config.workspace.root = Some(dir);
        }
    }
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    args.apply(&mut config);
    config.validate()?;

    if config.profile.goals.is_empty() {
        return Err("No goals given. Pass --goal or set [profile] goals in the config file.".into());
    }

    let profile = config.profile();
    let state = AgentState::new(
        generate_agent_id(&profile.ai_name),
        config.agent_settings(),
        profile,
        config.directives.clone(),
    );

    println!("  Agent:     {} ({})", state.profile.ai_name, state.agent_id);
    println!("  Role:      {}", state.profile.ai_role);
    for (i, goal) in state.profile.goals.iter().enumerate() {
        println!("  Goal {}:    {goal}", i + 1);
    }
    println!();

    session::execute(&config, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        RunArgs {
            goals: vec!["Write a haiku".into()],
            name: Some("Poet".into()),
            continuous_limit: Some(5),
            fast_llm: Some("gpt-4o-mini".into()),
            ..RunArgs::default()
        }
        .apply(&mut config);

        assert_eq!(config.profile.goals, vec!["Write a haiku".to_string()]);
        assert_eq!(config.profile.ai_name, "Poet");
        assert!(config.run.continuous_mode);
        assert_eq!(config.agent_settings().cycle_limit, 5);
        assert_eq!(config.fast_llm, "gpt-4o-mini");
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = AppConfig::default();
        config.profile.goals = vec!["Keep me".into()];
        RunArgs::default().apply(&mut config);
        assert_eq!(config.profile.goals, vec!["Keep me".to_string()]);
        assert!(!config.run.continuous_mode);
        assert_eq!(config.agent_settings().cycle_limit, 1);
    }
}
