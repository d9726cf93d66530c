//! `thinkloop resume`: continue a saved agent.

use thinkloop_config::AppConfig;
use thinkloop_core::state::StateStore;
use thinkloop_storage::FileStateStore;

use crate::session;

pub async fn run(agent_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = FileStateStore::new(config.data_dir());
    let state = store
        .load(agent_id)
        .await
        .map_err(|e| format!("Cannot resume '{agent_id}': {e}"))?;

    println!(
        "  Resuming {} ({}) after {} cycles",
        state.profile.ai_name, state.agent_id, state.cycles_completed
    );
    println!();

    session::execute(&config, state).await
}
