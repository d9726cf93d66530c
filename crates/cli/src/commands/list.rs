//! `thinkloop list`: show saved agents.

use thinkloop_config::AppConfig;
use thinkloop_core::state::StateStore;
use thinkloop_storage::FileStateStore;
use tracing::warn;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = FileStateStore::new(config.data_dir());
    let ids = store.list().await?;

    if ids.is_empty() {
        println!("No saved agents in {}", config.data_dir().display());
        return Ok(());
    }

    println!("{:<28} {:>7} {:>10}  {:<20}  Goal", "Agent", "Cycles", "Cost", "Updated");
    for id in ids {
        match store.load(&id).await {
            Ok(state) => {
                let goal = state.profile.goals.first().map(String::as_str).unwrap_or("-");
                println!(
                    "{:<28} {:>7} {:>10}  {:<20}  {goal}",
                    state.agent_id,
                    state.cycles_completed,
                    format!("${:.4}", state.budget.total_cost_usd),
                    state.updated_at.format("%Y-%m-%d %H:%M"),
                );
            }
            Err(e) => warn!(agent_id = %id, error = %e, "Skipping unreadable agent state"),
        }
    }
    Ok(())
}
