//! File-backed agent state.
//!
//! Layout: `<data_dir>/agents/<agent_id>/state.json`. Every save writes a
//! temporary file next to the state file and renames it into place, so a
//! crash mid-write leaves the previous state intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thinkloop_core::error::StateError;
use thinkloop_core::state::{AgentState, StateStore};
use tracing::{debug, warn};
use uuid::Uuid;

const STATE_FILE: &str = "state.json";

/// Generate an agent id of the form `<name>-<8 hex chars>`.
pub fn generate_agent_id(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "agent" } else { slug };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{slug}-{}", &suffix[..8])
}

pub struct FileStateStore {
    agents_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            agents_dir: data_dir.as_ref().join("agents"),
        }
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf, StateError> {
        let valid = !agent_id.is_empty()
            && agent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StateError::Storage(format!("Invalid agent id '{agent_id}'")));
        }
        Ok(self.agents_dir.join(agent_id))
    }
}

fn storage_error(context: &str, path: &Path, e: std::io::Error) -> StateError {
    StateError::Storage(format!("{context} {}: {e}", path.display()))
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, agent_id: &str) -> Result<AgentState, StateError> {
        let path = self.agent_dir(agent_id)?.join(STATE_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(agent_id.to_string()));
            }
            Err(e) => return Err(storage_error("Failed to read", &path, e)),
        };
        let state: AgentState = serde_json::from_str(&content)?;
        debug!(agent_id, episodes = state.history.len(), "Agent state loaded");
        Ok(state)
    }

    async fn save(&self, state: &AgentState) -> Result<(), StateError> {
        let dir = self.agent_dir(&state.agent_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error("Failed to create", &dir, e))?;

        let content = serde_json::to_string_pretty(state)?;
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let target = dir.join(STATE_FILE);
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| storage_error("Failed to write", &tmp, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| storage_error("Failed to replace", &target, e))?;

        debug!(agent_id = %state.agent_id, episodes = state.history.len(), "Agent state saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StateError> {
        let mut entries = match tokio::fs::read_dir(&self.agents_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("Failed to list", &self.agents_dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error("Failed to list", &self.agents_dir, e))?
        {
            if !entry.path().join(STATE_FILE).is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(id) => ids.push(id),
                Err(name) => warn!(?name, "Skipping agent directory with non-UTF-8 name"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, agent_id: &str) -> Result<(), StateError> {
        let dir = self.agent_dir(agent_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StateError::NotFound(agent_id.to_string()))
            }
            Err(e) => Err(storage_error("Failed to delete", &dir, e)),
        }
    }
}
