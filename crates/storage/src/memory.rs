//! In-memory workspace and state store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use thinkloop_core::error::{StateError, WorkspaceError};
use thinkloop_core::state::{AgentState, StateStore};
use thinkloop_core::workspace::Workspace;
use tokio::sync::RwLock;

/// A workspace whose files live in a map. Paths are always confined.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the workspace with files.
    pub fn with_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let map = files
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            files: RwLock::new(map),
        }
    }

    /// Snapshot of a file's contents as text.
    pub async fn contents(&self, path: &str) -> Option<String> {
        let key = normalize(path).ok()?;
        self.files
            .read()
            .await
            .get(&key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

fn normalize(path: &str) -> Result<String, WorkspaceError> {
    let cleaned = path.trim().replace('\\', "/");
    let mut parts = Vec::new();
    for part in cleaned.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(WorkspaceError::AccessDenied {
                    path: path.to_string(),
                    reason: "path traversal is not allowed".into(),
                });
            }
            p => parts.push(p),
        }
    }
    Ok(parts.join("/"))
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn read(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let key = normalize(path)?;
        self.files
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), WorkspaceError> {
        let key = normalize(path)?;
        if key.is_empty() {
            return Err(WorkspaceError::Io {
                path: path.to_string(),
                reason: "not a file path".into(),
            });
        }
        self.files.write().await.insert(key, data.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, WorkspaceError> {
        let prefix = normalize(path)?;
        let files = self.files.read().await;
        let listed: Vec<String> = files
            .keys()
            .filter(|k| prefix.is_empty() || k.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect();
        if listed.is_empty() && !prefix.is_empty() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        Ok(listed)
    }

    async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let key = normalize(path)?;
        self.files
            .write()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, WorkspaceError> {
        let key = normalize(path)?;
        Ok(self.files.read().await.contains_key(&key))
    }
}

/// Agent state kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, AgentState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, agent_id: &str) -> Result<AgentState, StateError> {
        self.states
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(agent_id.to_string()))
    }

    async fn save(&self, state: &AgentState) -> Result<(), StateError> {
        self.states
            .write()
            .await
            .insert(state.agent_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StateError> {
        let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, agent_id: &str) -> Result<(), StateError> {
        self.states
            .write()
            .await
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| StateError::NotFound(agent_id.to_string()))
    }
}
