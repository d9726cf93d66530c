//! Workspace trait: relative-path file access for commands.
//!
//! Implementations: local disk with sandboxing, in-memory.

use std::path::Path;

use async_trait::async_trait;

use crate::error::WorkspaceError;

#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read(&self, path: &str) -> std::result::Result<Vec<u8>, WorkspaceError>;

    async fn write(&self, path: &str, data: &[u8]) -> std::result::Result<(), WorkspaceError>;

    /// Files under `path`, relative to the workspace root, sorted.
    async fn list(&self, path: &str) -> std::result::Result<Vec<String>, WorkspaceError>;

    async fn delete(&self, path: &str) -> std::result::Result<(), WorkspaceError>;

    async fn exists(&self, path: &str) -> std::result::Result<bool, WorkspaceError>;

    /// Root directory on disk, if the workspace is disk-backed.
    fn local_root(&self) -> Option<&Path> {
        None
    }

    /// Read a file as UTF-8 text.
    async fn read_text(&self, path: &str) -> std::result::Result<String, WorkspaceError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|e| WorkspaceError::Io {
            path: path.to_string(),
            reason: format!("not valid UTF-8: {e}"),
        })
    }
}
