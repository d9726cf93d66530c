//! Local-disk workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thinkloop_core::error::WorkspaceError;
use thinkloop_core::workspace::Workspace;
use tracing::debug;

use crate::path::{PathValidationError, resolve_in_root};

/// A workspace rooted at a directory on disk.
pub struct LocalWorkspace {
    root: PathBuf,
    restrict_to_root: bool,
    forbidden_paths: Vec<String>,
}

impl LocalWorkspace {
    /// Open (creating if needed) a workspace at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| io_error(root, e))?;
        let root = root.canonicalize().map_err(|e| io_error(root, e))?;
        debug!(root = %root.display(), "Workspace opened");
        Ok(Self {
            root,
            restrict_to_root: true,
            forbidden_paths: Vec::new(),
        })
    }

    pub fn with_restriction(mut self, restrict_to_root: bool) -> Self {
        self.restrict_to_root = restrict_to_root;
        self
    }

    pub fn with_forbidden_paths(mut self, forbidden_paths: Vec<String>) -> Self {
        self.forbidden_paths = forbidden_paths;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        resolve_in_root(&self.root, path, self.restrict_to_root, &self.forbidden_paths).map_err(
            |e| {
                let reason = match &e {
                    PathValidationError::ForbiddenPath { .. } => e.to_string(),
                    _ => format!("{e}; only paths inside the workspace may be used"),
                };
                WorkspaceError::AccessDenied {
                    path: path.to_string(),
                    reason,
                }
            },
        )
    }

    fn relative(&self, full: &Path) -> String {
        full.strip_prefix(&self.root)
            .unwrap_or(full)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn io_error(path: &Path, e: std::io::Error) -> WorkspaceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        WorkspaceError::NotFound(path.display().to_string())
    } else if e.kind() == std::io::ErrorKind::PermissionDenied {
        WorkspaceError::AccessDenied {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    } else {
        WorkspaceError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn read(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WorkspaceError::NotFound(path.to_string()),
            _ => io_error(&full, e),
        })
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), WorkspaceError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| io_error(&full, e))?;
        debug!(path, bytes = data.len(), "Workspace file written");
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, WorkspaceError> {
        let start = self.resolve(path)?;
        if !start.is_dir() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }

        let mut files = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_error(&dir, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
                let entry_path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| io_error(&entry_path, e))?;
                if file_type.is_dir() {
                    pending.push(entry_path);
                } else {
                    files.push(self.relative(&entry_path));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WorkspaceError::NotFound(path.to_string()),
            _ => io_error(&full, e),
        })?;
        debug!(path, "Workspace file deleted");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, WorkspaceError> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, LocalWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path()).unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, ws) = workspace();
        ws.write("output.txt", b"Washington").await.unwrap();
        assert_eq!(ws.read("output.txt").await.unwrap(), b"Washington");
        assert_eq!(ws.read_text("output.txt").await.unwrap(), "Washington");
        assert!(ws.exists("output.txt").await.unwrap());
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let (_dir, ws) = workspace();
        ws.write("deep/nested/file.md", b"# hi").await.unwrap();
        assert!(ws.root().join("deep/nested/file.md").exists());
    }

    #[tokio::test]
    async fn list_is_recursive_relative_and_sorted() {
        let (_dir, ws) = workspace();
        ws.write("b.txt", b"b").await.unwrap();
        ws.write("a/z.txt", b"z").await.unwrap();
        ws.write("a/c.txt", b"c").await.unwrap();

        assert_eq!(ws.list("").await.unwrap(), vec!["a/c.txt", "a/z.txt", "b.txt"]);
        assert_eq!(ws.list("a").await.unwrap(), vec!["a/c.txt", "a/z.txt"]);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.read("nope.txt").await, Err(WorkspaceError::NotFound(_))));
        assert!(matches!(ws.delete("nope.txt").await, Err(WorkspaceError::NotFound(_))));
        assert!(matches!(ws.list("nope").await, Err(WorkspaceError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let (_dir, ws) = workspace();
        ws.write("tmp.txt", b"x").await.unwrap();
        ws.delete("tmp.txt").await.unwrap();
        assert!(!ws.exists("tmp.txt").await.unwrap());
    }

    #[tokio::test]
    async fn escape_attempts_are_access_denied() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.read("../outside.txt").await,
            Err(WorkspaceError::AccessDenied { .. })
        ));
        assert!(matches!(
            ws.write("/etc/evil", b"x").await,
            Err(WorkspaceError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn forbidden_paths_are_access_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ws = LocalWorkspace::new(dir.path())
            .unwrap()
            .with_forbidden_paths(vec![".git".into()]);
        assert!(matches!(
            ws.write(".git/config", b"x").await,
            Err(WorkspaceError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn unrestricted_workspace_reaches_outside() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("ws");
        let ws = LocalWorkspace::new(&inner).unwrap().with_restriction(false);
        ws.write("../sibling.txt", b"hello").await.unwrap();
        assert!(outer.path().join("sibling.txt").exists());
    }
}
