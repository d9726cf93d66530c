//! Path validation: keeps workspace access inside the workspace root.
//!
//! Rejects `..` traversal, absolute paths outside the root, symlinks that
//! lead out of the root, and configured forbidden prefixes.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideRoot { path: String },

    #[error("Path '{path}' matches forbidden path '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },
}

/// Resolve `path` against the workspace `root`.
///
/// `root` must already be canonical. With `restrict` off, absolute paths and
/// `..` are allowed; forbidden prefixes are enforced either way.
pub fn resolve_in_root(
    root: &Path,
    path: &str,
    restrict: bool,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let normalized = path.trim().replace('\\', "/");
    let raw = Path::new(&normalized);
    let candidate = if normalized.is_empty() || normalized == "." {
        root.to_path_buf()
    } else if raw.is_absolute() {
        lexical_normalize(raw)
    } else {
        lexical_normalize(&root.join(raw))
    };

    if restrict {
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathValidationError::PathTraversal { path: path.into() });
        }
        if !candidate.starts_with(root) {
            return Err(PathValidationError::OutsideRoot { path: path.into() });
        }
        // A symlink inside the root may still point outside it
        if let Some(existing) = nearest_existing(&candidate) {
            let resolved = existing
                .canonicalize()
                .map_err(|_| PathValidationError::OutsideRoot { path: path.into() })?;
            if !resolved.starts_with(root) {
                return Err(PathValidationError::OutsideRoot { path: path.into() });
            }
        }
    }

    for forbidden in forbidden_paths {
        let pattern = forbidden.trim().trim_start_matches("./").trim_end_matches('/');
        if pattern.is_empty() {
            continue;
        }
        let pattern_path = Path::new(pattern);
        let hit = if pattern_path.is_absolute() {
            candidate.starts_with(pattern_path)
        } else {
            candidate
                .strip_prefix(root)
                .map(|rel| rel.starts_with(pattern_path))
                .unwrap_or(false)
        };
        if hit {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                pattern: forbidden.clone(),
            });
        }
    }

    Ok(candidate)
}

/// Fold `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}
