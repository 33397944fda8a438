//! Workspace root confinement for agent file access

use crate::error::{Error, Result, SandboxError};
use std::path::{Component, Path, PathBuf};

/// The directory every capability request is confined to.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Canonicalize `root`; it must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| {
            Error::Sandbox(SandboxError::InvalidPath(format!(
                "workspace root {:?} is unusable: {}",
                root, e
            )))
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a path sent by the agent to an absolute path inside the root.
    ///
    /// Relative paths are taken from the root. `..` is applied lexically,
    /// then the deepest existing ancestor is canonicalized so a symlink
    /// cannot point the result elsewhere. The final check is per component,
    /// so `/ws-other` never passes for a root of `/ws`.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        if requested.is_empty() {
            return Err(Error::Sandbox(SandboxError::MissingParam("path".into())));
        }
        if requested.contains('\0') {
            return Err(Error::Sandbox(SandboxError::InvalidPath(requested.into())));
        }

        let joined = self.root.join(requested);
        let cleaned = clean_path(&joined);
        let resolved = canonicalize_existing_prefix(&cleaned);

        if !resolved.starts_with(&self.root) {
            return Err(Error::Sandbox(SandboxError::PathTraversal(requested.into())));
        }
        Ok(resolved)
    }
}

/// Normalize `.` and `..` without touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut remaining = Vec::new();

    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                remaining.push(name.to_owned());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut result = existing.canonicalize().unwrap_or(existing);
    for part in remaining.into_iter().rev() {
        result.push(part);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn traversal(result: Result<PathBuf>) -> bool {
        matches!(result, Err(Error::Sandbox(SandboxError::PathTraversal(_))))
    }

    #[test]
    fn test_resolves_relative_and_absolute_inside() {
        let dir = tempdir().unwrap();
        let ws = WorkspaceRoot::new(dir.path()).unwrap();
        let root = ws.path().to_path_buf();

        assert_eq!(ws.resolve("src/main.rs").unwrap(), root.join("src/main.rs"));
        assert_eq!(ws.resolve("./a/../b.txt").unwrap(), root.join("b.txt"));
        assert_eq!(
            ws.resolve(root.join("x.txt").to_str().unwrap()).unwrap(),
            root.join("x.txt")
        );
        assert_eq!(ws.resolve(".").unwrap(), root);
    }

    #[test]
    fn test_rejects_parent_escapes_with_and_without_trailing_separator() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("ws")).unwrap();

        let plain = dir.path().join("ws");
        let trailing = format!("{}/", plain.display());

        for root in [plain.to_string_lossy().to_string(), trailing] {
            let ws = WorkspaceRoot::new(&root).unwrap();
            assert!(traversal(ws.resolve("../../etc/passwd")), "root {}", root);
            assert!(traversal(ws.resolve("../secret")), "root {}", root);
            assert!(traversal(ws.resolve("a/../../secret")), "root {}", root);
            assert!(traversal(ws.resolve("/etc/passwd")), "root {}", root);
        }
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("ws")).unwrap();
        std::fs::create_dir(dir.path().join("ws-other")).unwrap();

        let ws = WorkspaceRoot::new(dir.path().join("ws")).unwrap();
        let sibling = dir.path().join("ws-other").join("file.txt");
        assert!(traversal(ws.resolve(sibling.to_str().unwrap())));
        assert!(traversal(ws.resolve("../ws-other/file.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let ws = WorkspaceRoot::new(dir.path()).unwrap();
        assert!(traversal(ws.resolve("link/new-file.txt")));
    }

    #[test]
    fn test_empty_path_is_missing_param() {
        let dir = tempdir().unwrap();
        let ws = WorkspaceRoot::new(dir.path()).unwrap();
        assert!(matches!(
            ws.resolve(""),
            Err(Error::Sandbox(SandboxError::MissingParam(_)))
        ));
    }

    #[test]
    fn test_missing_root() {
        assert!(WorkspaceRoot::new("/definitely/not/a/real/root").is_err());
    }
}
