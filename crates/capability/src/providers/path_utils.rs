//! Workspace confinement for file and shell providers

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Path {path} is outside workspace {workspace}")]
pub struct OutsideWorkspace {
    pub path: String,
    pub workspace: String,
}

/// Resolve `path` against the workspace and refuse anything that lands
/// outside it.
///
/// Relative paths are joined to the workspace, `~/` expands to the home
/// directory, `..` is folded before the check, and the deepest existing
/// ancestor is canonicalized so symlinks cannot smuggle a path out.
pub async fn validate_workspace_path(
    path: &str,
    workspace: &Path,
) -> Result<PathBuf, OutsideWorkspace> {
    let candidate = if path.starts_with('~') {
        hivemind_config::expand_home(path)
    } else if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        workspace.join(path)
    };

    let root = resolve(workspace).await;
    let resolved = resolve(&candidate).await;

    if !resolved.starts_with(&root) {
        return Err(OutsideWorkspace {
            path: path.to_string(),
            workspace: root.display().to_string(),
        });
    }
    Ok(resolved)
}

async fn resolve(path: &Path) -> PathBuf {
    let normalized = normalize(path);
    let mut existing = normalized.clone();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(&existing).await {
            let mut out = canonical;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return normalized,
        }
    }
}

/// Fold `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_folds_parent_dirs() {
        assert_eq!(
            normalize(Path::new("/srv/ops/a/../b/./c.txt")),
            PathBuf::from("/srv/ops/b/c.txt")
        );
        assert_eq!(normalize(Path::new("/srv/../..")), PathBuf::from("/"));
    }

    #[tokio::test]
    async fn test_relative_path_joins_workspace() {
        let temp = TempDir::new().unwrap();
        let resolved = validate_workspace_path("notes/a.txt", temp.path())
            .await
            .unwrap();
        assert_eq!(
            resolved,
            temp.path().canonicalize().unwrap().join("notes/a.txt")
        );
    }

    #[tokio::test]
    async fn test_missing_parent_cannot_escape() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ops");
        fs::create_dir(&workspace).unwrap();

        let result = validate_workspace_path("missing/../../escape.txt", &workspace).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_workspace_root_itself_is_allowed() {
        let temp = TempDir::new().unwrap();
        assert!(validate_workspace_path(".", temp.path()).await.is_ok());
    }
}
