//! File operations confined to the workspace

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

use super::path_utils::validate_workspace_path;
use crate::{parse_args, ActionOutcome, ActionSpec, BoxError, Capability, ParamSpec, Params};

/// `file_system` provider
pub struct FileSystemProvider {
    workspace: PathBuf,
}

impl FileSystemProvider {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &PathBuf {
        &self.workspace
    }

    async fn confine(&self, path: &str) -> Result<PathBuf, ActionOutcome> {
        validate_workspace_path(path, &self.workspace)
            .await
            .map_err(|e| ActionOutcome::failure_with_details("path outside workspace", e.to_string()))
    }

    async fn read(&self, args: PathArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        debug!("◆ READING {:?}", path);

        if path.is_dir() {
            return Ok(ActionOutcome::failure_with_details("not a file", args.path));
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let message = format!("read {} bytes from {}", content.len(), args.path);
                Ok(ActionOutcome::success_with_message(json!(content), message))
            }
            Err(e) => Ok(io_failure(e, &args.path)),
        }
    }

    async fn write(&self, args: WriteArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        debug!("◆ WRITING {:?}", path);

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(io_failure(e, &args.path));
            }
        }
        let result = if args.append {
            append(&path, &args.content).await
        } else {
            tokio::fs::write(&path, &args.content).await
        };
        match result {
            Ok(()) => Ok(ActionOutcome::success_with_message(
                json!({ "path": args.path, "bytes": args.content.len() }),
                format!("wrote {} bytes to {}", args.content.len(), args.path),
            )),
            Err(e) => Ok(io_failure(e, &args.path)),
        }
    }

    async fn list(&self, args: ListArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        debug!("◆ LISTING {:?}", path);

        if path.exists() && !path.is_dir() {
            return Ok(ActionOutcome::failure_with_details("not a directory", args.path));
        }
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) => return Ok(io_failure(e, &args.path)),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                "dir"
            } else {
                "file"
            };
            items.push((entry.file_name().to_string_lossy().to_string(), kind));
        }
        items.sort();

        let count = items.len();
        let data: Vec<_> = items
            .into_iter()
            .map(|(name, kind)| json!({ "name": name, "kind": kind }))
            .collect();
        Ok(ActionOutcome::success_with_message(
            json!(data),
            format!("{} entries in {}", count, args.path),
        ))
    }

    async fn exists(&self, args: PathArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        Ok(ActionOutcome::success(json!(exists)))
    }

    async fn delete(&self, args: DeleteArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        if path == validate_root(&self.workspace).await {
            return Ok(ActionOutcome::failure("refusing to delete the workspace root"));
        }
        debug!("◆ DELETING {:?}", path);

        let result = if path.is_dir() {
            if args.recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            }
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(ActionOutcome::success_with_message(
                json!({ "path": args.path }),
                format!("deleted {}", args.path),
            )),
            Err(e) => Ok(io_failure(e, &args.path)),
        }
    }

    async fn create_dir(&self, args: PathArgs) -> Result<ActionOutcome, BoxError> {
        let path = match self.confine(&args.path).await {
            Ok(p) => p,
            Err(outcome) => return Ok(outcome),
        };
        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => Ok(ActionOutcome::success_with_message(
                json!({ "path": args.path }),
                format!("created {}", args.path),
            )),
            Err(e) => Ok(io_failure(e, &args.path)),
        }
    }
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default = "default_list_path")]
    path: String,
}

fn default_list_path() -> String {
    ".".to_string()
}

#[derive(Deserialize)]
struct DeleteArgs {
    path: String,
    #[serde(default)]
    recursive: bool,
}

async fn append(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

async fn validate_root(workspace: &std::path::Path) -> PathBuf {
    validate_workspace_path(".", workspace)
        .await
        .unwrap_or_else(|_| workspace.to_path_buf())
}

fn io_failure(e: std::io::Error, path: &str) -> ActionOutcome {
    let error = match e.kind() {
        ErrorKind::NotFound => "file not found".to_string(),
        ErrorKind::PermissionDenied => "permission denied".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        _ => format!("i/o error: {e}"),
    };
    ActionOutcome::failure_with_details(error, path)
}

#[async_trait]
impl Capability for FileSystemProvider {
    fn name(&self) -> &str {
        "file_system"
    }

    fn description(&self) -> &str {
        "Read, write, list and delete files inside the mission workspace."
    }

    fn actions(&self) -> Vec<ActionSpec> {
        let path = || ParamSpec::required("path", "Path relative to the workspace");
        vec![
            ActionSpec::new("read", "Return the text content of a file.").param(path()),
            ActionSpec::new("write", "Write text to a file, creating parent directories.")
                .param(path())
                .param(ParamSpec::required("content", "Text to write"))
                .param(ParamSpec::optional("append", "Append instead of overwrite")),
            ActionSpec::new("list", "List a directory's entries.")
                .param(ParamSpec::optional("path", "Directory, defaults to the workspace")),
            ActionSpec::new("exists", "Report whether a path exists.").param(path()),
            ActionSpec::new("delete", "Delete a file or directory.")
                .param(path())
                .param(ParamSpec::optional("recursive", "Delete non-empty directories")),
            ActionSpec::new("create_dir", "Create a directory and its parents.").param(path()),
        ]
    }

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionOutcome, BoxError> {
        match action {
            "read" => self.read(parse_args(params)?).await,
            "write" => self.write(parse_args(params)?).await,
            "list" => self.list(parse_args(params)?).await,
            "exists" => self.exists(parse_args(params)?).await,
            "delete" => self.delete(parse_args(params)?).await,
            "create_dir" => self.create_dir(parse_args(params)?).await,
            other => Err(format!("◆ file_system HAS NO ACTION '{}'", other).into()),
        }
    }
}
