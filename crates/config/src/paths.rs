//! Well-known locations under ~/.hivemind

use std::path::{Path, PathBuf};

/// Root data directory (~/.hivemind), or ./.hivemind when no home is known
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".hivemind"))
        .unwrap_or_else(|| PathBuf::from(".hivemind"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default workspace that file and shell capabilities are confined to
pub fn workspace_path() -> PathBuf {
    data_dir().join("ops")
}

/// Default directory holding one JSON document per mission
pub fn state_dir() -> PathBuf {
    data_dir().join("missions")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Replace characters that are unsafe in file names
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
