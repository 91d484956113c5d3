//! Durable mission state
//!
//! One pretty-printed JSON document per mission, `<state_dir>/<id>.json`.
//! Documents are written to a temporary file and renamed into place.

use async_trait::async_trait;
use hivemind_config::paths::safe_filename;
use hivemind_mission::{Mission, MissionSummary};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("◆ STORE I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ CORRUPT MISSION RECORD: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ MISSION {0} NOT FOUND")]
    NotFound(String),

    #[error("◆ MISSION {0} IS CLOSED")]
    TerminalMission(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for mission records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert or replace. Once a terminal snapshot is stored, writing the
    /// identical snapshot is a no-op and any other write is refused.
    async fn save(&self, mission: &Mission) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Mission>;

    /// Every mission, oldest first
    async fn load_all(&self) -> Result<Vec<Mission>>;

    /// Returns whether a record was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every record; returns how many were removed
    async fn clear(&self) -> Result<usize>;

    /// Summaries of the `limit` most recent missions, newest first
    async fn history(&self, limit: usize) -> Result<Vec<MissionSummary>> {
        let missions = self.load_all().await?;
        Ok(missions
            .iter()
            .rev()
            .take(limit)
            .map(Mission::summary)
            .collect())
    }

    /// The most recently created mission, if any
    async fn last(&self) -> Result<Option<Mission>> {
        Ok(self.load_all().await?.pop())
    }
}

/// File-backed [`StateStore`]
pub struct JsonStateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store rooted at `dir`, created if missing
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir).await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn mission_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(id)))
    }

    async fn read(&self, path: &Path) -> Result<Option<Mission>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().map(|e| e == "json").unwrap_or(false)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if is_record {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn save(&self, mission: &Mission) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.mission_path(&mission.id);

        if let Some(stored) = self.read(&path).await? {
            if stored.is_terminal() {
                if &stored == mission {
                    debug!("◆ MISSION {} UNCHANGED", mission.id);
                    return Ok(());
                }
                return Err(StoreError::TerminalMission(mission.id.clone()));
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(mission)?;
        let tmp = self
            .dir
            .join(format!(".{}.json.tmp", safe_filename(&mission.id)));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("◆ MISSION {} SAVED ({})", mission.id, mission.status);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Mission> {
        self.read(&self.mission_path(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn load_all(&self) -> Result<Vec<Mission>> {
        let mut missions = Vec::new();
        for path in self.json_files().await? {
            match self.read(&path).await {
                Ok(Some(mission)) => missions.push(mission),
                Ok(None) => {}
                Err(e) => warn!("◆ SKIPPING {:?}: {}", path, e),
            }
        }
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(missions)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.mission_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let paths = self.json_files().await?;
        for path in &paths {
            tokio::fs::remove_file(path).await?;
        }
        Ok(paths.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mission_path_sanitizes_id() {
        let store = JsonStateStore::new("/tmp/missions");
        assert_eq!(
            store.mission_path("a/b:c"),
            PathBuf::from("/tmp/missions/a_b_c.json")
        );
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("missions");
        let store = JsonStateStore::open(&dir).await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_load_all_on_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("absent"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path());
        let mission = Mission::new("g", 3);
        store.save(&mission).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{}.json", mission.id)]);
    }
}
