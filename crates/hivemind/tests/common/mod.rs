//! Common test utilities for hivemind integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use hivemind_mission::Mission;
use hivemind_store::{JsonStateStore, StateStore};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".hivemind");

        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.data_dir.join("ops")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("missions")
    }

    /// Command whose home directory is the test environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hivemind"));
        cmd.env("HOME", self.temp_dir.path());
        for key in [
            "HIVEMIND_API_KEY",
            "HIVEMIND_MODEL",
            "HIVEMIND_API_BASE",
            "HIVEMIND_STATE_DIR",
            "RUST_LOG",
        ] {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Write a config with a planner key and search disabled
    pub fn create_config(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let config = r#"{
  "planner": {
    "api_key": "test-api-key",
    "model": "test/model"
  }
}"#;
        std::fs::write(self.config_file(), config)?;
        Ok(())
    }

    /// Persist a mission the way the engine would
    pub fn save_mission(&self, mission: &Mission) -> anyhow::Result<()> {
        tokio_test::block_on(async {
            let store = JsonStateStore::open(self.state_dir()).await?;
            store.save(mission).await?;
            Ok::<(), anyhow::Error>(())
        })
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
