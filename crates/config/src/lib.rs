//! Configuration management for hivemind
//!
//! Loads and saves planner, engine and capability settings from
//! `~/.hivemind/config.json`. Every field has a default so a missing or
//! partial file is always usable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, expand_home, state_dir, workspace_path};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("◆ CONFIG I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variables that override file settings
pub const ENV_API_KEY: &str = "HIVEMIND_API_KEY";
pub const ENV_MODEL: &str = "HIVEMIND_MODEL";
pub const ENV_API_BASE: &str = "HIVEMIND_API_BASE";
pub const ENV_STATE_DIR: &str = "HIVEMIND_STATE_DIR";

/// Planner (text-generation endpoint) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

/// Mission engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_replan_limit")]
    pub replan_limit: u32,
    #[serde(default = "default_escalation_budget")]
    pub escalation_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            state_dir: default_state_dir(),
            step_timeout_secs: default_step_timeout_secs(),
            history_window: default_history_window(),
            retry_limit: default_retry_limit(),
            replan_limit: default_replan_limit(),
            escalation_budget: default_escalation_budget(),
        }
    }
}

fn default_workspace() -> String {
    "~/.hivemind/ops".to_string()
}

fn default_state_dir() -> String {
    "~/.hivemind/missions".to_string()
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_history_window() -> usize {
    10
}

fn default_retry_limit() -> u32 {
    2
}

fn default_replan_limit() -> u32 {
    1
}

fn default_escalation_budget() -> u32 {
    3
}

/// Shell capability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout_secs(),
        }
    }
}

fn default_shell_timeout_secs() -> u64 {
    60
}

/// Web capability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub search_api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> u32 {
    5
}

/// Built-in capability settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub async fn load() -> Result<Self> {
        let path = config_path();
        let mut config = Self::load_from(&path).await?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; tests pass a closure over a fixed map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.planner.api_key = key;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.planner.model = model;
        }
        if let Some(base) = non_empty(ENV_API_BASE) {
            self.planner.api_base = Some(base);
        }
        if let Some(dir) = non_empty(ENV_STATE_DIR) {
            self.engine.state_dir = dir;
        }
    }

    /// Workspace that file and shell capabilities are confined to
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.engine.workspace)
    }

    /// Directory holding persisted missions
    pub fn state_dir(&self) -> PathBuf {
        expand_home(&self.engine.state_dir)
    }

    /// Planner API key, if configured
    pub fn api_key(&self) -> Option<String> {
        let key = self.planner.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Planner endpoint base URL, if overridden
    pub fn api_base(&self) -> Option<String> {
        self.planner
            .api_base
            .as_ref()
            .filter(|b| !b.is_empty())
            .cloned()
    }

    pub fn model(&self) -> String {
        self.planner.model.clone()
    }

    /// Per-invocation ceiling for capability calls
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.step_timeout_secs)
    }

    /// Web search API key, if configured
    pub fn search_api_key(&self) -> Option<String> {
        let key = &self.capabilities.web.search_api_key;
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

/// Create the default config file (if absent), the workspace and the state
/// directory, then load the result.
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY EXISTS AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG CREATED AT {:?}", config_path);
    }

    let config = Config::load().await?;

    let workspace = config.workspace_path();
    paths::ensure_dir(&workspace).await?;
    info!("◆ WORKSPACE READY AT {:?}", workspace);

    let state_dir = config.state_dir();
    paths::ensure_dir(&state_dir).await?;
    info!("◆ MISSION STORE READY AT {:?}", state_dir);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_replace_planner_fields() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "sk-env"),
            (ENV_MODEL, "openai/gpt-4o"),
            (ENV_API_BASE, "http://localhost:8000/v1"),
            (ENV_STATE_DIR, "/tmp/missions"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key(), Some("sk-env".to_string()));
        assert_eq!(config.model(), "openai/gpt-4o");
        assert_eq!(
            config.api_base(),
            Some("http://localhost:8000/v1".to_string())
        );
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/missions"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.planner.api_key = "from-file".to_string();
        config.apply_env_overrides(|_| Some("   ".to_string()));

        assert_eq!(config.api_key(), Some("from-file".to_string()));
        assert_eq!(config.model(), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn test_step_timeout_default() {
        let config = Config::default();
        assert_eq!(config.step_timeout(), Duration::from_secs(300));
    }
}
