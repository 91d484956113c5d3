//! Tests for Config serialization, deserialization, and core functionality

use hivemind_config::{CapabilitiesConfig, Config, EngineConfig, PlannerConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.planner.model, "anthropic/claude-sonnet-4");
    assert_eq!(config.planner.max_tokens, 4096);
    assert!(config.planner.api_key.is_empty());
    assert!(config.planner.api_base.is_none());

    assert_eq!(config.engine.workspace, "~/.hivemind/ops");
    assert_eq!(config.engine.state_dir, "~/.hivemind/missions");
    assert_eq!(config.engine.step_timeout_secs, 300);
    assert_eq!(config.engine.history_window, 10);
    assert_eq!(config.engine.retry_limit, 2);
    assert_eq!(config.engine.replan_limit, 1);
    assert_eq!(config.engine.escalation_budget, 3);

    assert_eq!(config.capabilities.shell.timeout_secs, 60);
    assert_eq!(config.capabilities.web.max_results, 5);
    assert!(config.capabilities.web.search_api_key.is_empty());
}

#[test]
fn test_section_defaults_match_root() {
    let engine = EngineConfig::default();
    let planner = PlannerConfig::default();
    let caps = CapabilitiesConfig::default();
    let root = Config::default();

    assert_eq!(engine.retry_limit, root.engine.retry_limit);
    assert_eq!(planner.model, root.planner.model);
    assert_eq!(caps.shell.timeout_secs, root.capabilities.shell.timeout_secs);
}

#[test]
fn test_empty_json_uses_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.engine.escalation_budget, 3);
    assert_eq!(config.planner.model, "anthropic/claude-sonnet-4");
}

#[test]
fn test_partial_json_keeps_other_defaults() {
    let json = r#"{
        "engine": { "retry_limit": 5 },
        "planner": { "api_key": "sk-or-abc" }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.engine.retry_limit, 5);
    assert_eq!(config.engine.replan_limit, 1);
    assert_eq!(config.engine.step_timeout_secs, 300);
    assert_eq!(config.api_key(), Some("sk-or-abc".to_string()));
}

#[test]
fn test_api_base_skipped_when_absent() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("api_base"));
}

#[test]
fn test_api_key_whitespace_is_missing() {
    let mut config = Config::default();
    config.planner.api_key = "  ".to_string();
    assert!(!config.has_api_key());
    assert_eq!(config.api_key(), None);
}

#[test]
fn test_workspace_path_expands_home() {
    let config = Config::default();
    let home = dirs::home_dir().unwrap();
    assert_eq!(config.workspace_path(), home.join(".hivemind/ops"));
    assert_eq!(config.state_dir(), home.join(".hivemind/missions"));
}

#[test]
fn test_absolute_paths_untouched() {
    let mut config = Config::default();
    config.engine.workspace = "/srv/ops".to_string();
    config.engine.state_dir = "relative/missions".to_string();

    assert_eq!(config.workspace_path(), PathBuf::from("/srv/ops"));
    assert_eq!(config.state_dir(), PathBuf::from("relative/missions"));
}

#[tokio::test]
async fn test_save_and_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.planner.api_key = "sk-test".to_string();
    config.engine.escalation_budget = 7;
    config.capabilities.web.search_api_key = "brave".to_string();

    config.save_to(&path).await.unwrap();
    assert!(path.exists());

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.planner.api_key, "sk-test");
    assert_eq!(loaded.engine.escalation_budget, 7);
    assert_eq!(loaded.search_api_key(), Some("brave".to_string()));
}

#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let config = Config::load_from(&dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(config.engine.history_window, 10);
}

#[tokio::test]
async fn test_load_invalid_json_fails() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = Config::load_from(&path).await;
    assert!(result.is_err());
}
