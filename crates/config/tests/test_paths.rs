//! Tests for path utilities

use hivemind_config::paths::{
    config_path, data_dir, ensure_dir, expand_home, safe_filename, state_dir, workspace_path,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_safe_filename_special_chars() {
    assert_eq!(safe_filename("file<name>"), "file_name_");
    assert_eq!(safe_filename("file:name"), "file_name");
    assert_eq!(safe_filename("file/name"), "file_name");
    assert_eq!(safe_filename("file\\name"), "file_name");
    assert_eq!(safe_filename("<>:\"/\\|?*"), "_________");
}

#[test]
fn test_safe_filename_leaves_uuids_alone() {
    let id = "5f0c6d1e-8a3b-4c2d-9e7f-0a1b2c3d4e5f";
    assert_eq!(safe_filename(id), id);
}

#[test]
fn test_expand_home() {
    let home = dirs::home_dir().expect("No home dir");

    assert_eq!(expand_home("~/ops"), home.join("ops"));
    assert_eq!(expand_home("~"), home);
    assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
}

#[test]
fn test_all_dirs_under_data_dir() {
    let data = data_dir();
    let home = dirs::home_dir().expect("No home dir");

    assert_eq!(data, home.join(".hivemind"));
    assert!(config_path().starts_with(&data));
    assert!(workspace_path().starts_with(&data));
    assert!(state_dir().starts_with(&data));
    assert!(config_path().ends_with("config.json"));
}

#[tokio::test]
async fn test_ensure_dir_nested_and_idempotent() {
    let temp_dir = temp_dir();
    let nested = temp_dir.path().join("a/b/c");

    ensure_dir(&nested).await.expect("first create");
    ensure_dir(&nested).await.expect("second create");

    assert!(nested.is_dir());
}

#[tokio::test]
async fn test_ensure_dir_on_file() {
    let temp_dir = temp_dir();
    let file_path = temp_dir.path().join("a_file");
    tokio::fs::write(&file_path, "content").await.unwrap();

    assert!(ensure_dir(&file_path).await.is_err());
}
