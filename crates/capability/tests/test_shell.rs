//! Tests for the shell provider

use hivemind_capability::{ActionOutcome, Capability, Params, ShellProvider};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

#[tokio::test]
async fn test_echo_succeeds() {
    let temp = TempDir::new().unwrap();
    let shell = ShellProvider::with_workspace(temp.path().to_path_buf());

    let outcome = shell
        .execute(
            "execute_command",
            &params(json!({"command": "echo 'Hello from shell'"})),
        )
        .await
        .unwrap();

    match outcome {
        ActionOutcome::Success { data, .. } => {
            assert_eq!(data["exit_code"], 0);
            assert!(data["stdout"]
                .as_str()
                .unwrap()
                .contains("Hello from shell"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_runs_in_workspace() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("marker.txt"), "").unwrap();
    let shell = ShellProvider::with_workspace(temp.path().to_path_buf());

    let outcome = shell
        .execute("execute_command", &params(json!({"command": "ls"})))
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Success { data, .. } => {
            assert!(data["stdout"].as_str().unwrap().contains("marker.txt"))
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_nonzero_exit_is_failure() {
    let temp = TempDir::new().unwrap();
    let shell = ShellProvider::with_workspace(temp.path().to_path_buf());

    let outcome = shell
        .execute(
            "execute_command",
            &params(json!({"command": "echo oops >&2; exit 3"})),
        )
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Failure { error, details } => {
            assert_eq!(error, "command exited with code 3");
            assert!(details.unwrap().contains("oops"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_is_failure() {
    let temp = TempDir::new().unwrap();
    let shell = ShellProvider::new(1, temp.path().to_path_buf());

    let outcome = shell
        .execute("execute_command", &params(json!({"command": "sleep 5"})))
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Failure { error, .. } => assert!(error.contains("timed out")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_working_dir_outside_workspace() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ops");
    fs::create_dir(&workspace).unwrap();
    let shell = ShellProvider::with_workspace(workspace);

    let outcome = shell
        .execute(
            "execute_command",
            &params(json!({"command": "pwd", "working_dir": temp.path().to_str().unwrap()})),
        )
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Failure { details, .. } => {
            assert!(details.unwrap().contains("is outside workspace"))
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_action_is_error() {
    let shell = ShellProvider::with_workspace(std::env::temp_dir());
    assert!(shell.execute("spawn", &Params::new()).await.is_err());
}
