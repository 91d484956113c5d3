//! Tests for CapabilityRegistry

use async_trait::async_trait;
use hivemind_capability::{
    ActionOutcome, ActionSpec, BoxError, Capability, CapabilityError, CapabilityRegistry,
    ParamSpec, Params,
};
use serde_json::json;
use std::time::Duration;

struct EchoCapability {
    name: String,
}

impl EchoCapability {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Echo params back"
    }
    fn actions(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::new("echo", "Return params").param(ParamSpec::required("text", "Text")),
            ActionSpec::new("refuse", "Always fails"),
            ActionSpec::new("break", "Raises"),
            ActionSpec::new("sleep", "Never finishes in time"),
        ]
    }
    async fn execute(&self, action: &str, params: &Params) -> Result<ActionOutcome, BoxError> {
        match action {
            "echo" => Ok(ActionOutcome::success(json!(params))),
            "refuse" => Ok(ActionOutcome::failure("refused")),
            "sleep" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ActionOutcome::success(json!(null)))
            }
            _ => Err("pipe closed".into()),
        }
    }
}

fn params(text: &str) -> Params {
    let mut params = Params::new();
    params.insert("text".to_string(), json!(text));
    params
}

#[test]
fn test_registry_new_is_empty() {
    let registry = CapabilityRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.names().is_empty());
    assert!(registry.describe_all().is_empty());
    assert_eq!(registry.timeout(), Duration::from_secs(300));
}

#[test]
fn test_register_and_query() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    assert!(registry.has("echo"));
    assert!(!registry.has("missing"));
    assert!(registry.supports("echo", "echo"));
    assert!(!registry.supports("echo", "shout"));
    assert!(!registry.supports("missing", "echo"));
    assert_eq!(registry.get("echo").unwrap().description(), "Echo params back");
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    let result = registry.register(EchoCapability::new("echo"));
    assert!(matches!(result, Err(CapabilityError::DuplicateProvider(name)) if name == "echo"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_describe_all_sorted_by_name() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("zeta")).unwrap();
    registry.register(EchoCapability::new("alpha")).unwrap();
    registry.register(EchoCapability::new("mid")).unwrap();

    let names: Vec<String> = registry
        .describe_all()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);

    let descriptor = &registry.describe_all()[0];
    assert!(descriptor.has_action("echo"));
    assert!(descriptor.actions[0].params[0].required);
}

#[tokio::test]
async fn test_invoke_success() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    let outcome = registry.invoke("echo", "echo", &params("hi")).await.unwrap();
    assert_eq!(outcome, ActionOutcome::success(json!({"text": "hi"})));
}

#[test]
fn test_invoke_business_failure_is_not_an_error() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    let outcome = tokio_test::block_on(registry.invoke("echo", "refuse", &Params::new())).unwrap();
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_invoke_unknown_provider() {
    let registry = CapabilityRegistry::new();
    let result = registry.invoke("ghost", "echo", &Params::new()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, CapabilityError::UnknownProvider(ref p) if p == "ghost"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_invoke_unknown_action() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    let err = registry
        .invoke("echo", "shout", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::UnknownAction { .. }));
    assert!(err.to_string().contains("shout"));
}

#[tokio::test]
async fn test_invoke_provider_error_carries_detail() {
    let mut registry = CapabilityRegistry::new();
    registry.register(EchoCapability::new("echo")).unwrap();

    let err = registry
        .invoke("echo", "break", &Params::new())
        .await
        .unwrap_err();
    match err {
        CapabilityError::ProviderExecution { detail, .. } => assert_eq!(detail, "pipe closed"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invoke_timeout() {
    let mut registry = CapabilityRegistry::with_timeout(Duration::from_millis(50));
    registry.register(EchoCapability::new("echo")).unwrap();

    let err = registry
        .invoke("echo", "sleep", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Timeout { .. }));
    assert!(err.is_retryable());
}
