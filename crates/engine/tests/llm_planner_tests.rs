//! Tests for LlmPlanner against a mocked chat provider

use async_trait::async_trait;
use hivemind_capability::{ActionSpec, CapabilityDescriptor, ParamSpec};
use hivemind_config::Config;
use hivemind_engine::{LlmPlanner, PlanOutcome, PlanRequest, Planner, PlannerError};
use hivemind_provider::{ChatParams, ChatResponse, Provider, ProviderError};
use mockall::mock;

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

fn request() -> PlanRequest {
    PlanRequest::new(
        "summarize notes.md",
        vec![CapabilityDescriptor {
            name: "file_system".to_string(),
            description: "Workspace files".to_string(),
            actions: vec![
                ActionSpec::new("read", "Read a file").param(ParamSpec::required("path", "Path"))
            ],
        }],
    )
}

#[tokio::test]
async fn test_fenced_answer_becomes_steps() {
    let mut provider = MockProvider::new();
    provider.expect_chat().times(1).returning(|_| {
        Ok(ChatResponse::text(
            "Sure.\n```json\n{\"steps\": [{\"provider\": \"file_system\", \"action\": \"read\", \"params\": {\"path\": \"notes.md\"}, \"rationale\": \"need the text\"}]}\n```",
        ))
    });

    let planner = LlmPlanner::new(provider, "test-model");
    match planner.plan(request()).await.unwrap() {
        PlanOutcome::Steps(steps) => {
            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].provider, "file_system");
            assert_eq!(steps[0].params["path"], "notes.md");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_prompt_carries_goal_and_model() {
    let mut provider = MockProvider::new();
    provider
        .expect_chat()
        .times(1)
        .withf(|params| {
            params.model == "test-model"
                && params.max_tokens == 512
                && params.messages.len() == 2
                && params.messages[0].role == "system"
                && params.messages[1].content.contains("summarize notes.md")
                && params.messages[1].content.contains("\"file_system\"")
        })
        .returning(|_| Ok(ChatResponse::text("[]")));

    let planner = LlmPlanner::new(provider, "test-model").with_limits(512, 0.0);
    assert_eq!(
        planner.plan(request()).await.unwrap(),
        PlanOutcome::Steps(vec![])
    );
}

#[tokio::test]
async fn test_cannot_plan_answer() {
    let mut provider = MockProvider::new();
    provider
        .expect_chat()
        .returning(|_| Ok(ChatResponse::text("{\"cannot_plan\": \"no such file tool\"}")));

    let planner = LlmPlanner::new(provider, "m");
    assert_eq!(
        planner.plan(request()).await.unwrap(),
        PlanOutcome::CannotPlan("no such file tool".to_string())
    );
}

#[tokio::test]
async fn test_prose_answer_is_malformed() {
    let mut provider = MockProvider::new();
    provider
        .expect_chat()
        .returning(|_| Ok(ChatResponse::text("First I would open the file.")));

    let planner = LlmPlanner::new(provider, "m");
    assert!(matches!(
        planner.plan(request()).await,
        Err(PlannerError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_provider_error_surfaces() {
    let mut provider = MockProvider::new();
    provider
        .expect_chat()
        .returning(|_| Err(ProviderError::Api("bad key".to_string())));

    let planner = LlmPlanner::new(provider, "m");
    assert!(matches!(
        planner.plan(request()).await,
        Err(PlannerError::Provider(ProviderError::Api(_)))
    ));
}

#[test]
fn test_from_config_uses_planner_settings() {
    let mut config = Config::default();
    config.planner.model = "custom/model".to_string();

    let planner = LlmPlanner::from_config(MockProvider::new(), &config);
    assert_eq!(planner.model(), "custom/model");
}
