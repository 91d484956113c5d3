//! Planner backed by a chat-completions endpoint

use async_trait::async_trait;
use hivemind_config::Config;
use hivemind_mission::StepTemplate;
use hivemind_provider::{ChatParams, Provider};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::context::PromptBuilder;
use crate::planner::{PlanOutcome, PlanRequest, Planner, PlannerError};

/// [`Planner`] that asks a language model
pub struct LlmPlanner<P: Provider> {
    provider: Arc<P>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl<P: Provider> LlmPlanner<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider: Arc::new(provider),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }

    pub fn from_config(provider: P, config: &Config) -> Self {
        Self::new(provider, config.model()).with_limits(
            config.planner.max_tokens,
            config.planner.temperature,
        )
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl<P: Provider> Planner for LlmPlanner<P> {
    async fn plan(&self, request: PlanRequest) -> Result<PlanOutcome, PlannerError> {
        let params = ChatParams {
            model: self.model.clone(),
            messages: PromptBuilder::build_messages(&request),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.provider.chat(params).await?;
        let content = response.content_or_empty();
        trace!("◆ PLANNER SAID: {}", content);

        let outcome = parse_plan(content)?;
        if let PlanOutcome::Steps(steps) = &outcome {
            debug!("◆ PLANNER PROPOSED {} STEPS", steps.len());
        }
        Ok(outcome)
    }
}

/// Read a plan out of model output.
///
/// Accepts a bare step array, `{"steps": [...]}` or
/// `{"cannot_plan": "reason"}`, optionally inside a fenced code block or
/// surrounded by prose.
pub fn parse_plan(text: &str) -> Result<PlanOutcome, PlannerError> {
    let body = extract_json(text)?;
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| PlannerError::Malformed(format!("{e}: {}", preview(&body))))?;

    let steps = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(reason) = map.remove("cannot_plan") {
                let reason = match reason {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                return Ok(PlanOutcome::CannotPlan(reason));
            }
            match map.remove("steps") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(PlannerError::Malformed(
                        "expected a \"steps\" array".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(PlannerError::Malformed(
                "expected a JSON array or object".to_string(),
            ))
        }
    };

    let templates = steps
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<StepTemplate>(item)
                .map_err(|e| PlannerError::Malformed(format!("step {i}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PlanOutcome::Steps(templates))
}

fn extract_json(text: &str) -> Result<String, PlannerError> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)```")
        .map_err(|e| PlannerError::Malformed(e.to_string()))?;
    if let Some(captures) = fence.captures(text) {
        if let Some(inner) = captures.get(1) {
            return Ok(inner.as_str().trim().to_string());
        }
    }

    let start = text.find(['[', '{']);
    let end = text.rfind([']', '}']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(text[start..=end].to_string()),
        _ => Err(PlannerError::Malformed(format!(
            "no JSON in answer: {}",
            preview(text)
        ))),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let outcome = parse_plan(
            r#"[{"provider": "shell", "action": "execute_command", "params": {"command": "ls"}}]"#,
        )
        .unwrap();
        match outcome {
            PlanOutcome::Steps(steps) => {
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].params["command"], "ls");
                assert!(steps[0].rationale.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_fenced_steps_object() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"provider\": \"web\", \"action\": \"search\", \"params\": {\"query\": \"q\"}, \"rationale\": \"look\"}]}\n```\nDone.";
        match parse_plan(text).unwrap() {
            PlanOutcome::Steps(steps) => assert_eq!(steps[0].rationale, "look"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_capability_alias() {
        let text = r#"{"steps": [{"capability": "web", "action": "fetch", "parameters": {"url": "u"}}]}"#;
        match parse_plan(text).unwrap() {
            PlanOutcome::Steps(steps) => {
                assert_eq!(steps[0].provider, "web");
                assert_eq!(steps[0].params["url"], "u");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_cannot_plan() {
        let outcome = parse_plan(r#"{"cannot_plan": "no network access"}"#).unwrap();
        assert_eq!(
            outcome,
            PlanOutcome::CannotPlan("no network access".to_string())
        );
    }

    #[test]
    fn test_parse_empty_steps() {
        assert_eq!(
            parse_plan(r#"{"steps": []}"#).unwrap(),
            PlanOutcome::Steps(vec![])
        );
    }

    #[test]
    fn test_parse_prose_only_fails() {
        assert!(matches!(
            parse_plan("I would start by reading the file."),
            Err(PlannerError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_step_without_action_fails() {
        let result = parse_plan(r#"[{"provider": "shell"}]"#);
        match result {
            Err(PlannerError::Malformed(msg)) => assert!(msg.starts_with("step 0")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
