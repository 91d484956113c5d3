//! OpenRouter / OpenAI-compatible chat-completions client

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenRouter and compatible endpoints
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
}

impl OpenRouterProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let is_openrouter = api_key.starts_with("sk-or-")
            || api_base
                .as_ref()
                .map(|b| b.contains("openrouter"))
                .unwrap_or(false);

        let api_base = api_base.unwrap_or_else(|| {
            if is_openrouter {
                OPENROUTER_BASE.to_string()
            } else {
                OPENAI_BASE.to_string()
            }
        });

        let default_model = default_model.unwrap_or_else(|| {
            if is_openrouter {
                "anthropic/claude-sonnet-4".to_string()
            } else {
                "gpt-4o".to_string()
            }
        });

        Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        json!({
            "model": model,
            "messages": params.messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let content = choice["message"]["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let usage = match json.get("usage") {
            Some(usage) if usage.is_object() => serde_json::from_value(usage.clone())
                .unwrap_or_default(),
            _ => Usage::default(),
        };

        Ok(ChatResponse {
            content,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenRouterProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }
        trace!("◆ POSTING COMPLETION TO {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ProviderError::Api(error));
        }

        let parsed = self.parse_response(json)?;
        debug!(
            "◆ COMPLETION RECEIVED: {} CHARS, {} TOKENS",
            parsed.content_or_empty().len(),
            parsed.usage.total_tokens
        );
        Ok(parsed)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_key_selects_openrouter_base() {
        let provider = OpenRouterProvider::new("sk-or-test123", None, None);
        assert_eq!(provider.api_base, OPENROUTER_BASE);
        assert_eq!(provider.default_model, "anthropic/claude-sonnet-4");
    }

    #[test]
    fn test_other_key_selects_openai_base() {
        let provider = OpenRouterProvider::new("sk-openai123", None, None);
        assert_eq!(provider.api_base, OPENAI_BASE);
        assert_eq!(provider.default_model, "gpt-4o");
    }

    #[test]
    fn test_custom_base_trailing_slash_trimmed() {
        let provider =
            OpenRouterProvider::new("k", Some("http://localhost:8000/v1/".to_string()), None);
        assert_eq!(provider.api_base(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_is_configured() {
        assert!(OpenRouterProvider::new("key", None, None).is_configured());
        assert!(!OpenRouterProvider::new("", None, None).is_configured());
    }

    #[test]
    fn test_build_request_uses_default_model_when_empty() {
        let provider = OpenRouterProvider::new("sk-or-x", None, Some("m/default".to_string()));
        let params = ChatParams {
            messages: vec![Message::system("sys"), Message::user("hi")],
            max_tokens: 512,
            ..Default::default()
        };

        let request = provider.build_request(&params);

        assert_eq!(request["model"], "m/default");
        assert_eq!(request["max_tokens"], 512);
        let messages = request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
    }

    #[test]
    fn test_parse_response_with_usage() {
        let provider = OpenRouterProvider::new("k", None, None);
        let json = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "[]" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4 }
        });

        let response = provider.parse_response(json).unwrap();
        assert_eq!(response.content.as_deref(), Some("[]"));
        assert_eq!(response.usage.total_tokens, 4);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let provider = OpenRouterProvider::new("k", None, None);
        let result = provider.parse_response(json!({ "choices": [] }));
        assert!(matches!(result, Err(ProviderError::InvalidResponse)));
    }

    #[tokio::test]
    async fn test_chat_without_key_fails_fast() {
        let provider = OpenRouterProvider::new("", None, None);
        let result = provider.chat(ChatParams::default()).await;
        assert!(matches!(result, Err(ProviderError::NoApiKey)));
    }
}
