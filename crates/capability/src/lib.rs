//! Capability providers and the registry that dispatches to them
//!
//! A provider exposes named actions. The engine only ever sees the
//! [`Capability`] trait and the [`CapabilityRegistry`]; the built-in
//! providers under [`providers`] are ordinary implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod providers;
pub mod registry;

pub use hivemind_mission::Params;
pub use providers::{register_builtin, FileSystemProvider, ShellProvider, WebProvider};
pub use registry::CapabilityRegistry;

/// Error a provider raises when it cannot produce an outcome at all
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Registry errors
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("◆ PROVIDER '{0}' ALREADY REGISTERED")]
    DuplicateProvider(String),

    #[error("◆ UNKNOWN PROVIDER '{0}'")]
    UnknownProvider(String),

    #[error("◆ PROVIDER '{provider}' HAS NO ACTION '{action}'")]
    UnknownAction { provider: String, action: String },

    #[error("◆ {provider}.{action} BROKE: {detail}")]
    ProviderExecution {
        provider: String,
        action: String,
        detail: String,
    },

    #[error("◆ {provider}.{action} TIMED OUT AFTER {secs}s")]
    Timeout {
        provider: String,
        action: String,
        secs: u64,
    },
}

impl CapabilityError {
    /// Whether repeating the same invocation could plausibly succeed.
    /// Dispatch errors never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderExecution { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;

/// What an action produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Success {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ActionOutcome {
    pub fn success(data: Value) -> Self {
        Self::Success {
            data,
            message: None,
        }
    }

    pub fn success_with_message(data: Value, message: impl Into<String>) -> Self {
        Self::Success {
            data,
            message: Some(message.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            details: None,
        }
    }

    pub fn failure_with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            details: Some(details.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// One-line description for a step's observation
    pub fn summary(&self) -> String {
        match self {
            Self::Success {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Success { data, .. } => match data {
                Value::String(s) => preview(s, 200),
                other => preview(&other.to_string(), 200),
            },
            Self::Failure { error, .. } => error.clone(),
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// One parameter of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// One action a provider exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }
}

/// Snapshot of a provider's action surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub actions: Vec<ActionSpec>,
}

impl CapabilityDescriptor {
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.name == action)
    }
}

/// A capability provider
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn actions(&self) -> Vec<ActionSpec>;

    /// Run `action`. Business failures are `Ok(ActionOutcome::Failure)`;
    /// `Err` is for invocations that could not produce an outcome.
    async fn execute(
        &self,
        action: &str,
        params: &Params,
    ) -> std::result::Result<ActionOutcome, BoxError>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            actions: self.actions(),
        }
    }
}

/// Decode params into a typed argument struct
pub fn parse_args<T: serde::de::DeserializeOwned>(
    params: &Params,
) -> std::result::Result<T, BoxError> {
    Ok(serde_json::from_value(Value::Object(params.clone()))?)
}
