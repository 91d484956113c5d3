//! Mission steps and their lifecycle

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{MissionError, Result};

/// Action parameters: a string-keyed JSON object
pub type Params = serde_json::Map<String, Value>;

/// Per-step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Succeeded,
    Failed,
    /// Superseded by a replan before it ever ran
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Legal moves: pending → executing → succeeded | failed,
    /// failed → pending (retry), pending → skipped (superseded).
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Executing)
                | (Self::Pending, Self::Skipped)
                | (Self::Executing, Self::Succeeded)
                | (Self::Executing, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step as proposed by a planner, before it gets an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Capability provider name
    #[serde(alias = "capability")]
    pub provider: String,
    /// Action on that provider
    pub action: String,
    #[serde(default, alias = "parameters")]
    pub params: Params,
    #[serde(default)]
    pub rationale: String,
}

impl StepTemplate {
    pub fn new(provider: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            action: action.into(),
            params: Params::new(),
            rationale: String::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// Identity of an invocation: provider, action and parameters.
///
/// `Params` keeps its keys sorted, so equal parameter sets always render the
/// same string.
pub fn signature(provider: &str, action: &str, params: &Params) -> String {
    let params = serde_json::to_string(params).unwrap_or_default();
    format!("{provider}.{action}:{params}")
}

/// One step of a mission plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionStep {
    /// Position in the mission, assigned once and never reused
    pub index: usize,
    pub provider: String,
    pub action: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub rationale: String,
    pub status: StepStatus,
    /// What happened on the last attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    /// Provider payload, only after success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Provider failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Whether the last failure may be retried as-is
    #[serde(default)]
    pub retryable: bool,
    /// Times the step entered `executing`
    #[serde(default)]
    pub attempts: u32,
    /// Failed step whose replan produced this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replan_of: Option<usize>,
    pub updated_at: DateTime<Local>,
}

impl MissionStep {
    pub fn from_template(index: usize, template: StepTemplate, replan_of: Option<usize>) -> Self {
        Self {
            index,
            provider: template.provider,
            action: template.action,
            params: template.params,
            rationale: template.rationale,
            status: StepStatus::Pending,
            observation: None,
            result: None,
            details: None,
            retryable: false,
            attempts: 0,
            replan_of,
            updated_at: Local::now(),
        }
    }

    pub fn signature(&self) -> String {
        signature(&self.provider, &self.action, &self.params)
    }

    /// Index that replan accounting is charged to
    pub fn anchor(&self) -> usize {
        self.replan_of.unwrap_or(self.index)
    }

    /// `provider.action` label for logs and prompts
    pub fn label(&self) -> String {
        format!("{}.{}", self.provider, self.action)
    }

    fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MissionError::InvalidStepTransition {
                index: self.index,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Local::now();
        Ok(())
    }

    /// Enter `executing`
    pub fn begin(&mut self) -> Result<()> {
        self.transition(StepStatus::Executing)?;
        self.attempts += 1;
        Ok(())
    }

    pub fn succeed(&mut self, observation: impl Into<String>, data: Value) -> Result<()> {
        self.transition(StepStatus::Succeeded)?;
        self.observation = Some(observation.into());
        self.result = Some(data);
        self.details = None;
        self.retryable = false;
        Ok(())
    }

    pub fn fail(
        &mut self,
        observation: impl Into<String>,
        details: Option<String>,
        retryable: bool,
    ) -> Result<()> {
        self.transition(StepStatus::Failed)?;
        self.observation = Some(observation.into());
        self.result = None;
        self.details = details;
        self.retryable = retryable;
        Ok(())
    }

    /// Put a failed step back in the queue. The last observation is kept.
    pub fn reset(&mut self) -> Result<()> {
        self.transition(StepStatus::Pending)
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(StepStatus::Skipped)?;
        self.observation = Some(reason.into());
        Ok(())
    }
}
