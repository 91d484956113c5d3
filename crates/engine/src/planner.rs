//! Planner contract and the adapter that validates what comes back

use async_trait::async_trait;
use hivemind_capability::CapabilityDescriptor;
use hivemind_mission::{Mission, MissionStep, MissionSummary, Params, StepStatus, StepTemplate};
use hivemind_provider::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Planner failures
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("◆ PLANNER ENDPOINT: {0}")]
    Provider(#[from] ProviderError),

    #[error("◆ UNREADABLE PLAN: {0}")]
    Malformed(String),
}

/// Adapter failures
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("◆ INVALID PLAN: {0}")]
    InvalidPlan(String),

    #[error("◆ CANNOT PLAN: {0}")]
    CannotPlan(String),

    #[error(transparent)]
    Planner(#[from] PlannerError),
}

pub type Result<T> = std::result::Result<T, PlanError>;

/// Why the planner is being asked again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub step: usize,
    pub provider: String,
    pub action: String,
    pub params: Params,
    pub observation: Option<String>,
    pub details: Option<String>,
    pub attempts: u32,
    /// `#index provider.action: observation` for each succeeded step
    pub completed: Vec<String>,
    /// Pending steps a replan will replace
    pub remaining: Vec<String>,
}

impl FailureContext {
    pub fn from_mission(mission: &Mission, failed: &MissionStep) -> Self {
        let line = |s: &MissionStep| {
            format!(
                "#{} {}: {}",
                s.index,
                s.label(),
                s.observation.as_deref().unwrap_or("-")
            )
        };
        Self {
            step: failed.index,
            provider: failed.provider.clone(),
            action: failed.action.clone(),
            params: failed.params.clone(),
            observation: failed.observation.clone(),
            details: failed.details.clone(),
            attempts: failed.attempts,
            completed: mission
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Succeeded)
                .map(line)
                .collect(),
            remaining: mission
                .steps
                .iter()
                .filter(|s| s.index > failed.index && s.status == StepStatus::Pending)
                .map(|s| format!("#{} {}", s.index, s.label()))
                .collect(),
        }
    }
}

/// Everything a planner sees
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub goal: String,
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Recent missions, newest first
    pub history: Vec<MissionSummary>,
    /// Present when replanning
    pub failure: Option<FailureContext>,
    pub guidance: Vec<String>,
    /// Why the previous answer was refused
    pub rejection: Option<String>,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>, capabilities: Vec<CapabilityDescriptor>) -> Self {
        Self {
            goal: goal.into(),
            capabilities,
            history: Vec::new(),
            failure: None,
            guidance: Vec::new(),
            rejection: None,
        }
    }

    pub fn is_replan(&self) -> bool {
        self.failure.is_some()
    }
}

/// What a planner answered
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Steps(Vec<StepTemplate>),
    CannotPlan(String),
}

/// A natural-language planner
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: PlanRequest) -> std::result::Result<PlanOutcome, PlannerError>;
}

/// Wraps a [`Planner`] with history windowing and structural validation
pub struct PlannerAdapter<P: Planner> {
    planner: P,
    history_window: usize,
}

impl<P: Planner> PlannerAdapter<P> {
    pub fn new(planner: P, history_window: usize) -> Self {
        Self {
            planner,
            history_window,
        }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn into_planner(self) -> P {
        self.planner
    }

    /// Initial plan for `goal`. An empty plan is refused.
    pub async fn propose_plan(
        &self,
        goal: &str,
        capabilities: &[CapabilityDescriptor],
        history: Vec<MissionSummary>,
    ) -> Result<Vec<StepTemplate>> {
        let mut request = PlanRequest::new(goal, capabilities.to_vec());
        request.history = history;
        self.request(request, false).await
    }

    /// Replacement tail after a failure. An empty tail means nothing is
    /// left to do.
    pub async fn propose_replan(
        &self,
        goal: &str,
        capabilities: &[CapabilityDescriptor],
        history: Vec<MissionSummary>,
        failure: FailureContext,
        guidance: &[String],
    ) -> Result<Vec<StepTemplate>> {
        let mut request = PlanRequest::new(goal, capabilities.to_vec());
        request.history = history;
        request.failure = Some(failure);
        request.guidance = guidance.to_vec();
        self.request(request, true).await
    }

    async fn request(&self, mut request: PlanRequest, allow_empty: bool) -> Result<Vec<StepTemplate>> {
        request.history.truncate(self.history_window);

        let mut reprompted = false;
        loop {
            debug!(
                "◆ REQUESTING {} FOR: {}",
                if request.is_replan() { "REPLAN" } else { "PLAN" },
                request.goal
            );
            let steps = match self.planner.plan(request.clone()).await? {
                PlanOutcome::Steps(steps) => steps,
                PlanOutcome::CannotPlan(reason) => return Err(PlanError::CannotPlan(reason)),
            };

            match validate_plan(&steps, &request.capabilities, allow_empty) {
                Ok(()) => return Ok(steps),
                Err(reason) if !reprompted => {
                    warn!("◆ PLAN REFUSED, RE-PROMPTING: {}", reason);
                    request.rejection = Some(reason);
                    reprompted = true;
                }
                Err(reason) => return Err(PlanError::InvalidPlan(reason)),
            }
        }
    }
}

/// Every step must name a known provider/action pair and carry that
/// action's required parameters.
pub fn validate_plan(
    steps: &[StepTemplate],
    capabilities: &[CapabilityDescriptor],
    allow_empty: bool,
) -> std::result::Result<(), String> {
    if steps.is_empty() && !allow_empty {
        return Err("plan has no steps".to_string());
    }

    for (position, step) in steps.iter().enumerate() {
        let provider = capabilities
            .iter()
            .find(|c| c.name == step.provider)
            .ok_or_else(|| format!("step {}: unknown provider '{}'", position, step.provider))?;

        let action = provider
            .actions
            .iter()
            .find(|a| a.name == step.action)
            .ok_or_else(|| {
                format!(
                    "step {}: provider '{}' has no action '{}'",
                    position, step.provider, step.action
                )
            })?;

        if let Some(missing) = action
            .params
            .iter()
            .find(|p| p.required && !step.params.contains_key(&p.name))
        {
            return Err(format!(
                "step {}: {}.{} is missing required parameter '{}'",
                position, step.provider, step.action, missing.name
            ));
        }
    }
    Ok(())
}
