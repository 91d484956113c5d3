//! What to do after a step fails

use hivemind_config::EngineConfig;
use hivemind_mission::{Mission, MissionStep};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reflection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Retry,
    Replan,
    Escalate,
    Abort,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Retry => "retry",
            Self::Replan => "replan",
            Self::Escalate => "escalate",
            Self::Abort => "abort",
        };
        f.write_str(label)
    }
}

/// Facts about one failure
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionInput {
    /// Index of the failed step
    pub step: usize,
    /// Consecutive failures of the same signature before this one
    pub prior_failures: u32,
    /// Replans already charged to the step's anchor
    pub replans_at_anchor: u32,
    pub retryable: bool,
    pub escalation_budget: u32,
}

impl ReflectionInput {
    /// Read the counters off a mission whose `step` has just failed and been
    /// counted in `failure_counts`.
    pub fn for_step(mission: &Mission, step: &MissionStep) -> Self {
        let recorded = mission.failures_for(&step.signature());
        Self {
            step: step.index,
            prior_failures: recorded.saturating_sub(1),
            replans_at_anchor: mission.replans_at(step.anchor()),
            retryable: step.retryable,
            escalation_budget: mission.escalation_budget,
        }
    }
}

/// Thresholds for the retry → replan → escalate → abort ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectionPolicy {
    pub retry_limit: u32,
    pub replan_limit: u32,
    /// Escalations granted to each new mission
    pub escalation_budget: u32,
}

impl Default for ReflectionPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            replan_limit: 1,
            escalation_budget: 3,
        }
    }
}

impl ReflectionPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            retry_limit: config.retry_limit,
            replan_limit: config.replan_limit,
            escalation_budget: config.escalation_budget,
        }
    }

    /// Checks run in order; the first that holds wins. Replanning and
    /// escalation both need budget left, so a mission with none aborts
    /// once retries are spent.
    pub fn decide(&self, input: &ReflectionInput) -> Verdict {
        if input.retryable && input.prior_failures < self.retry_limit {
            return Verdict::Retry;
        }
        if input.escalation_budget > 0 && input.replans_at_anchor < self.replan_limit {
            return Verdict::Replan;
        }
        if input.escalation_budget > 0 {
            return Verdict::Escalate;
        }
        Verdict::Abort
    }
}
