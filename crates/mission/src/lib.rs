//! Mission records
//!
//! A [`Mission`] is a goal plus the ordered steps planned for it. Status
//! changes go through methods here so the state machine holds no matter who
//! drives it; the engine decides *when* to move, this crate decides *whether*
//! a move is legal.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use tracing::trace;

pub mod step;

pub use step::{signature, MissionStep, Params, StepStatus, StepTemplate};

/// Mission model errors
#[derive(Error, Debug, PartialEq)]
pub enum MissionError {
    #[error("◆ STEP {index}: ILLEGAL TRANSITION {from} -> {to}")]
    InvalidStepTransition {
        index: usize,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("◆ ILLEGAL MISSION TRANSITION {from} -> {to}")]
    InvalidTransition {
        from: MissionStatus,
        to: MissionStatus,
    },

    #[error("◆ NO STEP AT INDEX {0}")]
    StepNotFound(usize),
}

pub type Result<T> = std::result::Result<T, MissionError>;

/// Mission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Planning,
    Executing,
    AwaitingHuman,
    Reflecting,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: MissionStatus) -> bool {
        use MissionStatus::*;
        matches!(
            (self, next),
            (Planning, Executing)
                | (Planning, Failed)
                | (Executing, Reflecting)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Reflecting, Executing)
                | (Reflecting, AwaitingHuman)
                | (Reflecting, Failed)
                | (AwaitingHuman, Executing)
                | (AwaitingHuman, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::AwaitingHuman => "awaiting_human",
            Self::Reflecting => "reflecting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mission and everything that happened to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// UUID v4
    pub id: String,
    pub goal: String,
    pub status: MissionStatus,
    #[serde(default)]
    pub steps: Vec<MissionStep>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
    /// Final payload, only once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Why the mission failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operator guidance, oldest first
    #[serde(default)]
    pub guidance: Vec<String>,
    /// Question put to the operator while awaiting a human
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Escalations left
    #[serde(default)]
    pub escalation_budget: u32,
    /// Consecutive failures per invocation signature
    #[serde(default)]
    pub failure_counts: BTreeMap<String, u32>,
    /// Replans requested per anchor step
    #[serde(default)]
    pub replan_counts: BTreeMap<usize, u32>,
}

impl Mission {
    pub fn new(goal: impl Into<String>, escalation_budget: u32) -> Self {
        let now = Local::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            status: MissionStatus::Planning,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
            guidance: Vec::new(),
            question: None,
            escalation_budget,
            failure_counts: BTreeMap::new(),
            replan_counts: BTreeMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Local::now();
    }

    /// Move to `next`, refusing illegal edges. Terminal states have none.
    pub fn transition(&mut self, next: MissionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MissionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        trace!("◆ MISSION {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        if next != MissionStatus::AwaitingHuman {
            self.question = None;
        }
        self.touch();
        Ok(())
    }

    /// Append planned steps. Indices continue after the current last step.
    pub fn append_plan(
        &mut self,
        templates: Vec<StepTemplate>,
        replan_of: Option<usize>,
    ) -> Range<usize> {
        let start = self.steps.len();
        for (offset, template) in templates.into_iter().enumerate() {
            self.steps
                .push(MissionStep::from_template(start + offset, template, replan_of));
        }
        self.touch();
        start..self.steps.len()
    }

    pub fn step(&self, index: usize) -> Result<&MissionStep> {
        self.steps.get(index).ok_or(MissionError::StepNotFound(index))
    }

    pub fn step_mut(&mut self, index: usize) -> Result<&mut MissionStep> {
        self.steps
            .get_mut(index)
            .ok_or(MissionError::StepNotFound(index))
    }

    /// Lowest-index step still waiting to run
    pub fn next_pending(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Pending)
            .map(|s| s.index)
    }

    /// Step left `executing` by an interrupted run
    pub fn interrupted_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Executing)
            .map(|s| s.index)
    }

    /// Most recent failed step, the one a reflection is about
    pub fn last_failed(&self) -> Option<usize> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| s.index)
    }

    /// Mark every pending step after `index` as superseded
    pub fn skip_pending_after(&mut self, index: usize, reason: &str) -> Result<usize> {
        let mut skipped = 0;
        for step in self.steps.iter_mut().skip(index + 1) {
            if step.status == StepStatus::Pending {
                step.skip(reason)?;
                skipped += 1;
            }
        }
        if skipped > 0 {
            self.touch();
        }
        Ok(skipped)
    }

    /// Result of the last succeeded step
    pub fn last_result(&self) -> Option<&Value> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.status == StepStatus::Succeeded)
            .and_then(|s| s.result.as_ref())
    }

    /// Count a failure for `signature`; returns the new consecutive total
    pub fn record_failure(&mut self, signature: &str) -> u32 {
        let count = self.failure_counts.entry(signature.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn clear_failures(&mut self, signature: &str) {
        self.failure_counts.remove(signature);
    }

    pub fn failures_for(&self, signature: &str) -> u32 {
        self.failure_counts.get(signature).copied().unwrap_or(0)
    }

    pub fn record_replan(&mut self, anchor: usize) -> u32 {
        let count = self.replan_counts.entry(anchor).or_insert(0);
        *count += 1;
        *count
    }

    pub fn replans_at(&self, anchor: usize) -> u32 {
        self.replan_counts.get(&anchor).copied().unwrap_or(0)
    }

    /// Spend one escalation; false when none are left
    pub fn consume_escalation(&mut self) -> bool {
        if self.escalation_budget == 0 {
            return false;
        }
        self.escalation_budget -= 1;
        true
    }

    /// Suspend on the operator with `question`
    pub fn await_human(&mut self, question: impl Into<String>) -> Result<()> {
        self.transition(MissionStatus::AwaitingHuman)?;
        self.question = Some(question.into());
        Ok(())
    }

    /// Finish successfully with the last succeeded step's result
    pub fn complete(&mut self) -> Result<()> {
        self.transition(MissionStatus::Completed)?;
        self.result = Some(self.last_result().cloned().unwrap_or(Value::Null));
        self.error = None;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(MissionStatus::Failed)?;
        self.result = None;
        self.error = Some(reason.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn add_guidance(&mut self, text: impl Into<String>) {
        self.guidance.push(text.into());
        self.touch();
    }

    pub fn count_steps(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn summary(&self) -> MissionSummary {
        MissionSummary {
            id: self.id.clone(),
            goal: self.goal.clone(),
            status: self.status,
            steps_total: self.steps.len(),
            steps_succeeded: self.count_steps(StepStatus::Succeeded),
            steps_failed: self.count_steps(StepStatus::Failed),
            created_at: self.created_at,
            completed_at: self.completed_at,
            outcome: self.outcome(),
        }
    }

    fn outcome(&self) -> Option<String> {
        match self.status {
            MissionStatus::Completed => self.result.as_ref().map(|r| match r {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            MissionStatus::Failed => self.error.clone(),
            MissionStatus::AwaitingHuman => self.question.clone(),
            _ => None,
        }
    }
}

/// Condensed mission record for planner history and listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub id: String,
    pub goal: String,
    pub status: MissionStatus,
    pub steps_total: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub created_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
    /// Result, failure reason or open question, shortened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl MissionSummary {
    /// Outcome cut to at most `max` characters
    pub fn outcome_preview(&self, max: usize) -> Option<String> {
        self.outcome.as_ref().map(|o| {
            if o.chars().count() <= max {
                o.clone()
            } else {
                let cut: String = o.chars().take(max).collect();
                format!("{cut}...")
            }
        })
    }
}
