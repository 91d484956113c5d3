//! Mission engine
//!
//! Plans a goal into steps, runs them against the capability registry, and
//! reflects on failures: retry, replan, ask a human, or give up.

use hivemind_mission::{MissionError, MissionStatus};
use hivemind_store::StoreError;
use thiserror::Error;

pub mod context;
pub mod engine;
pub mod llm;
pub mod planner;
pub mod reflection;

pub use context::PromptBuilder;
pub use engine::MissionEngine;
pub use llm::{parse_plan, LlmPlanner};
pub use planner::{
    validate_plan, FailureContext, PlanError, PlanOutcome, PlanRequest, Planner, PlannerAdapter,
    PlannerError,
};
pub use reflection::{ReflectionInput, ReflectionPolicy, Verdict};

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("◆ MISSION {0} NOT FOUND")]
    NotFound(String),

    #[error("◆ MISSION {id} IS {status}")]
    InvalidState { id: String, status: MissionStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mission(#[from] MissionError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
