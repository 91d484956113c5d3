//! The plan → execute → observe → reflect loop

use hivemind_capability::{ActionOutcome, CapabilityRegistry};
use hivemind_config::{Config, EngineConfig};
use hivemind_mission::{
    Mission, MissionStatus, MissionStep, MissionSummary, Result as MissionResult, StepTemplate,
};
use hivemind_store::{StateStore, StoreError};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::planner::{FailureContext, PlanError, Planner, PlannerAdapter};
use crate::reflection::{ReflectionInput, ReflectionPolicy, Verdict};
use crate::{EngineError, Result};

const SUPERSEDED: &str = "superseded by replan";

/// Drives missions to completion, one step at a time
pub struct MissionEngine<P: Planner> {
    registry: Arc<CapabilityRegistry>,
    planner: PlannerAdapter<P>,
    store: Arc<dyn StateStore>,
    policy: ReflectionPolicy,
    cancel: Mutex<CancellationToken>,
}

impl<P: Planner> MissionEngine<P> {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        planner: P,
        store: Arc<dyn StateStore>,
        policy: ReflectionPolicy,
    ) -> Self {
        Self {
            registry,
            planner: PlannerAdapter::new(planner, EngineConfig::default().history_window),
            store,
            policy,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Engine with policy and history window taken from `config`
    pub fn from_config(
        registry: Arc<CapabilityRegistry>,
        planner: P,
        store: Arc<dyn StateStore>,
        config: &Config,
    ) -> Self {
        Self::new(
            registry,
            planner,
            store,
            ReflectionPolicy::from_config(&config.engine),
        )
        .with_history_window(config.engine.history_window)
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.planner = PlannerAdapter::new(self.planner.into_planner(), window);
        self
    }

    pub fn policy(&self) -> &ReflectionPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn history_window(&self) -> usize {
        self.planner.history_window()
    }

    /// Token that interrupts the mission this engine is running. It is
    /// checked between steps and raced against every planner and provider
    /// call. Once a token has been cancelled it is replaced, so a
    /// cancellation ends one run and never carries over to the next.
    pub fn cancellation_token(&self) -> CancellationToken {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// Plan and run a new mission. Never fails: whatever happened is in the
    /// returned record.
    pub async fn execute_mission(&self, goal: &str) -> Mission {
        let cancel = self.cancellation_token();
        let mut mission = Mission::new(goal, self.policy.escalation_budget);
        info!("◆ MISSION {} ACCEPTED: {}", mission.id, goal);
        self.persist(&mission).await;

        if self.plan(&mut mission, &cancel).await {
            self.run(&mut mission, &cancel).await;
        }
        mission
    }

    /// Continue a persisted mission from its last recorded state
    pub async fn resume(&self, id: &str) -> Result<Mission> {
        let cancel = self.cancellation_token();
        let mut mission = self.load(id).await?;
        info!("◆ RESUMING MISSION {} ({})", mission.id, mission.status);

        match mission.status {
            MissionStatus::Completed | MissionStatus::Failed => return Ok(mission),
            MissionStatus::AwaitingHuman => {
                info!("◆ MISSION {} IS WAITING FOR AN OPERATOR", mission.id);
                return Ok(mission);
            }
            MissionStatus::Planning => {
                if mission.steps.is_empty() {
                    if !self.plan(&mut mission, &cancel).await {
                        return Ok(mission);
                    }
                } else {
                    mission.transition(MissionStatus::Executing)?;
                    self.persist(&mission).await;
                }
            }
            MissionStatus::Executing => {
                if let Some(index) = mission.interrupted_step() {
                    warn!("◆ STEP {} WAS INTERRUPTED, COUNTING AS FAILURE", index);
                    self.record_failure(
                        &mut mission,
                        index,
                        "interrupted before an outcome was recorded".to_string(),
                        None,
                        true,
                    )
                    .await?;
                }
            }
            MissionStatus::Reflecting => {}
        }

        self.run(&mut mission, &cancel).await;
        Ok(mission)
    }

    /// Record operator guidance for a mission waiting on a human and replan
    /// around the failed step. The mission comes back `executing`; call
    /// [`resume`](Self::resume) to run it. If no replan can be obtained the
    /// mission keeps waiting.
    pub async fn submit_feedback(&self, id: &str, text: &str) -> Result<Mission> {
        let cancel = self.cancellation_token();
        let mut mission = self.load(id).await?;
        if mission.status != MissionStatus::AwaitingHuman {
            return Err(EngineError::InvalidState {
                id: mission.id,
                status: mission.status,
            });
        }

        info!("◆ GUIDANCE FOR {}: {}", mission.id, text);
        mission.add_guidance(text);
        self.persist(&mission).await;

        let Some(index) = mission.last_failed() else {
            mission.transition(MissionStatus::Executing)?;
            self.persist(&mission).await;
            return Ok(mission);
        };
        let failed = mission.step(index)?.clone();

        match self.request_replan(&mission, &failed, &cancel).await {
            None => warn!("◆ REPLAN INTERRUPTED, MISSION {} STILL WAITING", mission.id),
            Some(Ok(templates)) => {
                self.apply_replan(&mut mission, &failed, templates)?;
                mission.transition(MissionStatus::Executing)?;
                self.persist(&mission).await;
            }
            Some(Err(e)) => warn!("◆ NO REPLAN FROM GUIDANCE, STILL WAITING: {}", e),
        }
        Ok(mission)
    }

    /// Fail a mission that has not finished yet
    pub async fn cancel(&self, id: &str, reason: &str) -> Result<Mission> {
        let mut mission = self.load(id).await?;
        if mission.is_terminal() {
            return Err(EngineError::InvalidState {
                id: mission.id,
                status: mission.status,
            });
        }
        self.abandon(&mut mission, reason)?;
        self.store.save(&mission).await?;
        Ok(mission)
    }

    async fn load(&self, id: &str) -> Result<Mission> {
        self.store.load(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Store(other),
        })
    }

    async fn persist(&self, mission: &Mission) {
        if let Err(e) = self.store.save(mission).await {
            warn!("◆ COULD NOT PERSIST MISSION {}: {}", mission.id, e);
        }
    }

    async fn history(&self, exclude: &str) -> Vec<MissionSummary> {
        let window = self.planner.history_window();
        match self.store.history(window + 1).await {
            Ok(history) => history
                .into_iter()
                .filter(|s| s.id != exclude)
                .take(window)
                .collect(),
            Err(e) => {
                warn!("◆ MISSION HISTORY UNAVAILABLE: {}", e);
                Vec::new()
            }
        }
    }

    /// Initial plan. Returns false when the mission failed instead.
    async fn plan(&self, mission: &mut Mission, cancel: &CancellationToken) -> bool {
        let capabilities = self.registry.describe_all();
        let history = self.history(&mission.id).await;

        let proposal = self
            .planner
            .propose_plan(&mission.goal, &capabilities, history);
        let outcome = match until_cancelled(cancel, proposal).await {
            None => self.abandon(mission, "interrupted"),
            Some(Ok(templates)) => {
                let range = mission.append_plan(templates, None);
                info!("◆ MISSION {} PLANNED: {} STEPS", mission.id, range.len());
                mission.transition(MissionStatus::Executing)
            }
            Some(Err(e)) => {
                error!("◆ MISSION {} COULD NOT BE PLANNED: {}", mission.id, e);
                mission.fail(format!("planning failed: {}", plan_reason(&e)))
            }
        };
        if let Err(e) = outcome {
            error!("◆ MISSION {}: {}", mission.id, e);
        }
        self.persist(mission).await;
        mission.status == MissionStatus::Executing
    }

    async fn run(&self, mission: &mut Mission, cancel: &CancellationToken) {
        if let Err(e) = self.drive(mission, cancel).await {
            error!("◆ MISSION {} HALTED: {}", mission.id, e);
            if !mission.is_terminal() && mission.fail(format!("internal error: {e}")).is_ok() {
                self.persist(mission).await;
            }
        }
    }

    async fn drive(&self, mission: &mut Mission, cancel: &CancellationToken) -> MissionResult<()> {
        loop {
            let running = matches!(
                mission.status,
                MissionStatus::Executing | MissionStatus::Reflecting
            );
            if running && cancel.is_cancelled() {
                self.abandon(mission, "interrupted")?;
                self.persist(mission).await;
                return Ok(());
            }

            match mission.status {
                MissionStatus::Executing => match mission.next_pending() {
                    Some(index) => self.execute_step(mission, index, cancel).await?,
                    None => {
                        mission.complete()?;
                        info!(
                            "◆ MISSION {} COMPLETED ({} STEPS)",
                            mission.id,
                            mission.steps.len()
                        );
                        self.persist(mission).await;
                        return Ok(());
                    }
                },
                MissionStatus::Reflecting => self.reflect(mission, cancel).await?,
                MissionStatus::Planning
                | MissionStatus::AwaitingHuman
                | MissionStatus::Completed
                | MissionStatus::Failed => return Ok(()),
            }
        }
    }

    async fn execute_step(
        &self,
        mission: &mut Mission,
        index: usize,
        cancel: &CancellationToken,
    ) -> MissionResult<()> {
        let step = mission.step_mut(index)?;
        step.begin()?;
        let (provider, action, params) =
            (step.provider.clone(), step.action.clone(), step.params.clone());
        let attempt = step.attempts;
        mission.touch();
        self.persist(mission).await;

        debug!(
            "◆ STEP {} -> {}.{} (ATTEMPT {})",
            index, provider, action, attempt
        );
        let invocation = self.registry.invoke(&provider, &action, &params);
        let result = until_cancelled(cancel, invocation).await;

        match result {
            None => {
                self.abandon(mission, "interrupted")?;
                self.persist(mission).await;
                Ok(())
            }
            Some(Ok(outcome)) => {
                let observation = outcome.summary();
                match outcome {
                    ActionOutcome::Success { data, .. } => {
                        let step = mission.step_mut(index)?;
                        step.succeed(observation, data)?;
                        let signature = step.signature();
                        mission.clear_failures(&signature);
                        mission.touch();
                        info!("◆ STEP {} SUCCEEDED: {}", index, mission.step(index)?.label());
                        self.persist(mission).await;
                        Ok(())
                    }
                    ActionOutcome::Failure { error, details } => {
                        self.record_failure(mission, index, error, details, true)
                            .await
                    }
                }
            }
            Some(Err(e)) => {
                let retryable = e.is_retryable();
                self.record_failure(mission, index, e.to_string(), None, retryable)
                    .await
            }
        }
    }

    async fn record_failure(
        &self,
        mission: &mut Mission,
        index: usize,
        observation: String,
        details: Option<String>,
        retryable: bool,
    ) -> MissionResult<()> {
        warn!("◆ STEP {} FAILED: {}", index, observation);
        let step = mission.step_mut(index)?;
        step.fail(observation, details, retryable)?;
        let signature = step.signature();
        mission.record_failure(&signature);
        mission.transition(MissionStatus::Reflecting)?;
        self.persist(mission).await;
        Ok(())
    }

    async fn reflect(&self, mission: &mut Mission, cancel: &CancellationToken) -> MissionResult<()> {
        let Some(index) = mission.last_failed() else {
            mission.transition(MissionStatus::Executing)?;
            self.persist(mission).await;
            return Ok(());
        };
        let failed = mission.step(index)?.clone();
        let input = ReflectionInput::for_step(mission, &failed);
        let verdict = self.policy.decide(&input);
        info!(
            "◆ REFLECTING ON STEP {} ({}): {}",
            index,
            failed.label(),
            verdict
        );

        match verdict {
            Verdict::Retry => {
                mission.step_mut(index)?.reset()?;
                mission.transition(MissionStatus::Executing)?;
            }
            Verdict::Replan => {
                mission.record_replan(failed.anchor());
                match self.request_replan(mission, &failed, cancel).await {
                    None => self.abandon(mission, "interrupted")?,
                    Some(Ok(templates)) => {
                        self.apply_replan(mission, &failed, templates)?;
                        mission.transition(MissionStatus::Executing)?;
                    }
                    Some(Err(e)) => {
                        warn!("◆ REPLAN UNAVAILABLE: {}", e);
                        if mission.escalation_budget > 0 {
                            self.escalate(mission, &failed)?;
                        } else {
                            mission.fail(format!(
                                "step {} ({}) failed and no replan was possible: {}",
                                index,
                                failed.label(),
                                plan_reason(&e)
                            ))?;
                        }
                    }
                }
            }
            Verdict::Escalate => self.escalate(mission, &failed)?,
            Verdict::Abort => {
                mission.fail(format!(
                    "step {} ({}) failed: {}",
                    index,
                    failed.label(),
                    failed.observation.as_deref().unwrap_or("unknown error")
                ))?;
            }
        }
        self.persist(mission).await;
        Ok(())
    }

    async fn request_replan(
        &self,
        mission: &Mission,
        failed: &MissionStep,
        cancel: &CancellationToken,
    ) -> Option<std::result::Result<Vec<StepTemplate>, PlanError>> {
        let capabilities = self.registry.describe_all();
        let history = self.history(&mission.id).await;
        let failure = FailureContext::from_mission(mission, failed);
        let proposal = self.planner.propose_replan(
            &mission.goal,
            &capabilities,
            history,
            failure,
            &mission.guidance,
        );
        until_cancelled(cancel, proposal).await
    }

    fn apply_replan(
        &self,
        mission: &mut Mission,
        failed: &MissionStep,
        templates: Vec<StepTemplate>,
    ) -> MissionResult<()> {
        let skipped = mission.skip_pending_after(failed.index, SUPERSEDED)?;
        let range = mission.append_plan(templates, Some(failed.anchor()));
        info!(
            "◆ REPLANNED AROUND STEP {}: {} NEW, {} SUPERSEDED",
            failed.index,
            range.len(),
            skipped
        );
        Ok(())
    }

    fn escalate(
        &self,
        mission: &mut Mission,
        failed: &MissionStep,
    ) -> MissionResult<()> {
        mission.consume_escalation();
        let question = format!(
            "Step {} ({}) keeps failing: {}. How should the mission proceed?",
            failed.index,
            failed.label(),
            failed.observation.as_deref().unwrap_or("unknown error")
        );
        info!(
            "◆ MISSION {} ESCALATED ({} LEFT)",
            mission.id, mission.escalation_budget
        );
        mission.await_human(question)
    }

    /// Mark the mission failed as cancelled. Terminal steps stay as they
    /// are; a step caught mid-flight is failed, pending steps are kept.
    fn abandon(&self, mission: &mut Mission, reason: &str) -> MissionResult<()> {
        if let Some(index) = mission.interrupted_step() {
            mission
                .step_mut(index)?
                .fail("cancelled", None, false)?;
        }
        info!("◆ MISSION {} CANCELLED: {}", mission.id, reason);
        mission.fail(format!("cancelled: {reason}"))
    }
}

/// `None` when `cancel` fires before `work` finishes
async fn until_cancelled<F: Future>(cancel: &CancellationToken, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = work => Some(output),
    }
}

fn plan_reason(e: &PlanError) -> String {
    match e {
        PlanError::InvalidPlan(reason) => format!("invalid plan: {reason}"),
        PlanError::CannotPlan(reason) => reason.clone(),
        PlanError::Planner(inner) => inner.to_string(),
    }
}

impl<P: Planner> std::fmt::Debug for MissionEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionEngine")
            .field("providers", &self.registry.names())
            .field("policy", &self.policy)
            .finish()
    }
}
