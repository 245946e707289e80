//! The mission engine: owns the current mission and coordinates step execution.
//!
//! All mission mutation funnels through this type. State is locked only for
//! CPU-bound sections; the executor call runs with the lock released, and
//! the `executing` flag keeps a second execution from starting meanwhile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use wheelhouse_core::{
    ContextSnapshot, Decision, Deviation, EngineConfig, EventPayload, Mission, MissionEvent,
    MissionId, MissionStatus, Step, StepId, StepPlan, StepStatus,
};
use wheelhouse_logbook::Logbook;

use crate::autonomous::AutonomousLoop;
use crate::error::{EngineError, Result};
use crate::executor::{ExecutionOutcome, ExecutorError, ExecutorRegistry};
use crate::notify::{Notifier, TracingNotifier};
use crate::parse::OrderParser;
use crate::{context, policy, record, reflexion, scheduler};

/// Result of asking the engine to run the next step.
#[derive(Debug, Clone)]
pub enum StepRun {
    /// No runnable step: everything is done, or the rest is blocked.
    Idle,
    Executed(StepReport),
    /// The mission was replaced or closed while the step was running; the
    /// outcome was discarded.
    Superseded { step_id: StepId },
}

/// What happened to the step that just ran.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub success: bool,
    /// The step after the outcome was applied.
    pub step: Step,
    /// Context the step was executed with.
    pub context: ContextSnapshot,
    pub error: Option<String>,
    pub needs_review: bool,
    /// The step failed but went back to `pending` for a later attempt.
    pub retry_scheduled: bool,
}

/// Point-in-time overview of the current mission.
#[derive(Debug, Clone, Serialize)]
pub struct MissionStatusReport {
    pub mission_id: MissionId,
    pub title: String,
    pub status: MissionStatus,
    pub progress: u32,
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub in_flight: Option<StepId>,
    pub autonomous_running: bool,
}

#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) mission: Option<Mission>,
    /// Rolling logs scoped to the current mission.
    pub(crate) decisions: Vec<Decision>,
    pub(crate) deviations: Vec<Deviation>,
    pub(crate) in_flight: Option<StepId>,
}

/// Work claimed from the mission before the executor runs.
struct Claim {
    mission_id: MissionId,
    step: Step,
    context: ContextSnapshot,
}

/// Holds the single execution slot; released on drop.
pub(crate) struct ExecutionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ExecutionGuard<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates one mission at a time for bounded-context agents.
pub struct MissionEngine {
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
    executors: ExecutorRegistry,
    logbook: Option<Arc<dyn Logbook>>,
    notifier: Arc<dyn Notifier>,
    pub(crate) executing: AtomicBool,
    pub(crate) autonomous: StdMutex<Option<AutonomousLoop>>,
}

impl MissionEngine {
    /// Create an engine with the given executors, no logbook, and a
    /// tracing notifier.
    pub fn new(config: EngineConfig, executors: ExecutorRegistry) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
            executors,
            logbook: None,
            notifier: Arc::new(TracingNotifier),
            executing: AtomicBool::new(false),
            autonomous: StdMutex::new(None),
        }
    }

    /// Persist missions and execution records to a logbook.
    pub fn with_logbook(mut self, logbook: Arc<dyn Logbook>) -> Self {
        self.logbook = Some(logbook);
        self
    }

    /// Deliver events to a custom notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub(crate) fn notify(&self, mission_id: MissionId, payload: EventPayload) {
        self.notifier.emit(MissionEvent::new(mission_id, payload));
    }

    // ── Mission lifecycle ─────────────────────────────────────────

    /// Start a new mission, discarding the previous one and its context.
    pub async fn start_mission(
        &self,
        title: impl Into<String>,
        objectives: Vec<String>,
        steps: Vec<StepPlan>,
    ) -> Result<MissionId> {
        let mission = Mission::new(title, objectives, steps);
        scheduler::validate_plan(&mission).map_err(EngineError::InvalidMission)?;

        self.stop_autonomous();

        {
            let mut state = self.state.lock().await;
            if let Some(previous) = &state.mission {
                tracing::info!(
                    previous_mission_id = %previous.id,
                    mission_id = %mission.id,
                    "Replacing current mission"
                );
            }
            *state = EngineState {
                mission: Some(mission.clone()),
                ..Default::default()
            };
        }

        record::persist_mission(self.logbook.as_ref(), &mission);

        tracing::info!(
            mission_id = %mission.id,
            title = %mission.title,
            steps = mission.total_steps(),
            "Mission started"
        );
        self.notify(
            mission.id,
            EventPayload::MissionStarted {
                title: mission.title.clone(),
                step_count: mission.total_steps(),
            },
        );

        Ok(mission.id)
    }

    /// Parse an order and start the resulting mission.
    pub async fn start_mission_from_order(
        &self,
        parser: &dyn OrderParser,
        request: &str,
    ) -> Result<MissionId> {
        let order = parser.parse(request)?;
        self.start_mission(order.title, order.objectives, order.steps)
            .await
    }

    /// Close the current mission as completed and hand it back.
    pub async fn complete_mission(&self) -> Result<Mission> {
        self.close_mission(MissionStatus::Completed, None).await
    }

    /// Close the current mission as failed and hand it back.
    pub async fn abort_mission(&self, reason: &str) -> Result<Mission> {
        self.close_mission(MissionStatus::Failed, Some(reason)).await
    }

    async fn close_mission(&self, status: MissionStatus, reason: Option<&str>) -> Result<Mission> {
        self.stop_autonomous();

        let mut mission = {
            let mut state = self.state.lock().await;
            let mission = state.mission.take().ok_or(EngineError::NoActiveMission)?;
            *state = EngineState::default();
            mission
        };

        let now = Utc::now();
        mission.status = status;
        mission.completed_at = Some(now);
        record::persist_status(self.logbook.as_ref(), mission.id, status, Some(now));

        tracing::info!(
            mission_id = %mission.id,
            status = %status,
            reason = reason.unwrap_or(""),
            "Mission closed"
        );
        self.notify(
            mission.id,
            EventPayload::MissionFinished {
                status,
                progress: mission.progress(),
                success_rate: mission.success_rate(),
            },
        );

        Ok(mission)
    }

    /// When nothing is runnable, settle the mission status: `completed` if
    /// every step completed or was skipped, `failed` if all are terminal and
    /// one failed, `blocked` if pending steps can never run.
    pub async fn settle_mission(&self) -> Result<MissionStatus> {
        let (mission_id, settled, payload) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let mission = state.mission.as_mut().ok_or(EngineError::NoActiveMission)?;

            if state.in_flight.is_some() || scheduler::next_runnable_step(mission).is_some() {
                return Ok(mission.status);
            }

            let settled = if mission.all_steps_terminal() {
                if mission.has_failed_steps() {
                    MissionStatus::Failed
                } else {
                    MissionStatus::Completed
                }
            } else {
                MissionStatus::Blocked
            };

            if settled == mission.status {
                return Ok(settled);
            }

            mission.status = settled;
            if settled.is_terminal() {
                mission.completed_at = Some(Utc::now());
            }
            record::persist_status(
                self.logbook.as_ref(),
                mission.id,
                settled,
                mission.completed_at,
            );

            tracing::info!(
                mission_id = %mission.id,
                status = %settled,
                progress = mission.progress(),
                "Mission settled"
            );

            (
                mission.id,
                settled,
                EventPayload::MissionFinished {
                    status: settled,
                    progress: mission.progress(),
                    success_rate: mission.success_rate(),
                },
            )
        };

        self.notify(mission_id, payload);
        Ok(settled)
    }

    // ── Queries ───────────────────────────────────────────────────

    /// A copy of the current mission.
    pub async fn mission(&self) -> Option<Mission> {
        self.state.lock().await.mission.clone()
    }

    pub async fn next_runnable_step(&self) -> Result<Option<Step>> {
        let state = self.state.lock().await;
        let mission = state.mission.as_ref().ok_or(EngineError::NoActiveMission)?;
        Ok(scheduler::next_runnable_step(mission).cloned())
    }

    /// Build a context snapshot for `step_id`, or for the next runnable
    /// step when `None`.
    pub async fn build_context(&self, step_id: Option<StepId>) -> Result<ContextSnapshot> {
        let state = self.state.lock().await;
        let mission = state.mission.as_ref().ok_or(EngineError::NoActiveMission)?;

        let current = match step_id {
            Some(id) => Some(mission.step(id).ok_or(EngineError::StepNotFound { step_id: id })?),
            None => scheduler::next_runnable_step(mission),
        };

        Ok(context::build_context(
            mission,
            current,
            &state.decisions,
            &state.deviations,
            &self.config,
        ))
    }

    pub async fn decisions(&self) -> Vec<Decision> {
        self.state.lock().await.decisions.clone()
    }

    pub async fn deviations(&self) -> Vec<Deviation> {
        self.state.lock().await.deviations.clone()
    }

    pub async fn status(&self) -> Result<MissionStatusReport> {
        let state = self.state.lock().await;
        let mission = state.mission.as_ref().ok_or(EngineError::NoActiveMission)?;

        Ok(MissionStatusReport {
            mission_id: mission.id,
            title: mission.title.clone(),
            status: mission.status,
            progress: mission.progress(),
            total_steps: mission.total_steps(),
            completed: mission.count(StepStatus::Completed),
            failed: mission.count(StepStatus::Failed),
            pending: mission.count(StepStatus::Pending),
            skipped: mission.count(StepStatus::Skipped),
            success_rate: mission.success_rate(),
            in_flight: state.in_flight,
            autonomous_running: self.is_autonomous_running(),
        })
    }

    // ── Operator actions ──────────────────────────────────────────

    /// Mark a pending or failed step as skipped. Skipped steps never run and
    /// do not satisfy dependencies.
    pub async fn skip_step(&self, step_id: StepId) -> Result<()> {
        let mut state = self.state.lock().await;
        let mission = state.mission.as_mut().ok_or(EngineError::NoActiveMission)?;
        let mission_id = mission.id;
        let step = mission
            .step_mut(step_id)
            .ok_or(EngineError::StepNotFound { step_id })?;

        match step.status {
            StepStatus::Pending | StepStatus::Failed => {
                step.status = StepStatus::Skipped;
                tracing::info!(mission_id = %mission_id, step_id, "Step skipped by operator");
                Ok(())
            }
            status => Err(EngineError::InvalidTransition {
                step_id,
                status,
                action: "skip",
            }),
        }
    }

    /// Put a permanently failed step back in the queue with a fresh retry budget.
    pub async fn retry_step(&self, step_id: StepId) -> Result<()> {
        let mut state = self.state.lock().await;
        let mission = state.mission.as_mut().ok_or(EngineError::NoActiveMission)?;
        let mission_id = mission.id;
        let step = mission
            .step_mut(step_id)
            .ok_or(EngineError::StepNotFound { step_id })?;

        if step.status != StepStatus::Failed {
            return Err(EngineError::InvalidTransition {
                step_id,
                status: step.status,
                action: "retry",
            });
        }

        step.status = StepStatus::Pending;
        step.retry_count = 0;
        step.completion_time = None;
        tracing::info!(mission_id = %mission_id, step_id, "Step re-queued by operator");
        Ok(())
    }

    pub async fn record_decision(&self, decision: Decision) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.mission.is_none() {
            return Err(EngineError::NoActiveMission);
        }
        state.decisions.push(decision);
        Ok(())
    }

    /// Record a deviation, escalating it when critical and auto-escalation is on.
    pub async fn record_deviation(&self, deviation: Deviation) -> Result<()> {
        let (mission_id, escalation) = {
            let mut state = self.state.lock().await;
            let mission_id = state
                .mission
                .as_ref()
                .map(|m| m.id)
                .ok_or(EngineError::NoActiveMission)?;
            let escalation = push_deviation(&mut state.deviations, deviation, &self.config);
            (mission_id, escalation)
        };

        if let Some(payload) = escalation {
            self.notify(mission_id, payload);
        }
        Ok(())
    }

    // ── Execution coordinator ─────────────────────────────────────

    /// Run the next runnable step once.
    ///
    /// Step failures are reported in the returned [`StepReport`], never as
    /// errors. Fails with `ExecutionInProgress` if another execution (for
    /// example an autonomous tick) holds the slot.
    ///
    /// The attempt runs on its own task. Dropping the returned future (a
    /// caller-side timeout, a lost `select!` branch) does not abandon it: the
    /// outcome is still applied and logged, and the slot is released after.
    pub async fn execute_next_step(self: &Arc<Self>) -> Result<StepRun> {
        let engine = Arc::clone(self);
        let attempt = tokio::spawn(async move {
            let _guard = ExecutionGuard::try_acquire(&engine.executing)
                .ok_or(EngineError::ExecutionInProgress)?;
            engine.execute_next_step_guarded().await
        });

        match attempt.await {
            Ok(result) => result,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(join) => Err(EngineError::ExecutionAborted(join.to_string())),
        }
    }

    /// Caller must hold the execution slot.
    pub(crate) async fn execute_next_step_guarded(&self) -> Result<StepRun> {
        let Some(claim) = self.claim_next_step().await? else {
            tracing::debug!("No pending steps");
            return Ok(StepRun::Idle);
        };

        tracing::info!(
            mission_id = %claim.mission_id,
            step_id = claim.step.step_id,
            role = %claim.step.assigned_role,
            attempt = claim.step.retry_count + 1,
            "Executing step"
        );
        self.notify(
            claim.mission_id,
            EventPayload::StepStarted {
                step_id: claim.step.step_id,
                role: claim.step.assigned_role.clone(),
                attempt: claim.step.retry_count + 1,
            },
        );

        let result = self.executors.dispatch(&claim.step, &claim.context).await;

        let (run, events) = self.apply_result(claim, result).await;
        for (mission_id, payload) in events {
            self.notify(mission_id, payload);
        }
        Ok(run)
    }

    /// Pick the next step, mark it in progress, and snapshot its context.
    async fn claim_next_step(&self) -> Result<Option<Claim>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mission = state.mission.as_mut().ok_or(EngineError::NoActiveMission)?;

        let Some(step_id) = scheduler::next_runnable_step(mission).map(|s| s.step_id) else {
            return Ok(None);
        };

        let now = Utc::now();
        if mission.status != MissionStatus::Executing {
            mission.status = MissionStatus::Executing;
            mission.started_at.get_or_insert(now);
            mission.completed_at = None;
            record::persist_status(
                self.logbook.as_ref(),
                mission.id,
                MissionStatus::Executing,
                None,
            );
        }

        let step = mission
            .step_mut(step_id)
            .ok_or(EngineError::StepNotFound { step_id })?;
        step.status = StepStatus::InProgress;
        step.start_time = Some(now);
        let step = step.clone();

        let context = context::build_context(
            mission,
            Some(&step),
            &state.decisions,
            &state.deviations,
            &self.config,
        );
        let mission_id = mission.id;
        state.in_flight = Some(step_id);

        Ok(Some(Claim {
            mission_id,
            step,
            context,
        }))
    }

    /// Fold an executor result back into the mission: logbook entry, status
    /// and retry bookkeeping, deviations, reflexion.
    async fn apply_result(
        &self,
        claim: Claim,
        result: std::result::Result<ExecutionOutcome, ExecutorError>,
    ) -> (StepRun, Vec<(MissionId, EventPayload)>) {
        let step_id = claim.step.step_id;
        let (outcome, retryable) = match result {
            Ok(outcome) => (outcome, true),
            Err(e) => {
                tracing::warn!(
                    mission_id = %claim.mission_id,
                    step_id,
                    error = %e,
                    "Executor error"
                );
                let retryable = e.is_retryable();
                let outcome = ExecutionOutcome::failed(format!("Execute step {step_id}"), "")
                    .with_problems([e.to_string()]);
                (outcome, retryable)
            }
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.in_flight == Some(step_id) {
            state.in_flight = None;
        }

        let Some(mission) = state
            .mission
            .as_mut()
            .filter(|m| m.id == claim.mission_id)
        else {
            tracing::warn!(
                mission_id = %claim.mission_id,
                step_id,
                "Mission replaced while step was running, discarding outcome"
            );
            return (StepRun::Superseded { step_id }, Vec::new());
        };
        let mission_id = mission.id;

        let Some(step) = mission.step_mut(step_id) else {
            return (StepRun::Superseded { step_id }, Vec::new());
        };

        let entry = record::entry_for_outcome(step, &outcome, claim.context.clone());
        let needs_review = entry.needs_review;
        step.logbook_entries.push(entry.clone());

        let mut events = Vec::new();
        let mut retry_scheduled = false;
        let error = if outcome.success {
            step.status = StepStatus::Completed;
            step.completion_time = Some(Utc::now());
            None
        } else {
            step.retry_count += 1;
            let message = outcome
                .problems
                .first()
                .cloned()
                .or_else(|| (!outcome.summary.is_empty()).then(|| outcome.summary.clone()))
                .unwrap_or_else(|| "Step failed".to_string());

            if !retryable || step.retry_count >= self.config.max_retries {
                step.status = StepStatus::Failed;
            } else {
                step.status = StepStatus::Pending;
                retry_scheduled = true;
            }
            Some(message)
        };
        let step = step.clone();

        record::persist_execution(self.logbook.as_ref(), mission_id, &step, entry);

        match &error {
            None => {
                tracing::info!(mission_id = %mission_id, step_id, action = %outcome.action, "Step completed");
                events.push((
                    mission_id,
                    EventPayload::StepCompleted {
                        step_id,
                        action: outcome.action.clone(),
                        summary: outcome.summary.clone(),
                    },
                ));
            }
            Some(message) => {
                let permanent = step.status == StepStatus::Failed;
                tracing::warn!(
                    mission_id = %mission_id,
                    step_id,
                    retry_count = step.retry_count,
                    max_retries = self.config.max_retries,
                    permanent,
                    error = %message,
                    "Step failed"
                );
                events.push((
                    mission_id,
                    EventPayload::StepFailed {
                        step_id,
                        error: message.clone(),
                        retry_count: step.retry_count,
                        permanent,
                    },
                ));
            }
        }

        for deviation in policy::deviations_for_problems(&step, &outcome.problems) {
            if let Some(payload) = push_deviation(&mut state.deviations, deviation, &self.config) {
                events.push((mission_id, payload));
            }
        }

        if outcome.success && self.config.enable_reflexion {
            let checkpoint = reflexion::checkpoint(mission, step_id);
            tracing::debug!(
                mission_id = %mission_id,
                step_id,
                on_track = checkpoint.on_track,
                success_rate = checkpoint.success_rate,
                known_problems = checkpoint.known_problems,
                "Reflexion checkpoint"
            );
            if let Some(deviation) = checkpoint.deviation {
                if let Some(payload) = push_deviation(&mut state.deviations, deviation, &self.config)
                {
                    events.push((mission_id, payload));
                }
            }
            if let Some(decision) = checkpoint.decision {
                state.decisions.push(decision);
            }
        }

        let report = StepReport {
            success: outcome.success,
            step,
            context: claim.context,
            error,
            needs_review,
            retry_scheduled,
        };
        (StepRun::Executed(report), events)
    }

    /// Awareness summary for a just-completed step of the current mission.
    pub(crate) async fn awareness(&self, step_id: StepId) -> Option<(MissionId, EventPayload)> {
        let state = self.state.lock().await;
        let mission = state.mission.as_ref()?;
        Some((mission.id, reflexion::awareness_update(mission, step_id)))
    }
}

/// Append a deviation; returns the escalation payload when it must be escalated.
fn push_deviation(
    deviations: &mut Vec<Deviation>,
    deviation: Deviation,
    config: &EngineConfig,
) -> Option<EventPayload> {
    let escalation = policy::should_escalate(&deviation, config).then(|| {
        tracing::warn!(
            step_id = ?deviation.step_id,
            severity = %deviation.severity,
            actual = %deviation.actual_behavior,
            "Escalating critical deviation"
        );
        EventPayload::DeviationEscalated {
            step_id: deviation.step_id,
            severity: deviation.severity,
            expected_behavior: deviation.expected_behavior.clone(),
            actual_behavior: deviation.actual_behavior.clone(),
        }
    });
    deviations.push(deviation);
    escalation
}
