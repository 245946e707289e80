//! Autonomous execution loop.
//!
//! A ticker task fires at the configured interval and spawns one execution
//! cycle per tick. Cycles that find another execution in flight skip. The
//! task only holds a weak reference to the engine, so dropping the last
//! engine handle ends the loop at the next tick.

use std::sync::{Arc, PoisonError};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use wheelhouse_core::{EventPayload, MissionId};

use crate::engine::{ExecutionGuard, MissionEngine, StepRun};
use crate::error::EngineError;

pub(crate) struct AutonomousLoop {
    mission_id: MissionId,
    cancel: CancellationToken,
}

impl MissionEngine {
    /// Start executing steps on a timer. Returns `false` if the loop is
    /// already running or there is no active mission.
    pub async fn start_autonomous(self: &Arc<Self>) -> bool {
        let Some(mission_id) = self.state.lock().await.mission.as_ref().map(|m| m.id) else {
            tracing::debug!("No active mission, autonomous mode not started");
            return false;
        };

        if !self.spawn_loop(mission_id) {
            return false;
        }

        tracing::info!(
            mission_id = %mission_id,
            interval_ms = self.config.autonomous_interval_ms,
            "Autonomous mode started"
        );
        self.notify(
            mission_id,
            EventPayload::AutonomousStarted {
                interval_ms: self.config.autonomous_interval_ms,
            },
        );
        true
    }

    fn spawn_loop(self: &Arc<Self>, mission_id: MissionId) -> bool {
        let mut slot = self
            .autonomous
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = Arc::downgrade(self);
        let period = self.config.autonomous_interval();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else { break };
                        tokio::spawn(async move { engine.run_cycle().await });
                    }
                }
            }

            tracing::debug!(mission_id = %mission_id, "Autonomous ticker exited");
        });

        *slot = Some(AutonomousLoop { mission_id, cancel });
        true
    }

    /// Stop the loop. An execution already in flight finishes normally.
    /// Returns `false` if the loop was not running.
    pub fn stop_autonomous(&self) -> bool {
        let stopped = self
            .autonomous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match stopped {
            Some(running) => {
                running.cancel.cancel();
                tracing::info!(mission_id = %running.mission_id, "Autonomous mode stopped");
                self.notify(running.mission_id, EventPayload::AutonomousStopped);
                true
            }
            None => false,
        }
    }

    pub fn is_autonomous_running(&self) -> bool {
        self.autonomous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// One tick of the loop.
    pub(crate) async fn run_cycle(&self) {
        let Some(_guard) = ExecutionGuard::try_acquire(&self.executing) else {
            tracing::debug!("Previous cycle still executing, skipping tick");
            return;
        };

        match self.execute_next_step_guarded().await {
            Ok(StepRun::Idle) => {
                self.stop_autonomous();
                match self.settle_mission().await {
                    Ok(status) => tracing::info!(status = %status, "Autonomous run finished"),
                    Err(e) => tracing::debug!(error = %e, "Nothing to settle"),
                }
            }
            Ok(StepRun::Executed(report)) if report.success => {
                if let Some((mission_id, update)) = self.awareness(report.step.step_id).await {
                    self.notify(mission_id, update);
                }
            }
            Ok(StepRun::Executed(report)) => {
                if self.config.pause_on_error {
                    let step_id = report.step.step_id;
                    let error = report.error.unwrap_or_default();
                    self.stop_autonomous();
                    tracing::warn!(step_id, error = %error, "Autonomous mode paused on step failure");
                    self.notify(
                        report.context.mission_id,
                        EventPayload::AutonomousPaused { step_id, error },
                    );
                }
            }
            Ok(StepRun::Superseded { .. }) => {}
            Err(EngineError::NoActiveMission) => {
                self.stop_autonomous();
            }
            Err(e) => tracing::error!(error = %e, "Autonomous cycle failed"),
        }
    }
}
