//! Post-success mission health checks.
//!
//! Advisory only: a checkpoint can annotate the mission with a deviation
//! and a decision, but never blocks progress.

use wheelhouse_core::{AgentRole, Decision, Deviation, EventPayload, Mission, StepId};

use crate::policy::classify_severity;
use crate::scheduler;

/// Success rate a mission must exceed to count as on track.
pub const ON_TRACK_THRESHOLD: f64 = 0.7;

/// Below this rate the checkpoint advises closer monitoring.
pub const MONITOR_THRESHOLD: f64 = 0.5;

/// Outcome of one reflexion checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub on_track: bool,
    pub success_rate: f64,
    pub known_problems: usize,
    pub deviation: Option<Deviation>,
    pub decision: Option<Decision>,
}

/// On track iff the success rate exceeds 0.7 and no problem was ever logged.
pub fn checkpoint(mission: &Mission, after_step: StepId) -> Checkpoint {
    let success_rate = mission.success_rate();
    let known_problems = mission.steps.iter().flat_map(|s| s.problems()).count();
    let on_track = success_rate > ON_TRACK_THRESHOLD && known_problems == 0;

    if on_track {
        return Checkpoint {
            on_track,
            success_rate,
            known_problems,
            deviation: None,
            decision: None,
        };
    }

    let pct = (success_rate * 100.0).round() as u32;
    let message = format!("Low success rate: {pct}%");
    let deviation = Deviation::new(
        Some(after_step),
        format!("Success rate above {}%", (ON_TRACK_THRESHOLD * 100.0) as u32),
        message.clone(),
        classify_severity(&message),
    );

    let outcome = if success_rate < MONITOR_THRESHOLD {
        "monitor closely"
    } else {
        "continue"
    };
    let decision = Decision::new(
        Some(after_step),
        AgentRole::Reflexion,
        format!("Reflexion checkpoint after step {after_step}"),
        format!("Success rate {pct}% with {known_problems} known problem(s)"),
        outcome,
    );

    Checkpoint {
        on_track,
        success_rate,
        known_problems,
        deviation: Some(deviation),
        decision: Some(decision),
    }
}

/// "What we just did / where we are / what's next" after a completed step.
pub fn awareness_update(mission: &Mission, completed_step: StepId) -> EventPayload {
    let just_did = mission
        .step(completed_step)
        .map(|s| match s.last_entry() {
            Some(entry) => format!("Step {}: {} ({})", s.step_id, s.description, entry.action),
            None => format!("Step {}: {}", s.step_id, s.description),
        })
        .unwrap_or_else(|| format!("Step {completed_step}"));

    let where_we_are = format!(
        "{} of {} steps complete ({}%)",
        mission.count(wheelhouse_core::StepStatus::Completed),
        mission.total_steps(),
        mission.progress()
    );

    let whats_next = scheduler::next_runnable_step(mission)
        .map(|s| format!("Step {}: {} [{}]", s.step_id, s.description, s.assigned_role));

    EventPayload::AwarenessUpdate {
        completed_step,
        just_did,
        where_we_are,
        whats_next,
    }
}
