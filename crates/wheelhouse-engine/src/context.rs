//! Context snapshot assembly.
//!
//! A snapshot is a pure function of the mission plus the engine's rolling
//! decision and deviation logs. Apart from `built_at`, building twice from
//! unchanged state yields equal snapshots.

use std::collections::BTreeSet;

use chrono::Utc;

use wheelhouse_core::{
    ContextSnapshot, Decision, Deviation, EngineConfig, Mission, Step, StepStatus, StepSummary,
};

/// Assemble the full mission-state view for `current`.
pub fn build_context(
    mission: &Mission,
    current: Option<&Step>,
    decisions: &[Decision],
    deviations: &[Deviation],
    config: &EngineConfig,
) -> ContextSnapshot {
    let ordered = mission.steps_in_order();
    let current_id = current.map(|s| s.step_id);

    let completed_steps: Vec<StepSummary> = ordered
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .map(|s| StepSummary::from(*s))
        .collect();

    let upcoming_steps: Vec<StepSummary> = ordered
        .iter()
        .filter(|s| s.status == StepStatus::Pending && Some(s.step_id) != current_id)
        .take(config.upcoming_window_size)
        .map(|s| StepSummary::from(*s))
        .collect();

    let files_modified: BTreeSet<String> = ordered
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .flat_map(|s| s.logbook_entries.iter())
        .flat_map(|e| e.files_modified.iter().cloned())
        .collect();

    let known_problems: Vec<String> = ordered
        .iter()
        .flat_map(|s| s.problems().cloned())
        .collect();

    ContextSnapshot {
        mission_id: mission.id,
        mission_title: mission.title.clone(),
        objectives: mission.objectives.clone(),
        progress: mission.progress(),
        total_steps: mission.total_steps(),
        completed_count: mission.count(StepStatus::Completed),
        failed_count: mission.count(StepStatus::Failed),
        completed_steps,
        current_step: current.map(StepSummary::from),
        upcoming_steps,
        files_modified: files_modified.into_iter().collect(),
        recent_decisions: tail(decisions, config.context_window_size),
        recent_deviations: tail(deviations, config.context_window_size),
        known_problems,
        success_rate: mission.success_rate(),
        built_at: Utc::now(),
    }
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}
