//! Logbook entry construction and best-effort persistence helpers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use wheelhouse_core::{
    ContextSnapshot, EntryResult, LogbookEntry, Mission, MissionId, MissionStatus, Severity,
    Step,
};
use wheelhouse_logbook::{ExecutionRecord, Logbook};

use crate::executor::ExecutionOutcome;
use crate::policy::classify_severity;

/// Build the logbook entry for one attempt.
///
/// An attempt needs review when the executor asks for it, when it failed,
/// or when any reported problem is major or worse.
pub fn entry_for_outcome(
    step: &Step,
    outcome: &ExecutionOutcome,
    context: ContextSnapshot,
) -> LogbookEntry {
    let result = match (outcome.success, outcome.problems.is_empty()) {
        (true, true) => EntryResult::Success,
        (true, false) => EntryResult::Partial,
        (false, _) => EntryResult::Failed,
    };

    let serious_problem = outcome
        .problems
        .iter()
        .any(|p| classify_severity(p) >= Severity::Major);

    LogbookEntry {
        timestamp: Utc::now(),
        officer: step.assigned_role.clone(),
        action: outcome.action.clone(),
        result,
        summary: (!outcome.summary.is_empty()).then(|| outcome.summary.clone()),
        problems: outcome.problems.clone(),
        files_modified: outcome.files_modified.clone(),
        tools_used: outcome.tools_used.clone(),
        needs_review: outcome.needs_review || !outcome.success || serious_problem,
        context_snapshot: context,
    }
}

/// Seal and store an execution record. Failures are logged, never returned.
pub fn persist_execution(
    logbook: Option<&Arc<dyn Logbook>>,
    mission_id: MissionId,
    step: &Step,
    entry: LogbookEntry,
) {
    let Some(logbook) = logbook else {
        return;
    };

    let record = ExecutionRecord::new(
        mission_id,
        step.step_id,
        step.assigned_role.clone(),
        step.retry_count,
        step.start_time,
        entry,
    )
    .seal();

    if let Err(e) = logbook.save_step_execution(&record) {
        tracing::warn!(
            mission_id = %mission_id,
            step_id = step.step_id,
            error = %e,
            "Failed to persist execution record"
        );
    }
}

pub fn persist_mission(logbook: Option<&Arc<dyn Logbook>>, mission: &Mission) {
    if let Some(logbook) = logbook {
        if let Err(e) = logbook.save_mission(mission) {
            tracing::warn!(mission_id = %mission.id, error = %e, "Failed to persist mission");
        }
    }
}

pub fn persist_status(
    logbook: Option<&Arc<dyn Logbook>>,
    mission_id: MissionId,
    status: MissionStatus,
    completed_at: Option<DateTime<Utc>>,
) {
    if let Some(logbook) = logbook {
        if let Err(e) = logbook.update_mission_status(mission_id, status, completed_at) {
            tracing::warn!(
                mission_id = %mission_id,
                status = %status,
                error = %e,
                "Failed to persist mission status"
            );
        }
    }
}
