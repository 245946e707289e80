//! Notification events emitted by the engine.
//!
//! Events are fire-and-forget: the engine hands them to a notifier and
//! never waits for acknowledgement. A UI or chat layer consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AgentRole, MissionId, MissionStatus, Severity, StepId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted while orchestrating a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionEvent {
    pub id: EventId,
    pub mission_id: MissionId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl MissionEvent {
    pub fn new(mission_id: MissionId, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            mission_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Dotted event name, e.g. `deviation.escalated`.
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Mission lifecycle ─────────────────────────────────────
    MissionStarted {
        title: String,
        step_count: usize,
    },
    MissionFinished {
        status: MissionStatus,
        progress: u32,
        success_rate: f64,
    },

    // ── Step lifecycle ────────────────────────────────────────
    StepStarted {
        step_id: StepId,
        role: AgentRole,
        attempt: u32,
    },
    StepCompleted {
        step_id: StepId,
        action: String,
        summary: String,
    },
    StepFailed {
        step_id: StepId,
        error: String,
        retry_count: u32,
        /// No further automatic retries will happen.
        permanent: bool,
    },

    // ── Escalation ────────────────────────────────────────────
    /// A critical deviation needs a human operator.
    DeviationEscalated {
        step_id: Option<StepId>,
        severity: Severity,
        expected_behavior: String,
        actual_behavior: String,
    },

    // ── Autonomous loop ───────────────────────────────────────
    AutonomousStarted {
        interval_ms: u64,
    },
    AutonomousStopped,
    /// The loop halted on a failure and waits for human review.
    AutonomousPaused {
        step_id: StepId,
        error: String,
    },
    /// Continuous-awareness summary after a successful autonomous step.
    AwarenessUpdate {
        completed_step: StepId,
        just_did: String,
        where_we_are: String,
        whats_next: Option<String>,
    },
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MissionStarted { .. } => "mission.started",
            Self::MissionFinished { .. } => "mission.finished",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::DeviationEscalated { .. } => "deviation.escalated",
            Self::AutonomousStarted { .. } => "autonomous.started",
            Self::AutonomousStopped => "autonomous.stopped",
            Self::AutonomousPaused { .. } => "autonomous.paused",
            Self::AwarenessUpdate { .. } => "awareness.update",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::StepFailed { .. } | Self::DeviationEscalated { .. } | Self::AutonomousPaused { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_event_type() {
        let payload = EventPayload::DeviationEscalated {
            step_id: Some(2),
            severity: Severity::Critical,
            expected_behavior: "clean run".to_string(),
            actual_behavior: "security vulnerability".to_string(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"DeviationEscalated\""));
        assert!(json.contains("\"severity\":\"critical\""));
    }

    #[test]
    fn event_names() {
        let event = MissionEvent::new(MissionId::new(), EventPayload::AutonomousStopped);
        assert_eq!(event.name(), "autonomous.stopped");
        assert!(!event.payload.is_error());
        assert!(EventPayload::AutonomousPaused {
            step_id: 1,
            error: "boom".to_string()
        }
        .is_error());
    }
}
