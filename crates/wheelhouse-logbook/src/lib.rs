//! wheelhouse-logbook: Durable, tamper-evident mission history.
//!
//! Every step execution attempt produces one [`ExecutionRecord`] wrapping
//! the logbook entry appended to the step. Records are content-hashed with
//! BLAKE3 when sealed so any later edit is detectable. The engine treats
//! persistence as best-effort: in-memory mission state stays authoritative.

pub mod hash;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wheelhouse_core::{AgentRole, LogbookEntry, MissionId, StepId};

pub use store::{FileLogbook, Logbook, LogbookError, MemoryLogbook, MissionRecord};

/// Unique identifier for an execution record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted step execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: RecordId,
    pub mission_id: MissionId,
    pub step_id: StepId,
    pub role: AgentRole,
    /// Retry count of the step after this attempt was applied.
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
    pub entry: LogbookEntry,
    /// BLAKE3 content hash (hex), set by [`ExecutionRecord::seal`].
    pub content_hash: Option<String>,
}

impl ExecutionRecord {
    pub fn new(
        mission_id: MissionId,
        step_id: StepId,
        role: AgentRole,
        retry_count: u32,
        started_at: Option<DateTime<Utc>>,
        entry: LogbookEntry,
    ) -> Self {
        Self {
            id: RecordId::new(),
            mission_id,
            step_id,
            role,
            retry_count,
            started_at,
            recorded_at: Utc::now(),
            entry,
            content_hash: None,
        }
    }

    /// Compute the BLAKE3 hash of the record's content.
    /// The hash covers all fields except `content_hash` itself.
    pub fn compute_hash(&self) -> String {
        hash::compute_record_hash(self)
    }

    /// Set the content hash. Records must be sealed before they are stored.
    pub fn seal(mut self) -> Self {
        self.content_hash = Some(self.compute_hash());
        self
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }
}
