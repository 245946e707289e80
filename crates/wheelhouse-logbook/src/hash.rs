//! Content hashing for execution records.
//!
//! The hash covers every field except `content_hash`, so editing a stored
//! record on disk (or in memory) breaks verification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use wheelhouse_core::{AgentRole, LogbookEntry, MissionId, StepId};

use crate::{ExecutionRecord, RecordId};

/// Borrowed view of the hashed fields. Field order fixes the byte layout.
#[derive(Serialize)]
struct SealedFields<'a> {
    id: &'a RecordId,
    mission_id: &'a MissionId,
    step_id: StepId,
    role: &'a AgentRole,
    retry_count: u32,
    started_at: &'a Option<DateTime<Utc>>,
    recorded_at: &'a DateTime<Utc>,
    entry: &'a LogbookEntry,
}

/// Hex-encoded BLAKE3 digest of the record's JSON encoding.
pub fn compute_record_hash(record: &ExecutionRecord) -> String {
    let fields = SealedFields {
        id: &record.id,
        mission_id: &record.mission_id,
        step_id: record.step_id,
        role: &record.role,
        retry_count: record.retry_count,
        started_at: &record.started_at,
        recorded_at: &record.recorded_at,
        entry: &record.entry,
    };

    let mut hasher = blake3::Hasher::new();
    // Plain structs with string keys: encoding cannot fail.
    serde_json::to_writer(&mut hasher, &fields).expect("execution record encodes to JSON");
    hasher.finalize().to_hex().to_string()
}
