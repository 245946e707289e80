//! Logbook storage: trait plus file-backed and in-memory implementations.
//!
//! The file logbook keeps one JSON document per mission and one JSON file
//! per execution record:
//! ```text
//! {root}/
//!   missions/
//!     {mission_id}.json
//!   executions/
//!     {mission_id}/
//!       {recorded_at}_{record_id}.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wheelhouse_core::{Mission, MissionId, MissionStatus};

use crate::{ExecutionRecord, RecordId};

/// Errors that can occur during logbook operations.
#[derive(Debug, thiserror::Error)]
pub enum LogbookError {
    #[error("Mission not found in logbook: {0}")]
    MissionNotFound(MissionId),

    #[error("Integrity check failed for execution record {0}: stored hash does not match content")]
    IntegrityViolation(RecordId),

    #[error("Execution record {0} has no content hash (not sealed)")]
    NotSealed(RecordId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A mission as it was handed to the logbook, plus status bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissionRecord {
    pub mission: Mission,
    pub updated_at: DateTime<Utc>,
}

/// Durable persistence for missions and their execution history.
///
/// Callers treat every method as best-effort: a failure is logged and the
/// orchestration carries on.
pub trait Logbook: Send + Sync {
    /// Store (or overwrite) a mission.
    fn save_mission(&self, mission: &Mission) -> Result<(), LogbookError>;

    /// Update the stored status of a previously saved mission.
    fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), LogbookError>;

    /// Append a sealed execution record. Unsealed records are rejected.
    fn save_step_execution(&self, record: &ExecutionRecord) -> Result<(), LogbookError>;

    /// Retrieve a stored mission.
    fn load_mission(&self, id: MissionId) -> Result<MissionRecord, LogbookError>;

    /// All execution records of a mission, oldest first, integrity-checked.
    fn list_executions(&self, mission_id: MissionId) -> Result<Vec<ExecutionRecord>, LogbookError>;
}

// ── File-backed logbook ───────────────────────────────────────────

/// File-system backed logbook.
pub struct FileLogbook {
    root: PathBuf,
}

impl FileLogbook {
    /// Create a new logbook rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LogbookError> {
        let root = root.into();
        fs::create_dir_all(root.join("missions"))?;
        fs::create_dir_all(root.join("executions"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn mission_path(&self, id: MissionId) -> PathBuf {
        self.root.join("missions").join(format!("{}.json", id.0))
    }

    fn executions_dir(&self, mission_id: MissionId) -> PathBuf {
        self.root.join("executions").join(mission_id.0.to_string())
    }

    /// Timestamp prefix keeps directory listings in chronological order.
    fn record_path(&self, record: &ExecutionRecord) -> PathBuf {
        let stamp = record.recorded_at.format("%Y%m%dT%H%M%S%.9fZ");
        self.executions_dir(record.mission_id)
            .join(format!("{}_{}.json", stamp, record.id.0))
    }

    fn write_mission(&self, record: &MissionRecord) -> Result<(), LogbookError> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(self.mission_path(record.mission.id), json)?;
        Ok(())
    }
}

impl Logbook for FileLogbook {
    fn save_mission(&self, mission: &Mission) -> Result<(), LogbookError> {
        let record = MissionRecord {
            mission: mission.clone(),
            updated_at: Utc::now(),
        };
        self.write_mission(&record)?;

        tracing::debug!(mission_id = %mission.id, "Mission saved to logbook");
        Ok(())
    }

    fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), LogbookError> {
        let mut record = self.load_mission(id)?;
        record.mission.status = status;
        if completed_at.is_some() {
            record.mission.completed_at = completed_at;
        }
        record.updated_at = Utc::now();
        self.write_mission(&record)?;

        tracing::debug!(mission_id = %id, status = %status, "Mission status updated in logbook");
        Ok(())
    }

    fn save_step_execution(&self, record: &ExecutionRecord) -> Result<(), LogbookError> {
        if record.content_hash.is_none() {
            return Err(LogbookError::NotSealed(record.id));
        }

        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;

        tracing::debug!(
            record_id = %record.id,
            step_id = record.step_id,
            path = %path.display(),
            "Execution record saved"
        );

        Ok(())
    }

    fn load_mission(&self, id: MissionId) -> Result<MissionRecord, LogbookError> {
        let path = self.mission_path(id);
        if !path.is_file() {
            return Err(LogbookError::MissionNotFound(id));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list_executions(&self, mission_id: MissionId) -> Result<Vec<ExecutionRecord>, LogbookError> {
        let dir = self.executions_dir(mission_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path)?;
            let record: ExecutionRecord = serde_json::from_str(&json)?;
            if !record.verify_integrity() {
                return Err(LogbookError::IntegrityViolation(record.id));
            }
            records.push(record);
        }

        // Directory order is arbitrary; break timestamp ties deterministically.
        records.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.retry_count.cmp(&b.retry_count))
                .then(a.step_id.cmp(&b.step_id))
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(records)
    }
}

// ── In-memory logbook ─────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    missions: Vec<MissionRecord>,
    executions: Vec<ExecutionRecord>,
}

/// Logbook held in process memory. Useful for tests and embedding hosts
/// that persist elsewhere.
#[derive(Default)]
pub struct MemoryLogbook {
    state: Mutex<MemoryState>,
}

impl MemoryLogbook {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Number of execution records across all missions.
    pub fn execution_count(&self) -> usize {
        self.with_state(|s| s.executions.len())
    }
}

impl Logbook for MemoryLogbook {
    fn save_mission(&self, mission: &Mission) -> Result<(), LogbookError> {
        let record = MissionRecord {
            mission: mission.clone(),
            updated_at: Utc::now(),
        };
        self.with_state(|s| {
            s.missions.retain(|m| m.mission.id != mission.id);
            s.missions.push(record);
        });
        Ok(())
    }

    fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), LogbookError> {
        self.with_state(|s| {
            let record = s
                .missions
                .iter_mut()
                .find(|m| m.mission.id == id)
                .ok_or(LogbookError::MissionNotFound(id))?;
            record.mission.status = status;
            if completed_at.is_some() {
                record.mission.completed_at = completed_at;
            }
            record.updated_at = Utc::now();
            Ok(())
        })
    }

    fn save_step_execution(&self, record: &ExecutionRecord) -> Result<(), LogbookError> {
        if record.content_hash.is_none() {
            return Err(LogbookError::NotSealed(record.id));
        }
        self.with_state(|s| s.executions.push(record.clone()));
        Ok(())
    }

    fn load_mission(&self, id: MissionId) -> Result<MissionRecord, LogbookError> {
        self.with_state(|s| {
            s.missions
                .iter()
                .find(|m| m.mission.id == id)
                .cloned()
                .ok_or(LogbookError::MissionNotFound(id))
        })
    }

    fn list_executions(&self, mission_id: MissionId) -> Result<Vec<ExecutionRecord>, LogbookError> {
        let records = self.with_state(|s| {
            s.executions
                .iter()
                .filter(|r| r.mission_id == mission_id)
                .cloned()
                .collect::<Vec<_>>()
        });
        if let Some(bad) = records.iter().find(|r| !r.verify_integrity()) {
            return Err(LogbookError::IntegrityViolation(bad.id));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_core::{
        AgentRole, ContextSnapshot, EntryResult, LogbookEntry, StepPlan,
    };

    fn test_mission() -> Mission {
        Mission::new(
            "Refactor parser",
            vec!["Keep behavior".to_string()],
            vec![
                StepPlan::new(1, "Read parser", AgentRole::Router),
                StepPlan::new(2, "Rewrite parser", AgentRole::Coder).depends_on([1]),
            ],
        )
    }

    fn test_snapshot(mission: &Mission) -> ContextSnapshot {
        ContextSnapshot {
            mission_id: mission.id,
            mission_title: mission.title.clone(),
            objectives: mission.objectives.clone(),
            progress: 0,
            total_steps: mission.total_steps(),
            completed_count: 0,
            failed_count: 0,
            completed_steps: vec![],
            current_step: None,
            upcoming_steps: vec![],
            files_modified: vec![],
            recent_decisions: vec![],
            recent_deviations: vec![],
            known_problems: vec![],
            success_rate: 0.0,
            built_at: Utc::now(),
        }
    }

    fn test_record(mission: &Mission, step_id: u32, action: &str) -> ExecutionRecord {
        let entry = LogbookEntry {
            timestamp: Utc::now(),
            officer: AgentRole::Coder,
            action: action.to_string(),
            result: EntryResult::Success,
            summary: Some("done".to_string()),
            problems: vec![],
            files_modified: vec!["src/parser.rs".to_string()],
            tools_used: vec!["write_file".to_string()],
            needs_review: false,
            context_snapshot: test_snapshot(mission),
        };
        ExecutionRecord::new(mission.id, step_id, AgentRole::Coder, 0, Some(Utc::now()), entry)
            .seal()
    }

    #[test]
    fn save_and_list_executions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = FileLogbook::new(dir.path()).unwrap();
        let mission = test_mission();
        logbook.save_mission(&mission).unwrap();

        let first = test_record(&mission, 1, "read");
        let mut second = test_record(&mission, 2, "write");
        second.recorded_at = first.recorded_at + chrono::Duration::seconds(1);
        let second = second.seal();
        logbook.save_step_execution(&second).unwrap();
        logbook.save_step_execution(&first).unwrap();

        let records = logbook.list_executions(mission.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entry.action, "read");
        assert_eq!(records[1].entry.action, "write");
        assert!(records.iter().all(|r| r.verify_integrity()));
    }

    #[test]
    fn same_instant_retries_list_in_attempt_order() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = FileLogbook::new(dir.path()).unwrap();
        let mission = test_mission();
        logbook.save_mission(&mission).unwrap();

        let first = test_record(&mission, 1, "attempt");
        let mut retry = test_record(&mission, 1, "retry");
        retry.recorded_at = first.recorded_at;
        retry.retry_count = 1;
        let retry = retry.seal();
        logbook.save_step_execution(&retry).unwrap();
        logbook.save_step_execution(&first).unwrap();

        for _ in 0..3 {
            let records = logbook.list_executions(mission.id).unwrap();
            let actions: Vec<_> = records.iter().map(|r| r.entry.action.as_str()).collect();
            assert_eq!(actions, vec!["attempt", "retry"]);
        }
    }

    #[test]
    fn integrity_violation_detected() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = FileLogbook::new(dir.path()).unwrap();
        let mission = test_mission();
        let record = test_record(&mission, 1, "read");
        logbook.save_step_execution(&record).unwrap();

        // Tamper with the file: change the action
        let path = logbook.record_path(&record);
        let mut tampered: ExecutionRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        tampered.entry.action = "TAMPERED".to_string();
        fs::write(&path, serde_json::to_string_pretty(&tampered).unwrap()).unwrap();

        let result = logbook.list_executions(mission.id);
        assert!(matches!(result, Err(LogbookError::IntegrityViolation(_))));
    }

    #[test]
    fn save_rejects_unsealed() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = FileLogbook::new(dir.path()).unwrap();
        let mission = test_mission();
        let mut record = test_record(&mission, 1, "read");
        record.content_hash = None;

        let result = logbook.save_step_execution(&record);
        assert!(matches!(result, Err(LogbookError::NotSealed(_))));
    }

    #[test]
    fn mission_status_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let logbook = FileLogbook::new(dir.path()).unwrap();
        let mission = test_mission();
        logbook.save_mission(&mission).unwrap();

        let done = Utc::now();
        logbook
            .update_mission_status(mission.id, MissionStatus::Completed, Some(done))
            .unwrap();

        let stored = logbook.load_mission(mission.id).unwrap();
        assert_eq!(stored.mission.status, MissionStatus::Completed);
        assert_eq!(stored.mission.completed_at, Some(done));
    }

    #[test]
    fn unknown_mission_status_update_fails() {
        let logbook = MemoryLogbook::new();
        let result = logbook.update_mission_status(MissionId::new(), MissionStatus::Failed, None);
        assert!(matches!(result, Err(LogbookError::MissionNotFound(_))));
    }

    #[test]
    fn memory_logbook_filters_by_mission() {
        let logbook = MemoryLogbook::new();
        let a = test_mission();
        let b = test_mission();
        logbook.save_step_execution(&test_record(&a, 1, "a1")).unwrap();
        logbook.save_step_execution(&test_record(&b, 1, "b1")).unwrap();
        logbook.save_step_execution(&test_record(&a, 2, "a2")).unwrap();

        let records = logbook.list_executions(a.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(logbook.execution_count(), 3);
    }
}
