//! Mission data model shared by the engine and the logbook.
//!
//! These types are passive: they carry mission state and expose derived
//! queries (progress, success rate) but never mutate themselves. All
//! mutation happens inside the engine's execution coordinator.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for a mission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MissionId(pub Uuid);

impl MissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Step identifier, unique within a mission. Defines the natural ordering.
pub type StepId = u32;

// ── Roles ─────────────────────────────────────────────────────────

/// The kind of agent a step is delegated to.
///
/// Unrecognized names are kept as `Custom` so new roles can be registered
/// with the engine without touching this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRole {
    Router,
    Coder,
    Reviewer,
    Executor,
    Narrator,
    Reflexion,
    Custom(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Router => "router",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Executor => "executor",
            Self::Narrator => "narrator",
            Self::Reflexion => "reflexion",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for AgentRole {
    fn from(s: String) -> Self {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "router" => Self::Router,
            "coder" => Self::Coder,
            "reviewer" => Self::Reviewer,
            "executor" => Self::Executor,
            "narrator" => Self::Narrator,
            "reflexion" => Self::Reflexion,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for AgentRole {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Statuses ──────────────────────────────────────────────────────

/// Lifecycle status of a mission.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Planning,
    Executing,
    Completed,
    Blocked,
    Failed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a single step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Completed, failed and skipped steps never run again without operator action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result recorded in a logbook entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryResult {
    Success,
    Partial,
    Failed,
}

/// Severity of a deviation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Steps ─────────────────────────────────────────────────────────

/// A step as declared by the order parser, before any execution state exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepPlan {
    pub step_id: StepId,
    pub description: String,
    pub assigned_role: AgentRole,
    #[serde(default)]
    pub dependencies: BTreeSet<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

impl StepPlan {
    pub fn new(step_id: StepId, description: impl Into<String>, role: impl Into<AgentRole>) -> Self {
        Self {
            step_id,
            description: description.into(),
            assigned_role: role.into(),
            dependencies: BTreeSet::new(),
            expected_outcome: None,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = StepId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    pub fn expecting(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = Some(outcome.into());
        self
    }
}

/// A unit of delegated work inside a mission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub step_id: StepId,
    pub description: String,
    pub assigned_role: AgentRole,
    /// Steps that must be `completed` before this one is runnable.
    pub dependencies: BTreeSet<StepId>,
    pub status: StepStatus,
    pub retry_count: u32,
    /// Append-only, chronological.
    pub logbook_entries: Vec<LogbookEntry>,
    pub expected_outcome: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl From<StepPlan> for Step {
    fn from(plan: StepPlan) -> Self {
        Self {
            step_id: plan.step_id,
            description: plan.description,
            assigned_role: plan.assigned_role,
            dependencies: plan.dependencies,
            status: StepStatus::Pending,
            retry_count: 0,
            logbook_entries: Vec::new(),
            expected_outcome: plan.expected_outcome,
            start_time: None,
            completion_time: None,
        }
    }
}

impl Step {
    /// The most recent logbook entry, if the step has been attempted.
    pub fn last_entry(&self) -> Option<&LogbookEntry> {
        self.logbook_entries.last()
    }

    /// Every problem logged against this step, in chronological order.
    pub fn problems(&self) -> impl Iterator<Item = &String> {
        self.logbook_entries.iter().flat_map(|e| e.problems.iter())
    }
}

// ── Mission ───────────────────────────────────────────────────────

/// One complete orchestrated objective composed of ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    pub objectives: Vec<String>,
    /// Declaration order. Never grows or shrinks after creation.
    pub steps: Vec<Step>,
    pub status: MissionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Mission {
    pub fn new(title: impl Into<String>, objectives: Vec<String>, steps: Vec<StepPlan>) -> Self {
        Self {
            id: MissionId::new(),
            title: title.into(),
            objectives,
            steps: steps.into_iter().map(Step::from).collect(),
            status: MissionStatus::Planning,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn step(&self, step_id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn step_mut(&mut self, step_id: StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    /// Steps sorted by ascending `step_id`.
    pub fn steps_in_order(&self) -> Vec<&Step> {
        let mut ordered: Vec<&Step> = self.steps.iter().collect();
        ordered.sort_by_key(|s| s.step_id);
        ordered
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Completed steps as a rounded percentage of all steps (0 for an empty mission).
    pub fn progress(&self) -> u32 {
        let total = self.total_steps();
        if total == 0 {
            return 0;
        }
        let pct = self.count(StepStatus::Completed) as f64 / total as f64 * 100.0;
        pct.round() as u32
    }

    /// `(completed - failed) / total`, clamped to `[0, 1]`; `1.0` for an empty mission.
    ///
    /// Steps that have not run yet count towards the total, so the rate
    /// starts low and climbs as the mission progresses.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_steps();
        if total == 0 {
            return 1.0;
        }
        let completed = self.count(StepStatus::Completed) as f64;
        let failed = self.count(StepStatus::Failed) as f64;
        ((completed - failed) / total as f64).clamp(0.0, 1.0)
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    pub fn has_failed_steps(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}

// ── Audit records ─────────────────────────────────────────────────

/// Immutable audit record appended on every execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogbookEntry {
    pub timestamp: DateTime<Utc>,
    /// Role that acted.
    pub officer: AgentRole,
    pub action: String,
    pub result: EntryResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    pub needs_review: bool,
    /// Frozen copy of the context the step was executed with.
    pub context_snapshot: ContextSnapshot,
}

/// A choice made during execution, kept for audit and future context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub step_id: Option<StepId>,
    pub made_by: AgentRole,
    /// What was decided.
    pub decision: String,
    /// Why.
    pub rationale: String,
    /// Resulting course, e.g. "continue" or "monitor closely".
    pub outcome: String,
}

impl Decision {
    pub fn new(
        step_id: Option<StepId>,
        made_by: AgentRole,
        decision: impl Into<String>,
        rationale: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            step_id,
            made_by,
            decision: decision.into(),
            rationale: rationale.into(),
            outcome: outcome.into(),
        }
    }
}

/// A mismatch between expected and actual behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deviation {
    pub timestamp: DateTime<Utc>,
    pub step_id: Option<StepId>,
    pub expected_behavior: String,
    pub actual_behavior: String,
    pub severity: Severity,
}

impl Deviation {
    pub fn new(
        step_id: Option<StepId>,
        expected_behavior: impl Into<String>,
        actual_behavior: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            step_id,
            expected_behavior: expected_behavior.into(),
            actual_behavior: actual_behavior.into(),
            severity,
        }
    }
}

// ── Context snapshot ──────────────────────────────────────────────

/// Compact view of a step inside a context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub step_id: StepId,
    pub description: String,
    pub role: AgentRole,
    pub status: StepStatus,
    pub retry_count: u32,
    /// Action of the latest logbook entry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        Self {
            step_id: step.step_id,
            description: step.description.clone(),
            role: step.assigned_role.clone(),
            status: step.status,
            retry_count: step.retry_count,
            last_action: step.last_entry().map(|e| e.action.clone()),
        }
    }
}

/// The full mission-state view rebuilt before every step execution.
///
/// Never held as mutable state; only stored as a frozen copy inside a
/// [`LogbookEntry`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    pub mission_id: MissionId,
    pub mission_title: String,
    pub objectives: Vec<String>,
    /// Rounded percentage of completed steps.
    pub progress: u32,
    pub total_steps: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub completed_steps: Vec<StepSummary>,
    pub current_step: Option<StepSummary>,
    pub upcoming_steps: Vec<StepSummary>,
    /// Sorted, de-duplicated union of files touched by completed steps.
    pub files_modified: Vec<String>,
    pub recent_decisions: Vec<Decision>,
    pub recent_deviations: Vec<Deviation>,
    pub known_problems: Vec<String>,
    pub success_rate: f64,
    pub built_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Content equality, ignoring when the snapshot was built.
    pub fn same_content(&self, other: &ContextSnapshot) -> bool {
        let mut aligned = other.clone();
        aligned.built_at = self.built_at;
        self == &aligned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission_with(statuses: &[StepStatus]) -> Mission {
        let plans = (1..=statuses.len() as u32)
            .map(|i| StepPlan::new(i, format!("step {i}"), AgentRole::Coder))
            .collect();
        let mut mission = Mission::new("test", vec![], plans);
        for (step, status) in mission.steps.iter_mut().zip(statuses) {
            step.status = *status;
        }
        mission
    }

    #[test]
    fn role_parsing_is_case_insensitive_and_keeps_custom_names() {
        assert_eq!(AgentRole::from("Coder"), AgentRole::Coder);
        assert_eq!(AgentRole::from(" reviewer "), AgentRole::Reviewer);
        assert_eq!(
            AgentRole::from("cartographer"),
            AgentRole::Custom("cartographer".to_string())
        );
    }

    #[test]
    fn custom_role_names_are_normalized() {
        assert_eq!(AgentRole::from(" Pilot "), AgentRole::Custom("pilot".to_string()));
        assert_eq!(AgentRole::from("PILOT"), AgentRole::from("pilot"));

        let decoded: AgentRole = serde_json::from_str("\"Pilot\"").unwrap();
        assert_eq!(decoded.as_str(), "pilot");
    }

    #[test]
    fn role_serializes_as_plain_string() {
        let json = serde_json::to_string(&AgentRole::Narrator).unwrap();
        assert_eq!(json, "\"narrator\"");
        let custom: AgentRole = serde_json::from_str("\"tester\"").unwrap();
        assert_eq!(custom.as_str(), "tester");
    }

    #[test]
    fn progress_rounds_and_handles_empty_mission() {
        assert_eq!(mission_with(&[]).progress(), 0);
        let m = mission_with(&[
            StepStatus::Completed,
            StepStatus::Pending,
            StepStatus::Pending,
        ]);
        assert_eq!(m.progress(), 33);
        let m = mission_with(&[StepStatus::Completed, StepStatus::Completed]);
        assert_eq!(m.progress(), 100);
    }

    #[test]
    fn success_rate_counts_unrun_steps_and_clamps() {
        assert_eq!(mission_with(&[]).success_rate(), 1.0);

        let m = mission_with(&[StepStatus::Completed, StepStatus::Pending]);
        assert!((m.success_rate() - 0.5).abs() < f64::EPSILON);

        let m = mission_with(&[StepStatus::Failed, StepStatus::Failed, StepStatus::Completed]);
        assert_eq!(m.success_rate(), 0.0);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::Major);
        assert!(Severity::Major > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Minor);
    }

    #[test]
    fn steps_in_order_sorts_by_id_without_touching_declaration_order() {
        let mission = Mission::new(
            "ordering",
            vec![],
            vec![
                StepPlan::new(3, "c", AgentRole::Coder),
                StepPlan::new(1, "a", AgentRole::Coder),
                StepPlan::new(2, "b", AgentRole::Coder),
            ],
        );
        let ids: Vec<_> = mission.steps_in_order().iter().map(|s| s.step_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(mission.steps[0].step_id, 3);
    }
}
