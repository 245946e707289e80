//! wheelhouse-core: Mission model, events, configuration, and shared errors.
//!
//! This crate provides the foundational types used across all Wheelhouse components:
//! - Mission, Step and audit types (logbook entries, decisions, deviations)
//! - The context snapshot injected into every step execution
//! - Notification event types
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{EngineConfig, LogbookConfig};
pub use error::{ConfigError, ParseError};
pub use events::{EventPayload, MissionEvent};
pub use types::{
    AgentRole, ContextSnapshot, Decision, Deviation, EntryResult, LogbookEntry, Mission,
    MissionId, MissionStatus, Severity, Step, StepId, StepPlan, StepStatus, StepSummary,
};
