//! Error types for the wheelhouse-engine crate.
//!
//! Step-level failures never surface here: they are recovered inside the
//! coordinator (retried or terminalized). Only structural misuse does.

use thiserror::Error;

use wheelhouse_core::{ParseError, StepId, StepStatus};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No active mission")]
    NoActiveMission,

    #[error("Invalid mission: {0}")]
    InvalidMission(String),

    #[error("Step not found: {step_id}")]
    StepNotFound { step_id: StepId },

    #[error("Cannot {action} step {step_id} while it is {status}")]
    InvalidTransition {
        step_id: StepId,
        status: StepStatus,
        action: &'static str,
    },

    #[error("A step execution is already in progress")]
    ExecutionInProgress,

    /// The runtime shut down while a step attempt was running.
    #[error("Step execution aborted: {0}")]
    ExecutionAborted(String),

    #[error("Order parse error: {0}")]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
