//! wheelhouse-engine: Mission orchestration for bounded-context AI agents.
//!
//! Decomposes a goal into dependent steps, hands each step to a
//! role-specific executor together with a compact context snapshot, records
//! every attempt in the logbook, and watches the mission for deviations.

pub mod autonomous;
pub mod briefing;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod notify;
pub mod parse;
pub mod policy;
pub mod record;
pub mod reflexion;
pub mod scheduler;

pub use engine::{MissionEngine, MissionStatusReport, StepReport, StepRun};
pub use error::{EngineError, Result};
pub use executor::{ExecutionOutcome, ExecutorError, ExecutorRegistry, FnExecutor, StepExecutor};
pub use notify::{ChannelNotifier, Notifier, TracingNotifier};
pub use parse::{JsonOrderParser, OrderParser, ParsedOrder};
