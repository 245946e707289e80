//! Step executor abstraction and role registry.
//!
//! Executors are black boxes to the engine: they receive a step and its
//! context snapshot and report what happened. Role dispatch is a lookup in
//! [`ExecutorRegistry`]; adding a role never touches the coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wheelhouse_core::{AgentRole, ContextSnapshot, Step};

/// What an executor reports back for one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Human-readable description of what was done.
    pub action: String,
    pub summary: String,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    /// Executor asks for a human to look at this attempt.
    #[serde(default)]
    pub needs_review: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(action: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            action: action.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn failed(action: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_problems(mut self, problems: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.problems.extend(problems.into_iter().map(Into::into));
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files_modified.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools_used.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn flag_for_review(mut self) -> Self {
        self.needs_review = true;
        self
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// No executor is registered for the step's role. Retrying cannot help.
    #[error("No executor registered for role '{0}'")]
    UnknownRole(AgentRole),

    #[error("Executor failed: {0}")]
    Failed(String),

    #[error("Executor panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutorError {
    /// Whether a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownRole(_))
    }
}

/// Performs the concrete work of a step (file edits, processes, model calls).
///
/// The engine imposes no timeout; long-running executors own that concern.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        context: &ContextSnapshot,
    ) -> Result<ExecutionOutcome, ExecutorError>;
}

/// Adapter turning a synchronous closure into a [`StepExecutor`].
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F> StepExecutor for FnExecutor<F>
where
    F: Fn(&Step, &ContextSnapshot) -> Result<ExecutionOutcome, ExecutorError> + Send + Sync,
{
    async fn execute(
        &self,
        step: &Step,
        context: &ContextSnapshot,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        (self.0)(step, context)
    }
}

/// Role -> executor map.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentRole, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a role.
    pub fn register(&mut self, role: AgentRole, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(role, executor);
    }

    pub fn with(mut self, role: AgentRole, executor: Arc<dyn StepExecutor>) -> Self {
        self.register(role, executor);
        self
    }

    pub fn get(&self, role: &AgentRole) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(role).cloned()
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self.executors.keys().cloned().collect();
        roles.sort();
        roles
    }

    /// Run the executor for the step's role on its own task so a panic
    /// surfaces as [`ExecutorError::Panicked`] instead of unwinding the engine.
    pub async fn dispatch(
        &self,
        step: &Step,
        context: &ContextSnapshot,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let executor = self
            .get(&step.assigned_role)
            .ok_or_else(|| ExecutorError::UnknownRole(step.assigned_role.clone()))?;

        let step = step.clone();
        let context = context.clone();
        let task = tokio::spawn(async move { executor.execute(&step, &context).await });

        match task.await {
            Ok(result) => result,
            Err(join) if join.is_panic() => {
                Err(ExecutorError::Panicked(panic_message(join.into_panic())))
            }
            Err(join) => Err(ExecutorError::Failed(join.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_core::{Mission, StepPlan};

    fn step_and_context(role: AgentRole) -> (Step, ContextSnapshot) {
        let mission = Mission::new("exec", vec![], vec![StepPlan::new(1, "do it", role)]);
        let step = mission.steps[0].clone();
        let ctx = crate::context::build_context(
            &mission,
            Some(&step),
            &[],
            &[],
            &wheelhouse_core::EngineConfig::default(),
        );
        (step, ctx)
    }

    #[tokio::test]
    async fn dispatches_by_role() {
        let registry = ExecutorRegistry::new().with(
            AgentRole::Coder,
            Arc::new(FnExecutor(|step: &Step, _ctx: &ContextSnapshot| {
                Ok(ExecutionOutcome::succeeded(
                    format!("coded {}", step.step_id),
                    "ok",
                ))
            })),
        );
        let (step, ctx) = step_and_context(AgentRole::Coder);

        let outcome = registry.dispatch(&step, &ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.action, "coded 1");
    }

    #[tokio::test]
    async fn unknown_role_fails_fast() {
        let registry = ExecutorRegistry::new();
        let (step, ctx) = step_and_context(AgentRole::Custom("pilot".to_string()));

        let err = registry.dispatch(&step, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecutorError::UnknownRole(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let registry = ExecutorRegistry::new().with(
            AgentRole::Executor,
            Arc::new(FnExecutor(
                |_step: &Step, _ctx: &ContextSnapshot| -> Result<ExecutionOutcome, ExecutorError> {
                    panic!("disk on fire")
                },
            )),
        );
        let (step, ctx) = step_and_context(AgentRole::Executor);

        let err = registry.dispatch(&step, &ctx).await.unwrap_err();
        match err {
            ExecutorError::Panicked(msg) => assert!(msg.contains("disk on fire")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
