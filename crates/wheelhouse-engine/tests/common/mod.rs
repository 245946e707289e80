#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use wheelhouse_core::{
    AgentRole, ContextSnapshot, EngineConfig, MissionEvent, MissionStatus, Step, StepId,
};
use wheelhouse_engine::{
    ExecutionOutcome, ExecutorError, ExecutorRegistry, MissionEngine, Notifier, StepExecutor,
};
use wheelhouse_logbook::MemoryLogbook;

/// Notifier that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<MissionEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<MissionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, event: MissionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Plays back queued results per step; steps without a script succeed.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<StepId, VecDeque<Result<ExecutionOutcome, String>>>>,
    always_fail: Mutex<Vec<StepId>>,
    calls: Mutex<Vec<StepId>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(&self, step_id: StepId, result: Result<ExecutionOutcome, String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(step_id)
            .or_default()
            .push_back(result);
    }

    pub fn fail_always(&self, step_id: StepId) {
        self.always_fail.lock().unwrap().push(step_id);
    }

    pub fn calls(&self) -> Vec<StepId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, step_id: StepId) -> usize {
        self.calls().iter().filter(|id| **id == step_id).count()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        step: &Step,
        _context: &ContextSnapshot,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(step.step_id);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&step.step_id)
            .and_then(|queue| queue.pop_front());
        let fails = self.always_fail.lock().unwrap().contains(&step.step_id);

        self.running.fetch_sub(1, Ordering::SeqCst);

        match scripted {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(ExecutorError::Failed(message)),
            None if fails => Ok(ExecutionOutcome::failed(
                format!("Attempt step {}", step.step_id),
                "did not work",
            )
            .with_problems(["tests failed"])),
            None => Ok(ExecutionOutcome::succeeded(
                format!("Did step {}", step.step_id),
                step.description.clone(),
            )
            .with_files([format!("src/step_{}.rs", step.step_id)])),
        }
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        autonomous_interval_ms: 10,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: Arc<MissionEngine>,
    pub executor: Arc<ScriptedExecutor>,
    pub notifier: Arc<RecordingNotifier>,
    pub logbook: Arc<MemoryLogbook>,
}

pub fn harness(config: EngineConfig, executor: ScriptedExecutor) -> Harness {
    let executor = Arc::new(executor);
    let notifier = Arc::new(RecordingNotifier::default());
    let logbook = Arc::new(MemoryLogbook::new());

    let mut registry = ExecutorRegistry::new();
    for role in [
        AgentRole::Router,
        AgentRole::Coder,
        AgentRole::Reviewer,
        AgentRole::Executor,
        AgentRole::Narrator,
    ] {
        registry.register(role, executor.clone());
    }

    let engine = MissionEngine::new(config, registry)
        .with_logbook(logbook.clone())
        .with_notifier(notifier.clone());

    Harness {
        engine: Arc::new(engine),
        executor,
        notifier,
        logbook,
    }
}

const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Poll `check` until it holds or the wait limit passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Wait until the current mission reaches `status`.
pub async fn wait_for_status(engine: &MissionEngine, status: MissionStatus) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if engine.mission().await.map(|m| m.status) == Some(status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
