//! Dependency-respecting step selection.
//!
//! The scheduler keeps no queue: every call rescans the mission, because a
//! step outcome can change which steps are runnable.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use wheelhouse_core::{Mission, Step, StepId, StepStatus};

/// First pending step, by ascending `step_id`, whose dependencies are all completed.
pub fn next_runnable_step(mission: &Mission) -> Option<&Step> {
    mission
        .steps_in_order()
        .into_iter()
        .find(|step| step.status == StepStatus::Pending && dependencies_met(mission, step))
}

/// Whether every dependency of `step` resolves to a completed step.
/// A dependency on an unknown step is never met.
pub fn dependencies_met(mission: &Mission, step: &Step) -> bool {
    step.dependencies.iter().all(|dep| {
        mission
            .step(*dep)
            .map(|d| d.status == StepStatus::Completed)
            .unwrap_or(false)
    })
}

/// Order in which pending steps would run if every one of them succeeded.
///
/// Steps that can never become runnable (e.g. behind a failed dependency)
/// are left out.
pub fn execution_order(mission: &Mission) -> Vec<StepId> {
    let mut simulated = mission.clone();
    let mut order = Vec::new();

    while let Some(step_id) = next_runnable_step(&simulated).map(|s| s.step_id) {
        order.push(step_id);
        if let Some(step) = simulated.step_mut(step_id) {
            step.status = StepStatus::Completed;
        }
    }

    order
}

/// Structural checks on a freshly parsed plan: unique ids, known
/// dependencies, no self-dependencies, no cycles.
pub fn validate_plan(mission: &Mission) -> Result<(), String> {
    let mut seen = HashSet::new();
    for step in &mission.steps {
        if !seen.insert(step.step_id) {
            return Err(format!("duplicate step id {}", step.step_id));
        }
    }

    for step in &mission.steps {
        for dep in &step.dependencies {
            if *dep == step.step_id {
                return Err(format!("step {} depends on itself", step.step_id));
            }
            if !seen.contains(dep) {
                return Err(format!(
                    "step {} depends on unknown step {}",
                    step.step_id, dep
                ));
            }
        }
    }

    // Kahn's algorithm over the dependency graph.
    let mut remaining: BTreeMap<StepId, BTreeSet<StepId>> = mission
        .steps
        .iter()
        .map(|s| (s.step_id, s.dependencies.clone()))
        .collect();

    loop {
        let ready: Vec<StepId> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in &ready {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &ready {
                deps.remove(id);
            }
        }
    }

    if let Some(id) = remaining.keys().next() {
        return Err(format!("dependency cycle involving step {id}"));
    }

    Ok(())
}
