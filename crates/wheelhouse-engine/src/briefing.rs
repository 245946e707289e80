//! Plain-text rendering of a context snapshot for a bounded-context agent.

use std::fmt::Write;

use wheelhouse_core::{ContextSnapshot, StepSummary};

/// Render the snapshot as the briefing block prepended to an agent prompt.
pub fn render_briefing(ctx: &ContextSnapshot) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "MISSION: {}", ctx.mission_title);
    if !ctx.objectives.is_empty() {
        let _ = writeln!(out, "OBJECTIVES:");
        for (i, objective) in ctx.objectives.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, objective);
        }
    }
    let _ = writeln!(
        out,
        "PROGRESS: {}% ({}/{} steps, {} failed, success rate {:.0}%)",
        ctx.progress,
        ctx.completed_count,
        ctx.total_steps,
        ctx.failed_count,
        ctx.success_rate * 100.0
    );

    section(&mut out, "COMPLETED", &ctx.completed_steps);

    match &ctx.current_step {
        Some(step) => {
            let _ = writeln!(out, "CURRENT STEP:");
            let _ = writeln!(out, "  {}", summary_line(step));
        }
        None => {
            let _ = writeln!(out, "CURRENT STEP: none");
        }
    }

    section(&mut out, "NEXT", &ctx.upcoming_steps);

    if !ctx.files_modified.is_empty() {
        let _ = writeln!(out, "FILES TOUCHED: {}", ctx.files_modified.join(", "));
    }

    if !ctx.recent_decisions.is_empty() {
        let _ = writeln!(out, "RECENT DECISIONS:");
        for d in &ctx.recent_decisions {
            let _ = writeln!(out, "  - {} -> {} ({})", d.decision, d.outcome, d.rationale);
        }
    }

    if !ctx.known_problems.is_empty() {
        let _ = writeln!(out, "KNOWN PROBLEMS:");
        for p in &ctx.known_problems {
            let _ = writeln!(out, "  - {p}");
        }
    }

    if !ctx.recent_deviations.is_empty() {
        let _ = writeln!(out, "RECENT DEVIATIONS:");
        for d in &ctx.recent_deviations {
            let _ = writeln!(
                out,
                "  - [{}] expected '{}', got '{}'",
                d.severity, d.expected_behavior, d.actual_behavior
            );
        }
    }

    out
}

fn section(out: &mut String, title: &str, steps: &[StepSummary]) {
    if steps.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for step in steps {
        let _ = writeln!(out, "  {}", summary_line(step));
    }
}

fn summary_line(step: &StepSummary) -> String {
    let mut line = format!(
        "#{} [{}] {} ({})",
        step.step_id, step.role, step.description, step.status
    );
    if let Some(action) = &step.last_action {
        let _ = write!(line, " -> {action}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;
    use wheelhouse_core::{AgentRole, EngineConfig, Mission, StepPlan};

    #[test]
    fn briefing_lists_mission_current_and_next() {
        let mission = Mission::new(
            "Port CLI",
            vec!["Same flags".to_string()],
            vec![
                StepPlan::new(1, "Survey flags", AgentRole::Router),
                StepPlan::new(2, "Port parser", AgentRole::Coder).depends_on([1]),
            ],
        );
        let current = mission.step(1).unwrap().clone();
        let ctx = build_context(&mission, Some(&current), &[], &[], &EngineConfig::default());

        let text = render_briefing(&ctx);
        assert!(text.starts_with("MISSION: Port CLI\n"));
        assert!(text.contains("  1. Same flags"));
        assert!(text.contains("PROGRESS: 0% (0/2 steps"));
        assert!(text.contains("CURRENT STEP:\n  #1 [router] Survey flags (pending)"));
        assert!(text.contains("NEXT:\n  #2 [coder] Port parser (pending)"));
        assert!(!text.contains("KNOWN PROBLEMS"));
    }
}
