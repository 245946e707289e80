//! Deviation severity and escalation policy.

use wheelhouse_core::{Deviation, EngineConfig, Severity, Step};

const CRITICAL_KEYWORDS: &[&str] = &["critical", "crash", "data loss", "security"];
const MAJOR_KEYWORDS: &[&str] = &["error", "fail", "broken", "corrupt"];
const MODERATE_KEYWORDS: &[&str] = &["warn", "deprecat", "slow"];

/// Expected behavior recorded when a step declares no expected outcome.
pub const DEFAULT_EXPECTATION: &str = "Step completes without problems";

/// Classify a problem description by keyword, most severe match first.
pub fn classify_severity(problem: &str) -> Severity {
    let text = problem.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if contains_any(CRITICAL_KEYWORDS) {
        Severity::Critical
    } else if contains_any(MAJOR_KEYWORDS) {
        Severity::Major
    } else if contains_any(MODERATE_KEYWORDS) {
        Severity::Moderate
    } else {
        Severity::Minor
    }
}

/// One deviation per problem string attached to a step's logbook entry.
pub fn deviations_for_problems(step: &Step, problems: &[String]) -> Vec<Deviation> {
    let expected = step
        .expected_outcome
        .as_deref()
        .unwrap_or(DEFAULT_EXPECTATION);

    problems
        .iter()
        .map(|p| Deviation::new(Some(step.step_id), expected, p.clone(), classify_severity(p)))
        .collect()
}

pub fn should_escalate(deviation: &Deviation, config: &EngineConfig) -> bool {
    config.auto_escalate && deviation.severity == Severity::Critical
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_core::{AgentRole, StepPlan};

    #[test]
    fn keyword_classification() {
        assert_eq!(classify_severity("security vulnerability"), Severity::Critical);
        assert_eq!(classify_severity("Process CRASHED"), Severity::Critical);
        assert_eq!(classify_severity("possible data loss in cache"), Severity::Critical);
        assert_eq!(classify_severity("compile error in lib.rs"), Severity::Major);
        assert_eq!(classify_severity("tests failed"), Severity::Major);
        assert_eq!(classify_severity("index is corrupted"), Severity::Major);
        assert_eq!(classify_severity("Warning: unused import"), Severity::Moderate);
        assert_eq!(classify_severity("uses deprecated API"), Severity::Moderate);
        assert_eq!(classify_severity("build is slow"), Severity::Moderate);
        assert_eq!(classify_severity("typo in comment"), Severity::Minor);
    }

    #[test]
    fn critical_wins_over_lower_matches() {
        assert_eq!(classify_severity("error: security check failed"), Severity::Critical);
    }

    #[test]
    fn one_deviation_per_problem() {
        let step = wheelhouse_core::Step::from(
            StepPlan::new(4, "Patch", AgentRole::Coder).expecting("Patch applies cleanly"),
        );
        let problems = vec!["slow build".to_string(), "security hole".to_string()];
        let devs = deviations_for_problems(&step, &problems);

        assert_eq!(devs.len(), 2);
        assert_eq!(devs[0].step_id, Some(4));
        assert_eq!(devs[0].expected_behavior, "Patch applies cleanly");
        assert_eq!(devs[0].severity, Severity::Moderate);
        assert_eq!(devs[1].severity, Severity::Critical);
    }

    #[test]
    fn escalation_requires_critical_and_flag() {
        let critical = Deviation::new(None, "ok", "crash", Severity::Critical);
        let major = Deviation::new(None, "ok", "error", Severity::Major);
        let mut config = EngineConfig::default();

        assert!(should_escalate(&critical, &config));
        assert!(!should_escalate(&major, &config));

        config.auto_escalate = false;
        assert!(!should_escalate(&critical, &config));
    }
}
