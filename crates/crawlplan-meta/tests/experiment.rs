//! Experiment runs: threshold arms replayed over recorded arbitrations.

use std::sync::Arc;

use crawlplan_meta::fakes::FixedFuser;
use crawlplan_meta::{
    ArbitrationCase, ArbitrationThresholds, CrawlBudget, CrawlPlan, Experiment, ExperimentArm,
    ExperimentManager, MetaPlanError, OutcomeKind, PlanOrigin, PlanScore, PlanTarget,
    PlanningContext, RiskMetrics, ScoredPlan, ValidationResult,
};

fn plan(id: &str, origin: PlanOrigin) -> CrawlPlan {
    CrawlPlan::new(id, "example.com", origin, CrawlBudget::default())
        .with_target(PlanTarget::new("hub:/", "^/$", 0.5, 0.5))
}

fn alternative(id: &str) -> CrawlPlan {
    plan(
        id,
        PlanOrigin::Alternative {
            strategy: "topic".into(),
        },
    )
}

fn case(label: &str, with_micro: bool) -> ArbitrationCase {
    let alt = alternative("A");
    ArbitrationCase {
        label: label.into(),
        microprolog_plan: with_micro.then(|| plan("micro", PlanOrigin::Microprolog)),
        alternative_plans: vec![alt.clone()],
        micro_score: with_micro
            .then(|| PlanScore::with_checks(0.75, 0.65, 0.62).with_confidence(0.7)),
        alt_scores: vec![ScoredPlan::new(
            alt.clone(),
            PlanScore::with_checks(0.8, 0.7, 0.7),
        )],
        validator_result: ValidationResult::accepted(alt, RiskMetrics::default()),
        context: PlanningContext::for_domain("example.com"),
    }
}

fn experiment() -> Experiment {
    Experiment::new(
        "strict-accept",
        ExperimentArm::new("control", ArbitrationThresholds::default()),
        vec![ExperimentArm::new(
            "strict",
            ArbitrationThresholds::default().with_accept_score(0.9),
        )],
    )
}

#[test]
fn test_variant_divergence_is_reported() {
    let manager = ExperimentManager::new(Arc::new(FixedFuser::unavailable()));
    let id = manager.register(experiment()).unwrap();
    let cases = vec![case("micro-strong", true), case("no-micro", false)];

    let report = manager.run(id, &cases).unwrap();
    assert_eq!(report.arms.len(), 2);

    let control = report.arm("control").unwrap();
    assert_eq!(control.cases, 2);
    assert_eq!(control.agreement_with_control, 1.0);
    assert_eq!(control.outcomes.get(&OutcomeKind::AcceptMicroprolog), Some(&1));
    assert_eq!(control.outcomes.get(&OutcomeKind::AcceptAlternative), Some(&1));

    let strict = report.arm("strict").unwrap();
    assert_eq!(strict.outcomes.get(&OutcomeKind::AcceptAlternative), Some(&2));
    assert_eq!(strict.divergent_cases, vec!["micro-strong".to_string()]);
    assert!((strict.agreement_with_control - 0.5).abs() < 1e-12);

    assert_eq!(manager.recent_reports(5).len(), 1);
}

#[test]
fn test_empty_case_list_agrees_with_control() {
    let manager = ExperimentManager::default();
    let id = manager.register(experiment()).unwrap();
    let report = manager.run(id, &[]).unwrap();
    for arm in &report.arms {
        assert_eq!(arm.cases, 0);
        assert_eq!(arm.agreement_with_control, 1.0);
    }
}

#[test]
fn test_arm_assignment_is_sticky() {
    let manager = ExperimentManager::default();
    let id = manager.register(experiment()).unwrap();

    let first = manager.assign_arm(id, "news.example.org").unwrap();
    for _ in 0..10 {
        assert_eq!(manager.assign_arm(id, "news.example.org").unwrap(), first);
    }
    assert_eq!(manager.assign_arm(id, " NEWS.example.org ").unwrap(), first);

    let arms: std::collections::HashSet<String> = (0..64)
        .map(|i| manager.assign_arm(id, &format!("site-{i}.example")).unwrap().name)
        .collect();
    assert_eq!(arms.len(), 2);
}

#[test]
fn test_unknown_and_invalid_experiments() {
    let manager = ExperimentManager::default();
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        manager.run(missing, &[]),
        Err(MetaPlanError::ExperimentNotFound(id)) if id == missing
    ));

    let duplicate_arms = Experiment::new(
        "dup",
        ExperimentArm::new("control", ArbitrationThresholds::default()),
        vec![ExperimentArm::new("control", ArbitrationThresholds::default())],
    );
    assert!(matches!(
        manager.register(duplicate_arms),
        Err(MetaPlanError::InvalidConfig(_))
    ));

    manager.register(experiment()).unwrap();
    assert!(matches!(
        manager.register(experiment()),
        Err(MetaPlanError::DuplicateExperiment(_))
    ));
}
