//! Safety-first fusion tests against realistic candidate sets.

use crawlplan_meta::{
    CrawlBudget, CrawlPlan, DomainHistory, FusionRequest, Fuser, PlanOrigin, PlanScore,
    PlanTarget, PlanningContext, RiskScorer, SafetyFirstFusion, ScoredPlan, Validator,
    SafetyPlanValidator,
};

fn blueprint() -> CrawlPlan {
    CrawlPlan::new("bp", "example.com", PlanOrigin::Blueprint, CrawlBudget::default())
        .with_target(PlanTarget::new("hub:/world", "^/world/", 0.7, 0.5))
}

fn microprolog(targets: usize) -> CrawlPlan {
    let mut plan = CrawlPlan::new(
        "micro",
        "example.com",
        PlanOrigin::Microprolog,
        CrawlBudget {
            max_requests: 1500,
            max_concurrency: 6,
            max_depth: 5,
            request_interval_ms: 250,
        },
    )
    .with_target(PlanTarget::new("seed:/sitemap", "^/sitemap\\.xml$", 1.0, 0.2).safety_critical());
    for i in 0..targets {
        plan = plan.with_target(PlanTarget::new(
            &format!("section:{i}"),
            &format!("^/s{i}/"),
            0.1 + (i % 5) as f64 * 0.1,
            0.5,
        ));
    }
    plan
}

fn alternative(id: &str) -> CrawlPlan {
    CrawlPlan::new(
        id,
        "example.com",
        PlanOrigin::Alternative {
            strategy: "topic".into(),
        },
        CrawlBudget::default(),
    )
    .with_target(PlanTarget::new("section:0", "^/s0/.*$", 0.9, 0.9))
    .with_target(PlanTarget::new("seed:/sitemap", "^/.*$", 1.0, 1.0))
}

#[test]
fn test_seed_cannot_be_overridden_by_alternatives() {
    let ctx = PlanningContext::for_domain("example.com");
    let validation = SafetyPlanValidator::default().validate(&blueprint(), &ctx);
    assert!(validation.valid);

    let alts = vec![alternative("alt-topic")];
    let scores = vec![ScoredPlan::new(alts[0].clone(), PlanScore::with_checks(0.95, 0.5, 0.5))];
    let micro = microprolog(3);
    let fused = SafetyFirstFusion::default()
        .fuse(&FusionRequest {
            microprolog_plan: &micro,
            alternative_plans: &alts,
            alternative_scores: &scores,
            validator_result: &validation,
            context: &ctx,
            floor: 0.2,
        })
        .expect("fusion");

    let seed = fused.plan.target("seed:/sitemap").unwrap();
    assert_eq!(seed.url_pattern, "^/sitemap\\.xml$");
    assert!(seed.safety_critical);
    assert_eq!(fused.plan.target("section:0").unwrap().url_pattern, "^/s0/.*$");
    assert_eq!(fused.contributors, vec!["alt-topic".to_string()]);
    // Micro budget clipped by the sanitized blueprint.
    assert_eq!(fused.plan.budget, micro.budget.clipped_to(&blueprint().budget));
}

#[test]
fn test_floor_sheds_weak_fragments() {
    // A poor error history pushes risk up so only a smaller plan clears.
    let history = DomainHistory {
        runs: 10,
        error_rate: Some(0.5),
        ..Default::default()
    };
    let ctx = PlanningContext::for_domain("example.com").with_history(history.clone());
    let validation = SafetyPlanValidator::default().validate(&blueprint(), &ctx);
    assert!(validation.valid);

    let micro = microprolog(150);
    let request = FusionRequest {
        microprolog_plan: &micro,
        alternative_plans: &[],
        alternative_scores: &[],
        validator_result: &validation,
        context: &ctx,
        floor: 0.72,
    };
    let fused = SafetyFirstFusion::default().fuse(&request).expect("fusion");

    assert!(fused.plan.targets.len() < 151);
    assert!(fused.plan.target("seed:/sitemap").is_some());
    let risk = RiskScorer::default().score(&fused.plan, &history);
    assert!(1.0 - risk.overall_risk >= 0.72);
    assert!((risk.overall_risk - fused.estimated_risk).abs() < 1e-12);

    // An unreachable floor yields no plan at all.
    let strict = FusionRequest {
        floor: 0.99,
        ..request
    };
    assert!(SafetyFirstFusion::default().fuse(&strict).is_none());
}
