//! Safety-first plan fusion.
//!
//! The microprolog plan's safety-critical targets form the seed and are
//! always kept. Every other decision point takes the strongest fragment
//! offered by the alternatives (falling back to the microprolog target), and
//! weak fragments are shed until the fused plan's safety margin clears the
//! floor.

use std::collections::{HashMap, HashSet};

use crate::domain::{
    CrawlPlan, FusionResult, PlanOrigin, PlanTarget, PlanningContext, ScoredPlan,
};
use crate::obs;
use crate::risk::RiskScorer;
use crate::validator::{target_is_well_formed, ValidationResult};

/// Plan score assumed for alternatives nobody scored.
const UNSCORED_PLAN: f64 = 0.5;

/// Inputs to one fusion attempt.
#[derive(Debug, Clone, Copy)]
pub struct FusionRequest<'a> {
    pub microprolog_plan: &'a CrawlPlan,
    pub alternative_plans: &'a [CrawlPlan],
    pub alternative_scores: &'a [ScoredPlan],
    pub validator_result: &'a ValidationResult,
    pub context: &'a PlanningContext,
    /// Minimum safety margin (`1 - overall_risk`) the fused plan must keep.
    pub floor: f64,
}

/// Combines candidate plans. `None` means no viable combination exists.
pub trait Fuser: Send + Sync {
    fn fuse(&self, request: &FusionRequest<'_>) -> Option<FusionResult>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyFirstFusion {
    scorer: RiskScorer,
}

impl SafetyFirstFusion {
    pub fn new(scorer: RiskScorer) -> Self {
        Self { scorer }
    }
}

#[derive(Debug, Clone)]
struct Fragment {
    target: PlanTarget,
    weight: f64,
    /// Contributing alternative; `None` for microprolog targets.
    source: Option<String>,
    seed: bool,
}

impl Fuser for SafetyFirstFusion {
    fn fuse(&self, request: &FusionRequest<'_>) -> Option<FusionResult> {
        let micro = request.microprolog_plan;
        if !request.validator_result.valid || request.floor.is_nan() {
            obs::emit_fusion_evaluated(&micro.id, false, 0.0, request.floor);
            return None;
        }

        let plan_scores: HashMap<&str, f64> = request
            .alternative_scores
            .iter()
            .map(|s| (s.plan.id.as_str(), s.score.total_score))
            .collect();

        let mut fragments = collect_fragments(request, &plan_scores);
        let budget = match &request.validator_result.sanitized_blueprint {
            Some(blueprint) => micro.budget.clipped_to(&blueprint.budget),
            None => micro.budget,
        };

        loop {
            if fragments.is_empty() {
                obs::emit_fusion_evaluated(&micro.id, false, 0.0, request.floor);
                return None;
            }

            let mut plan = CrawlPlan::new(
                &format!("fused:{}", micro.id),
                &micro.domain,
                PlanOrigin::Microprolog,
                budget,
            );
            plan.targets = fragments.iter().map(|f| f.target.clone()).collect();
            plan.attributes = micro.attributes.clone();

            let metrics = self.scorer.score(&plan, &request.context.history);
            let safety = metrics.safety_margin();
            if safety >= request.floor {
                let contributors = contributors(&fragments);
                let mean_contribution = if contributors.is_empty() {
                    UNSCORED_PLAN
                } else {
                    contributors
                        .iter()
                        .map(|id| plan_scores.get(id.as_str()).copied().unwrap_or(UNSCORED_PLAN))
                        .sum::<f64>()
                        / contributors.len() as f64
                };
                plan.origin = PlanOrigin::Fused {
                    seed_id: micro.id.clone(),
                    contributors: contributors.clone(),
                };

                obs::emit_fusion_evaluated(&micro.id, true, safety, request.floor);
                let mut result = FusionResult::new(plan, 0.5 * safety + 0.5 * mean_contribution);
                result.seed_decision_points = fragments
                    .iter()
                    .filter(|f| f.seed)
                    .map(|f| f.target.decision_point.clone())
                    .collect();
                result.contributors = contributors;
                result.estimated_risk = metrics.overall_risk;
                return Some(result);
            }

            // Shed the weakest non-seed fragment; the latest wins ties.
            let weakest = fragments
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.seed)
                .fold(None::<(usize, f64)>, |best, (i, f)| match best {
                    Some((_, w)) if w < f.weight => best,
                    _ => Some((i, f.weight)),
                });
            match weakest {
                Some((index, _)) => {
                    fragments.remove(index);
                }
                None => {
                    obs::emit_fusion_evaluated(&micro.id, false, safety, request.floor);
                    return None;
                }
            }
        }
    }
}

/// Seed targets first, then one best fragment per remaining decision point.
fn collect_fragments(request: &FusionRequest<'_>, plan_scores: &HashMap<&str, f64>) -> Vec<Fragment> {
    let micro = request.microprolog_plan;
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for target in micro.targets.iter().filter(|t| target_is_well_formed(t)) {
        if slots.contains_key(&target.decision_point) {
            continue;
        }
        slots.insert(target.decision_point.clone(), fragments.len());
        fragments.push(Fragment {
            target: target.clone(),
            weight: UNSCORED_PLAN * target.priority,
            source: None,
            seed: target.safety_critical,
        });
    }

    for alternative in request.alternative_plans {
        let plan_score = plan_scores
            .get(alternative.id.as_str())
            .copied()
            .unwrap_or(UNSCORED_PLAN);
        for target in alternative.targets.iter().filter(|t| target_is_well_formed(t)) {
            let weight = plan_score * target.priority;
            let candidate = Fragment {
                target: PlanTarget {
                    safety_critical: false,
                    ..target.clone()
                },
                weight,
                source: Some(alternative.id.clone()),
                seed: false,
            };
            match slots.get(&target.decision_point) {
                Some(&index) => {
                    let current = &fragments[index];
                    let replace = !current.seed
                        && (current.source.is_none() || weight > current.weight);
                    if replace {
                        fragments[index] = candidate;
                    }
                }
                None => {
                    slots.insert(target.decision_point.clone(), fragments.len());
                    fragments.push(candidate);
                }
            }
        }
    }
    fragments
}

fn contributors(fragments: &[Fragment]) -> Vec<String> {
    let mut seen = HashSet::new();
    fragments
        .iter()
        .filter_map(|f| f.source.as_ref())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlBudget, PlanScore};
    use crate::risk::RiskMetrics;

    fn micro() -> CrawlPlan {
        CrawlPlan::new("micro", "example.com", PlanOrigin::Microprolog, CrawlBudget::default())
            .with_target(PlanTarget::new("seed:/robots", "^/robots\\.txt$", 0.9, 0.1).safety_critical())
            .with_target(PlanTarget::new("hub:/world", "^/world/", 0.3, 0.4))
    }

    fn alternative(id: &str, priority: f64) -> CrawlPlan {
        CrawlPlan::new(
            id,
            "example.com",
            PlanOrigin::Alternative {
                strategy: "graph".into(),
            },
            CrawlBudget::default(),
        )
        .with_target(PlanTarget::new("hub:/world", "^/world/.*", priority, 0.8))
        .with_target(PlanTarget::new("hub:/sport", "^/sport/", priority, 0.5))
    }

    fn valid() -> ValidationResult {
        ValidationResult::accepted(micro(), RiskMetrics::default())
    }

    #[test]
    fn test_keeps_seed_and_takes_best_alternative_fragment() {
        let alts = vec![alternative("alt-a", 0.5), alternative("alt-b", 0.9)];
        let scores = vec![
            ScoredPlan::new(alts[0].clone(), PlanScore::with_checks(0.9, 0.5, 0.5)),
            ScoredPlan::new(alts[1].clone(), PlanScore::with_checks(0.6, 0.5, 0.5)),
        ];
        let ctx = PlanningContext::for_domain("example.com");
        let validation = valid();
        let request = FusionRequest {
            microprolog_plan: &micro(),
            alternative_plans: &alts,
            alternative_scores: &scores,
            validator_result: &validation,
            context: &ctx,
            floor: 0.2,
        };
        let fused = SafetyFirstFusion::default().fuse(&request).unwrap();

        assert_eq!(fused.plan.id, "fused:micro");
        assert_eq!(fused.seed_decision_points, vec!["seed:/robots".to_string()]);
        // 0.6 * 0.9 beats 0.9 * 0.5 for both slots.
        assert_eq!(fused.contributors, vec!["alt-b".to_string()]);
        let world = fused.plan.target("hub:/world").unwrap();
        assert_eq!(world.url_pattern, "^/world/.*");
        assert!(fused.plan.target("hub:/sport").is_some());
        assert!(fused.estimated_risk <= 0.8);
        assert!(matches!(fused.plan.origin, PlanOrigin::Fused { .. }));
    }

    #[test]
    fn test_refuses_invalid_validation() {
        let ctx = PlanningContext::for_domain("example.com");
        let validation = ValidationResult::rejected(crate::validator::IssueCode::NoTargets, "empty");
        let request = FusionRequest {
            microprolog_plan: &micro(),
            alternative_plans: &[],
            alternative_scores: &[],
            validator_result: &validation,
            context: &ctx,
            floor: 0.2,
        };
        assert!(SafetyFirstFusion::default().fuse(&request).is_none());
    }

    #[test]
    fn test_unreachable_floor_returns_none() {
        let ctx = PlanningContext::for_domain("example.com");
        let validation = valid();
        let request = FusionRequest {
            microprolog_plan: &micro(),
            alternative_plans: &[],
            alternative_scores: &[],
            validator_result: &validation,
            context: &ctx,
            floor: 1.0,
        };
        assert!(SafetyFirstFusion::default().fuse(&request).is_none());
    }

    #[test]
    fn test_budget_clipped_to_blueprint() {
        let mut blueprint = micro();
        blueprint.budget.max_requests = 100;
        blueprint.budget.request_interval_ms = 2000;
        let validation = ValidationResult::accepted(blueprint, RiskMetrics::default());
        let ctx = PlanningContext::for_domain("example.com");
        let request = FusionRequest {
            microprolog_plan: &micro(),
            alternative_plans: &[],
            alternative_scores: &[],
            validator_result: &validation,
            context: &ctx,
            floor: 0.2,
        };
        let fused = SafetyFirstFusion::default().fuse(&request).unwrap();
        assert_eq!(fused.plan.budget.max_requests, 100);
        assert_eq!(fused.plan.budget.request_interval_ms, 2000);
        assert!(fused.contributors.is_empty());
    }
}
