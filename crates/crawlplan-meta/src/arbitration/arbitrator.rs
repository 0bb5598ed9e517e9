//! Ordered, threshold-driven arbitration.
//!
//! Branches are evaluated in a fixed order and the first match wins:
//!
//! 1. validator rejected the blueprint: `replan`
//! 2. no microprolog plan: `accept_alternative`
//! 3. microprolog plan without a score: `seek_human_confirmation`
//! 4. microprolog clears every threshold: `accept_microprolog`
//! 5. best alternative clears `accept_score`: `accept_alternative`
//! 6. microprolog near the bar or confidence too low: try fusion, `fuse`
//! 7. fallback: `accept_alternative`
//!
//! Every exit is audited through the [`DecisionLogger`]; logger failures are
//! warned about and never change the decision.

use std::sync::Arc;

use crate::decision_log::{DecisionLogEntry, DecisionLogger, NoopDecisionLogger};
use crate::domain::score::clamp_unit;
use crate::domain::{
    CrawlPlan, Decision, FusionResult, OutcomeKind, PlanScore, PlanningContext, RationaleTag,
    ScoredPlan,
};
use crate::fusion::{FusionRequest, Fuser, SafetyFirstFusion};
use crate::metrics::METRICS;
use crate::obs;
use crate::validator::ValidationResult;

use super::thresholds::ArbitrationThresholds;

/// Confidence assumed when an accepted score carries none.
const DEFAULT_ACCEPT_CONFIDENCE: f64 = 0.6;
/// Confidence assumed when a fusion result carries none.
const DEFAULT_FUSION_CONFIDENCE: f64 = 0.55;
/// Confidence floor of the fallback branch.
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Everything one arbitration reads.
#[derive(Debug, Clone, Copy)]
pub struct ArbitrationInput<'a> {
    pub microprolog_plan: Option<&'a CrawlPlan>,
    pub alternative_plans: &'a [CrawlPlan],
    pub micro_score: Option<&'a PlanScore>,
    pub alt_scores: &'a [ScoredPlan],
    pub validator_result: &'a ValidationResult,
    pub context: &'a PlanningContext,
}

/// Picks the plan that runs.
pub trait Arbiter: Send + Sync {
    fn decide(&self, input: &ArbitrationInput<'_>) -> Decision;
}

pub struct PlanArbitrator {
    thresholds: ArbitrationThresholds,
    fusion: Arc<dyn Fuser>,
    logger: Arc<dyn DecisionLogger>,
}

impl Default for PlanArbitrator {
    fn default() -> Self {
        Self::new(
            ArbitrationThresholds::default(),
            Arc::new(SafetyFirstFusion::default()),
            Arc::new(NoopDecisionLogger),
        )
    }
}

impl std::fmt::Debug for PlanArbitrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanArbitrator")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl PlanArbitrator {
    pub fn new(
        thresholds: ArbitrationThresholds,
        fusion: Arc<dyn Fuser>,
        logger: Arc<dyn DecisionLogger>,
    ) -> Self {
        Self {
            thresholds,
            fusion,
            logger,
        }
    }

    pub fn thresholds(&self) -> &ArbitrationThresholds {
        &self.thresholds
    }

    fn micro_passes(&self, score: &PlanScore) -> bool {
        let t = &self.thresholds;
        score.total_score >= t.accept_score
            && score.metrics.explainability >= t.explainability
            && score.metrics.precision_proxy >= t.precision
    }

    fn resolve(&self, input: &ArbitrationInput<'_>) -> Decision {
        let first_alternative = input.alternative_plans.first();
        let mut rationale = Vec::new();

        // 1. An invalid blueprint is never endorsed; the chosen plan is a stopgap.
        if !input.validator_result.valid {
            rationale.push(RationaleTag::ValidatorReject);
            return finish(
                OutcomeKind::Replan,
                rationale,
                0.0,
                first_alternative.or(input.microprolog_plan).cloned(),
                None,
            );
        }

        // 2.
        let Some(micro) = input.microprolog_plan else {
            rationale.push(RationaleTag::MicroprologAbsent);
            let confidence = first_alternative
                .and_then(|plan| score_of(input.alt_scores, &plan.id))
                .and_then(|score| score.confidence)
                .unwrap_or(0.0);
            return finish(
                OutcomeKind::AcceptAlternative,
                rationale,
                confidence,
                first_alternative.cloned(),
                None,
            );
        };

        // 3.
        let Some(micro_score) = input.micro_score else {
            rationale.push(RationaleTag::MicroprologUnscored);
            return finish(
                OutcomeKind::SeekHumanConfirmation,
                rationale,
                0.0,
                Some(first_alternative.unwrap_or(micro).clone()),
                None,
            );
        };

        let mut confidence = micro_score.confidence.map(clamp_unit).unwrap_or(0.0);

        // 4.
        if self.micro_passes(micro_score) {
            rationale.push(RationaleTag::MicroprologThresholdPass);
            confidence =
                confidence.max(micro_score.confidence.unwrap_or(DEFAULT_ACCEPT_CONFIDENCE));
            return finish(
                OutcomeKind::AcceptMicroprolog,
                rationale,
                confidence,
                Some(micro.clone()),
                None,
            );
        }
        rationale.push(RationaleTag::MicroprologThresholdFail);

        // 5.
        if let Some(best) = best_alternative(input.alt_scores) {
            if best.score.total_score >= self.thresholds.accept_score {
                rationale.push(RationaleTag::AlternativeThresholdPass);
                confidence =
                    confidence.max(best.score.confidence.unwrap_or(DEFAULT_ACCEPT_CONFIDENCE));
                return finish(
                    OutcomeKind::AcceptAlternative,
                    rationale,
                    confidence,
                    Some(best.plan.clone()),
                    None,
                );
            }
        }

        // 6.
        if micro_score.total_score >= self.thresholds.fuse_lower
            || confidence < self.thresholds.confidence_min
        {
            rationale.push(RationaleTag::FusionAttempted);
            let request = FusionRequest {
                microprolog_plan: micro,
                alternative_plans: input.alternative_plans,
                alternative_scores: input.alt_scores,
                validator_result: input.validator_result,
                context: input.context,
                floor: self.thresholds.microprolog_floor,
            };
            match self.fusion.fuse(&request) {
                Some(fused) => {
                    rationale.push(RationaleTag::FusionApplied);
                    confidence =
                        confidence.max(fused.confidence.unwrap_or(DEFAULT_FUSION_CONFIDENCE));
                    let chosen = fused.plan.clone();
                    return finish(
                        OutcomeKind::Fuse,
                        rationale,
                        confidence,
                        Some(chosen),
                        Some(fused),
                    );
                }
                None => rationale.push(RationaleTag::FusionUnavailable),
            }
        }

        // 7.
        rationale.push(RationaleTag::FallbackAlternative);
        finish(
            OutcomeKind::AcceptAlternative,
            rationale,
            confidence.max(FALLBACK_CONFIDENCE),
            Some(first_alternative.unwrap_or(micro).clone()),
            None,
        )
    }

    fn audit(&self, decision: &Decision, input: &ArbitrationInput<'_>) {
        let entry = DecisionLogEntry::new(
            decision,
            input.validator_result,
            input.context,
            input.alternative_plans.len(),
            input.microprolog_plan.is_some(),
        );
        if let Err(err) = self.logger.log(&entry) {
            METRICS.inc_decision_log_failures();
            obs::emit_decision_log_failed(input.context.domain(), &err);
        }
    }
}

impl Arbiter for PlanArbitrator {
    fn decide(&self, input: &ArbitrationInput<'_>) -> Decision {
        let decision = self.resolve(input);

        METRICS.inc_decisions();
        if decision.outcome == OutcomeKind::Fuse {
            METRICS.inc_fusions();
        }
        obs::emit_arbitration_decided(
            input.context.domain(),
            decision.outcome,
            decision.confidence,
            decision.chosen_plan_id(),
        );
        self.audit(&decision, input);
        decision
    }
}

fn finish(
    outcome: OutcomeKind,
    mut rationale: Vec<RationaleTag>,
    confidence: f64,
    chosen_plan: Option<CrawlPlan>,
    fused_plan: Option<FusionResult>,
) -> Decision {
    if chosen_plan.is_none() {
        rationale.push(RationaleTag::NoCandidatePlan);
    }
    Decision {
        outcome,
        rationale,
        confidence: clamp_unit(confidence),
        chosen_plan,
        fused_plan,
    }
}

fn score_of<'a>(scores: &'a [ScoredPlan], plan_id: &str) -> Option<&'a PlanScore> {
    scores.iter().find(|s| s.plan.id == plan_id).map(|s| &s.score)
}

/// Highest total score; the earliest wins ties and NaN ranks last.
fn best_alternative(scores: &[ScoredPlan]) -> Option<&ScoredPlan> {
    let rank = |s: &ScoredPlan| {
        if s.score.total_score.is_nan() {
            f64::NEG_INFINITY
        } else {
            s.score.total_score
        }
    };
    scores.iter().fold(None, |best: Option<&ScoredPlan>, candidate| match best {
        Some(current) if rank(current) >= rank(candidate) => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlBudget, PlanOrigin};
    use crate::risk::RiskMetrics;

    fn plan(id: &str) -> CrawlPlan {
        CrawlPlan::new(id, "example.com", PlanOrigin::Blueprint, CrawlBudget::default())
    }

    #[test]
    fn test_best_alternative_prefers_first_on_tie() {
        let scores = vec![
            ScoredPlan::new(plan("a"), PlanScore::with_checks(0.8, 0.0, 0.0)),
            ScoredPlan::new(plan("b"), PlanScore::with_checks(0.8, 0.0, 0.0)),
            ScoredPlan::new(plan("c"), PlanScore::with_checks(f64::NAN, 0.0, 0.0)),
        ];
        assert_eq!(best_alternative(&scores).unwrap().plan.id, "a");
        assert!(best_alternative(&[]).is_none());
    }

    #[test]
    fn test_no_candidate_tag_when_nothing_to_choose() {
        let validation = ValidationResult::accepted(plan("bp"), RiskMetrics::default());
        let ctx = PlanningContext::for_domain("example.com");
        let input = ArbitrationInput {
            microprolog_plan: None,
            alternative_plans: &[],
            micro_score: None,
            alt_scores: &[],
            validator_result: &validation,
            context: &ctx,
        };
        let d = PlanArbitrator::default().decide(&input);
        assert_eq!(d.outcome, OutcomeKind::AcceptAlternative);
        assert!(d.chosen_plan.is_none());
        assert_eq!(
            d.rationale,
            vec![RationaleTag::MicroprologAbsent, RationaleTag::NoCandidatePlan]
        );
    }

    #[test]
    fn test_low_confidence_triggers_fusion_attempt() {
        let validation = ValidationResult::accepted(plan("bp"), RiskMetrics::default());
        let ctx = PlanningContext::for_domain("example.com");
        let micro = plan("micro");
        let alts = vec![plan("a")];
        let micro_score = PlanScore::with_checks(0.3, 0.1, 0.1).with_confidence(0.1);
        let input = ArbitrationInput {
            microprolog_plan: Some(&micro),
            alternative_plans: &alts,
            micro_score: Some(&micro_score),
            alt_scores: &[],
            validator_result: &validation,
            context: &ctx,
        };
        let d = PlanArbitrator::default().decide(&input);
        // Micro has no targets, so fusion finds nothing and we fall back.
        assert_eq!(d.outcome, OutcomeKind::AcceptAlternative);
        assert_eq!(
            d.rationale,
            vec![
                RationaleTag::MicroprologThresholdFail,
                RationaleTag::FusionAttempted,
                RationaleTag::FusionUnavailable,
                RationaleTag::FallbackAlternative,
            ]
        );
        assert_eq!(d.chosen_plan_id(), Some("a"));
        assert_eq!(d.confidence, 0.5);
    }
}
