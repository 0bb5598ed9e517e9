//! Candidate plan scoring.
//!
//! Three signal families feed the score: structural quality (risk relative
//! to the validated blueprint), historical effectiveness and live telemetry.
//! Scoring is a total function: thin evidence lowers `confidence`, it never
//! fails. The only clock is `EvaluationInput::as_of`, so identical inputs
//! give identical scores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::score::clamp_unit;
use crate::domain::{
    CrawlPlan, DomainHistory, PlanScore, PlanningContext, PlanningOptions, ScoreMetrics, Telemetry,
};
use crate::effectiveness::EffectivenessTracker;
use crate::obs;
use crate::risk::{RiskMetrics, RiskScorer};
use crate::validator::target_is_well_formed;

/// Relative weights of the signal families plus confidence shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorWeights {
    pub structural: f64,
    pub historical: f64,
    pub telemetry: f64,
    /// Run count at which history volume contributes half its weight.
    pub history_saturation: f64,
    /// Age at which a run's recency weight halves.
    pub recency_half_life_hours: f64,
}

impl Default for EvaluatorWeights {
    fn default() -> Self {
        Self {
            structural: 0.40,
            historical: 0.35,
            telemetry: 0.25,
            history_saturation: 5.0,
            recency_half_life_hours: 168.0,
        }
    }
}

const SIGNAL_SHARE: f64 = 0.70;
const EXPLAINABILITY_SHARE: f64 = 0.15;
const PRECISION_SHARE: f64 = 0.15;

const NEUTRAL: f64 = 0.5;
const BASE_CONFIDENCE: f64 = 0.2;
const NO_TELEMETRY_FACTOR: f64 = 0.85;
const LATENCY_CEILING_MS: f64 = 5000.0;
const RISK_EPSILON: f64 = 1e-9;

/// Evidence available when scoring one plan.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// Risk metrics of the validated blueprint; the structural reference.
    pub validator_metrics: &'a RiskMetrics,
    pub history: &'a DomainHistory,
    pub telemetry: &'a Telemetry,
    pub options: &'a PlanningOptions,
    pub as_of: DateTime<Utc>,
}

impl<'a> EvaluationInput<'a> {
    pub fn new(
        validator_metrics: &'a RiskMetrics,
        history: &'a DomainHistory,
        context: &'a PlanningContext,
    ) -> Self {
        Self {
            validator_metrics,
            history,
            telemetry: &context.telemetry,
            options: &context.options,
            as_of: context.as_of,
        }
    }
}

/// Scores candidate plans.
pub trait Evaluator: Send + Sync {
    fn score(&self, plan: &CrawlPlan, input: &EvaluationInput<'_>) -> PlanScore;
}

/// Default evaluator: weighted structural, historical and telemetry signals.
#[derive(Debug, Clone, Default)]
pub struct WeightedPlanEvaluator {
    weights: EvaluatorWeights,
    scorer: RiskScorer,
    tracker: Option<Arc<EffectivenessTracker>>,
}

impl WeightedPlanEvaluator {
    pub fn new(weights: EvaluatorWeights, scorer: RiskScorer) -> Self {
        Self {
            weights,
            scorer,
            tracker: None,
        }
    }

    /// Record every score as a preview sample in `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<EffectivenessTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn weights(&self) -> &EvaluatorWeights {
        &self.weights
    }

    fn structural(&self, plan: &CrawlPlan, input: &EvaluationInput<'_>) -> f64 {
        let own = self.scorer.score(plan, input.history).overall_risk;
        let completeness = if plan.targets.is_empty() {
            0.0
        } else {
            let formed = plan.targets.iter().filter(|t| target_is_well_formed(t)).count();
            formed as f64 / plan.targets.len() as f64
        };
        let within_reference = if own <= input.validator_metrics.overall_risk + RISK_EPSILON {
            1.0
        } else {
            0.0
        };
        clamp_unit(0.6 * (1.0 - own) + 0.25 * completeness + 0.15 * within_reference)
    }

    fn confidence(&self, input: &EvaluationInput<'_>) -> f64 {
        let history = input.history;
        let runs = history.runs as f64;
        let volume = if runs <= 0.0 {
            0.0
        } else if self.weights.history_saturation > 0.0 {
            runs / (runs + self.weights.history_saturation)
        } else {
            1.0
        };

        let recency = match history.last_run_at {
            Some(last) if runs > 0.0 => {
                let age_hours = (input.as_of - last).num_seconds().max(0) as f64 / 3600.0;
                if self.weights.recency_half_life_hours > 0.0 {
                    0.5_f64.powf(age_hours / self.weights.recency_half_life_hours)
                } else {
                    1.0
                }
            }
            None if runs > 0.0 => 0.5,
            _ => 0.0,
        };

        let telemetry_factor = if input.telemetry.is_empty() {
            NO_TELEMETRY_FACTOR
        } else {
            1.0
        };
        clamp_unit((BASE_CONFIDENCE + (1.0 - BASE_CONFIDENCE) * volume * recency) * telemetry_factor)
    }

    fn weighted_signal(&self, structural: f64, historical: f64, telemetry: f64) -> f64 {
        let w = &self.weights;
        let total = w.structural + w.historical + w.telemetry;
        if !(total.is_finite() && total > 0.0) {
            return (structural + historical + telemetry) / 3.0;
        }
        (w.structural * structural + w.historical * historical + w.telemetry * telemetry) / total
    }
}

impl Evaluator for WeightedPlanEvaluator {
    fn score(&self, plan: &CrawlPlan, input: &EvaluationInput<'_>) -> PlanScore {
        let structural = self.structural(plan, input);
        let historical = historical_effectiveness(input.history);
        let telemetry = telemetry_health(input.telemetry);
        let explainability = explainability(plan);
        let precision = precision_proxy(plan, input.history);

        let signal = self.weighted_signal(structural, historical, telemetry);
        let total =
            SIGNAL_SHARE * signal + EXPLAINABILITY_SHARE * explainability + PRECISION_SHARE * precision;

        let score = PlanScore::new(
            total,
            ScoreMetrics {
                explainability,
                precision_proxy: precision,
                structural_quality: structural,
                historical_effectiveness: historical,
                telemetry_health: telemetry,
            },
            self.confidence(input),
        );

        obs::emit_plan_scored(&plan.id, score.total_score, score.confidence.unwrap_or(0.0));
        if let Some(tracker) = &self.tracker {
            tracker.observe_preview_score(&score, plan, input.options);
        }
        score
    }
}

fn historical_effectiveness(history: &DomainHistory) -> f64 {
    if history.runs == 0 {
        return NEUTRAL;
    }
    let success = history.success_rate.map(clamp_unit).unwrap_or(NEUTRAL);
    let precision = history.avg_precision.map(clamp_unit).unwrap_or(NEUTRAL);
    clamp_unit(0.6 * success + 0.4 * precision)
}

fn telemetry_health(telemetry: &Telemetry) -> f64 {
    if telemetry.is_empty() {
        return NEUTRAL;
    }
    // Missing fields count as healthy; NaN ones as worst case.
    let rate = |v: Option<f64>| match v {
        Some(x) if x.is_nan() => 1.0,
        Some(x) => x.clamp(0.0, 1.0),
        None => 0.0,
    };
    let latency = match telemetry.avg_latency_ms {
        Some(ms) if ms.is_nan() => 1.0,
        Some(ms) => (ms / LATENCY_CEILING_MS).clamp(0.0, 1.0),
        None => 0.0,
    };
    clamp_unit(1.0 - (0.5 * rate(telemetry.error_rate) + 0.3 * rate(telemetry.throttle_rate) + 0.2 * latency))
}

fn explainability(plan: &CrawlPlan) -> f64 {
    let origin = if plan.origin.is_explainable() { 1.0 } else { 0.0 };
    let explained = if plan.targets.is_empty() {
        0.0
    } else {
        let with_rationale = plan
            .targets
            .iter()
            .filter(|t| t.rationale.as_deref().is_some_and(|r| !r.trim().is_empty()))
            .count();
        with_rationale as f64 / plan.targets.len() as f64
    };
    clamp_unit(0.7 * explained + 0.3 * origin)
}

fn precision_proxy(plan: &CrawlPlan, history: &DomainHistory) -> f64 {
    let (weighted, weight) = plan.targets.iter().fold((0.0, 0.0), |(s, w), t| {
        let p = clamp_unit(t.priority);
        (s + p * clamp_unit(t.expected_yield), w + p)
    });
    let own = if weight > 0.0 {
        weighted / weight
    } else if plan.targets.is_empty() {
        0.0
    } else {
        plan.targets
            .iter()
            .map(|t| clamp_unit(t.expected_yield))
            .sum::<f64>()
            / plan.targets.len() as f64
    };

    match history.avg_precision {
        Some(observed) if history.runs > 0 => clamp_unit((own + clamp_unit(observed)) / 2.0),
        _ => clamp_unit(own),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlBudget, PlanOrigin, PlanTarget};
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn plan() -> CrawlPlan {
        CrawlPlan::new("alt-1", "example.com", PlanOrigin::Blueprint, CrawlBudget::default())
            .with_target(PlanTarget::new("hub:/world", "^/world/.*", 0.8, 0.7).with_rationale("hub"))
            .with_target(PlanTarget::new("hub:/sport", "^/sport/.*", 0.2, 0.3))
    }

    fn score_with(history: &DomainHistory, telemetry: &Telemetry) -> PlanScore {
        let evaluator = WeightedPlanEvaluator::default();
        let metrics = RiskMetrics::default();
        let options = PlanningOptions::default();
        let input = EvaluationInput {
            validator_metrics: &metrics,
            history,
            telemetry,
            options: &options,
            as_of: as_of(),
        };
        evaluator.score(&plan(), &input)
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        let history = DomainHistory {
            runs: 3,
            success_rate: Some(0.9),
            avg_precision: Some(0.4),
            error_rate: Some(0.05),
            last_run_at: Some(as_of() - Duration::hours(2)),
        };
        let telemetry = Telemetry {
            error_rate: Some(0.1),
            ..Default::default()
        };
        let a = score_with(&history, &telemetry);
        let b = score_with(&history, &telemetry);
        assert_eq!(a, b);
        for v in [
            a.total_score,
            a.metrics.explainability,
            a.metrics.precision_proxy,
            a.metrics.structural_quality,
            a.confidence.unwrap(),
        ] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_pinned_context_clock_ages_history() {
        let history = DomainHistory {
            runs: 10,
            success_rate: Some(0.8),
            last_run_at: Some(as_of()),
            ..Default::default()
        };
        let fresh = PlanningContext::for_domain("example.com")
            .with_history(history.clone())
            .at(as_of());
        let month_later = fresh.clone().at(as_of() + Duration::days(30));

        let evaluator = WeightedPlanEvaluator::default();
        let metrics = RiskMetrics::default();
        let score = |ctx: &PlanningContext| {
            evaluator.score(&plan(), &EvaluationInput::new(&metrics, &history, ctx))
        };

        assert_eq!(score(&fresh), score(&fresh.clone()));
        assert!(score(&fresh).confidence.unwrap() > score(&month_later).confidence.unwrap());
    }

    #[test]
    fn test_no_history_caps_confidence() {
        let s = score_with(&DomainHistory::default(), &Telemetry::default());
        assert!(s.confidence.unwrap() <= BASE_CONFIDENCE);
        assert_eq!(s.metrics.historical_effectiveness, NEUTRAL);
        assert_eq!(s.metrics.telemetry_health, NEUTRAL);
    }

    #[test]
    fn test_confidence_grows_with_runs_and_recency() {
        let recent = |runs: u32, hours: i64| DomainHistory {
            runs,
            success_rate: Some(0.8),
            last_run_at: Some(as_of() - Duration::hours(hours)),
            ..Default::default()
        };
        let telemetry = Telemetry::default();
        let few = score_with(&recent(1, 1), &telemetry).confidence.unwrap();
        let many = score_with(&recent(20, 1), &telemetry).confidence.unwrap();
        let stale = score_with(&recent(20, 24 * 60), &telemetry).confidence.unwrap();
        assert!(many > few);
        assert!(many > stale);
    }

    #[test]
    fn test_precision_proxy_is_priority_weighted() {
        let p = precision_proxy(&plan(), &DomainHistory::default());
        let expected = (0.8 * 0.7 + 0.2 * 0.3) / 1.0;
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn test_explainability_counts_rationale() {
        let e = explainability(&plan());
        assert!((e - (0.7 * 0.5 + 0.3)).abs() < 1e-9);

        let mut bare = plan();
        bare.origin = PlanOrigin::Alternative {
            strategy: String::new(),
        };
        bare.targets.iter_mut().for_each(|t| t.rationale = None);
        assert_eq!(explainability(&bare), 0.0);
    }

    #[test]
    fn test_empty_plan_still_scores() {
        let evaluator = WeightedPlanEvaluator::default();
        let metrics = RiskMetrics::default();
        let ctx = PlanningContext::for_domain("example.com");
        let history = DomainHistory::default();
        let input = EvaluationInput::new(&metrics, &history, &ctx);
        let empty = CrawlPlan::new("empty", "", PlanOrigin::Microprolog, CrawlBudget::default());
        let s = evaluator.score(&empty, &input);
        assert!((0.0..=1.0).contains(&s.total_score));
        assert_eq!(s.metrics.precision_proxy, 0.0);
    }

    #[test]
    fn test_tracker_records_preview() {
        let tracker = Arc::new(EffectivenessTracker::default());
        let evaluator = WeightedPlanEvaluator::default().with_tracker(tracker.clone());
        let metrics = RiskMetrics::default();
        let ctx = PlanningContext::for_domain("example.com");
        let history = DomainHistory::default();
        let input = EvaluationInput::new(&metrics, &history, &ctx);
        let s = evaluator.score(&plan(), &input);

        let recent = tracker.get_recent_preview_stats(5);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].plan_id, "alt-1");
        assert_eq!(recent[0].plan_score, s);
        assert_eq!(recent[0].domain, "example.com");
    }
}
