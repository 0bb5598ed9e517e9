//! Plan scores produced by the evaluator and consumed by the arbitrator.

use serde::{Deserialize, Serialize};

use super::plan::CrawlPlan;

/// Clamp to `[0, 1]`, mapping NaN to zero.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Named score components, all in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreMetrics {
    pub explainability: f64,
    pub precision_proxy: f64,
    pub structural_quality: f64,
    pub historical_effectiveness: f64,
    pub telemetry_health: f64,
}

impl ScoreMetrics {
    fn clamped(self) -> Self {
        Self {
            explainability: clamp_unit(self.explainability),
            precision_proxy: clamp_unit(self.precision_proxy),
            structural_quality: clamp_unit(self.structural_quality),
            historical_effectiveness: clamp_unit(self.historical_effectiveness),
            telemetry_health: clamp_unit(self.telemetry_health),
        }
    }
}

/// Score of one candidate plan.
///
/// `confidence` is optional so externally supplied scores may leave it out;
/// the arbitrator then falls back to fixed defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanScore {
    pub total_score: f64,
    #[serde(default)]
    pub metrics: ScoreMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PlanScore {
    /// Build a score with every field clamped to [0, 1].
    pub fn new(total_score: f64, metrics: ScoreMetrics, confidence: f64) -> Self {
        Self {
            total_score: clamp_unit(total_score),
            metrics: metrics.clamped(),
            confidence: Some(clamp_unit(confidence)),
        }
    }

    /// Shorthand for the three components the arbitrator checks.
    pub fn with_checks(total_score: f64, explainability: f64, precision_proxy: f64) -> Self {
        Self {
            total_score,
            metrics: ScoreMetrics {
                explainability,
                precision_proxy,
                ..Default::default()
            },
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// A candidate plan paired with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlan {
    pub plan: CrawlPlan,
    pub score: PlanScore,
}

impl ScoredPlan {
    pub fn new(plan: CrawlPlan, score: PlanScore) -> Self {
        Self { plan, score }
    }
}
