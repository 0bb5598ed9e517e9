//! Risk scoring for crawl plans.
//!
//! [`RiskScorer::score`] is a pure function of the plan and the domain's
//! error history: no I/O, no clock, identical inputs give identical metrics.

use serde::{Deserialize, Serialize};

use crate::domain::{CrawlPlan, DomainHistory};

/// Risk tier derived from the overall risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn from_overall(overall: f64) -> Self {
        if overall.is_nan() || overall >= 0.75 {
            Self::Critical
        } else if overall >= 0.5 {
            Self::High
        } else if overall >= 0.25 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Reference points at which a component risk saturates at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScale {
    pub volume_ceiling: f64,
    pub rate_ceiling_rps: f64,
    pub depth_ceiling: f64,
    pub breadth_ceiling: f64,
}

impl Default for RiskScale {
    fn default() -> Self {
        Self {
            volume_ceiling: 5000.0,
            rate_ceiling_rps: 10.0,
            depth_ceiling: 10.0,
            breadth_ceiling: 200.0,
        }
    }
}

/// Risk metrics for one plan. Component risks are in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub projected_requests: u32,
    pub requests_per_second: f64,
    pub volume_risk: f64,
    pub rate_risk: f64,
    pub depth_risk: f64,
    pub breadth_risk: f64,
    pub error_risk: f64,
    pub overall_risk: f64,
    pub tier: RiskTier,
}

impl RiskMetrics {
    /// `1 - overall_risk`.
    pub fn safety_margin(&self) -> f64 {
        1.0 - self.overall_risk
    }
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self {
            projected_requests: 0,
            requests_per_second: 0.0,
            volume_risk: 0.0,
            rate_risk: 0.0,
            depth_risk: 0.0,
            breadth_risk: 0.0,
            error_risk: 0.0,
            overall_risk: 0.0,
            tier: RiskTier::Low,
        }
    }
}

const VOLUME_WEIGHT: f64 = 0.30;
const RATE_WEIGHT: f64 = 0.25;
const DEPTH_WEIGHT: f64 = 0.10;
const BREADTH_WEIGHT: f64 = 0.10;
const ERROR_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskScorer {
    scale: RiskScale,
}

impl RiskScorer {
    pub fn new(scale: RiskScale) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> &RiskScale {
        &self.scale
    }

    pub fn score(&self, plan: &CrawlPlan, history: &DomainHistory) -> RiskMetrics {
        let budget = &plan.budget;
        let rps = budget.requests_per_second();

        let volume_risk = ratio(budget.max_requests as f64, self.scale.volume_ceiling);
        let rate_risk = ratio(rps, self.scale.rate_ceiling_rps);
        let depth_risk = ratio(budget.max_depth as f64, self.scale.depth_ceiling);
        let breadth_risk = ratio(plan.targets.len() as f64, self.scale.breadth_ceiling);
        // Unknown-but-present error history fails closed.
        let error_risk = match history.error_rate {
            Some(rate) if rate.is_nan() => 1.0,
            Some(rate) => rate.clamp(0.0, 1.0),
            None => 0.0,
        };

        let overall_risk = (VOLUME_WEIGHT * volume_risk
            + RATE_WEIGHT * rate_risk
            + DEPTH_WEIGHT * depth_risk
            + BREADTH_WEIGHT * breadth_risk
            + ERROR_WEIGHT * error_risk)
            .clamp(0.0, 1.0);

        RiskMetrics {
            projected_requests: budget.max_requests,
            requests_per_second: rps,
            volume_risk,
            rate_risk,
            depth_risk,
            breadth_risk,
            error_risk,
            overall_risk,
            tier: RiskTier::from_overall(overall_risk),
        }
    }
}

/// `value / ceiling` clamped to [0, 1]; a non-positive ceiling saturates.
fn ratio(value: f64, ceiling: f64) -> f64 {
    if ceiling.is_nan() || ceiling <= 0.0 || value.is_nan() {
        return 1.0;
    }
    (value / ceiling).clamp(0.0, 1.0)
}
