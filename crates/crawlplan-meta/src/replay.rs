//! Dry-run replay of the winning plan.
//!
//! Replay is attached to a result for observability only. A failing or slow
//! simulator degrades to an empty report through [`simulate_best_effort`];
//! it never aborts the arbitration.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{CrawlPlan, DomainHistory, Telemetry};
use crate::metrics::METRICS;
use crate::obs;

/// Error rate assumed when neither telemetry nor history reports one.
const DEFAULT_ERROR_RATE: f64 = 0.05;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("plan '{0}' has nothing to replay")]
    EmptyPlan(String),

    #[error("replay timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("replay failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub domain: String,
    pub blueprint: CrawlPlan,
    #[serde(default)]
    pub history: DomainHistory,
    #[serde(default)]
    pub telemetry: Telemetry,
}

/// Expected behavior of one decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub decision_point: String,
    pub requests: u32,
    pub expected_relevant: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEstimate {
    pub plan_id: String,
    pub domain: String,
    pub expected_requests: u32,
    pub expected_successes: f64,
    pub expected_errors: f64,
    pub expected_relevant: f64,
    pub estimated_duration_ms: u64,
    pub steps: Vec<ReplayStep>,
}

/// Replay outcome as attached to a coordinator result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<ReplayEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl ReplayReport {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            estimate: None,
            degraded_reason: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }
}

/// Side-effect-free dry run of a plan.
#[async_trait]
pub trait ReplaySimulator: Send + Sync {
    async fn simulate(&self, request: &ReplayRequest) -> Result<ReplayEstimate, ReplayError>;
}

/// Spreads the request budget over targets by priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSimulator;

impl DryRunSimulator {
    pub fn estimate(&self, request: &ReplayRequest) -> Result<ReplayEstimate, ReplayError> {
        let plan = &request.blueprint;
        let budget = &plan.budget;
        if plan.targets.is_empty() || budget.max_requests == 0 {
            return Err(ReplayError::EmptyPlan(plan.id.clone()));
        }

        let error_rate = request
            .telemetry
            .error_rate
            .or(request.history.error_rate)
            .filter(|r| r.is_finite())
            .unwrap_or(DEFAULT_ERROR_RATE)
            .clamp(0.0, 1.0);

        let allocation = allocate(budget.max_requests, plan);
        let steps: Vec<ReplayStep> = plan
            .targets
            .iter()
            .zip(allocation)
            .map(|(target, requests)| ReplayStep {
                decision_point: target.decision_point.clone(),
                requests,
                expected_relevant: requests as f64
                    * (1.0 - error_rate)
                    * target.expected_yield.clamp(0.0, 1.0),
            })
            .collect();

        let total = budget.max_requests as f64;
        let slots = budget.max_concurrency.max(1) as u64;
        let waves = (budget.max_requests as u64).div_ceil(slots);
        Ok(ReplayEstimate {
            plan_id: plan.id.clone(),
            domain: request.domain.clone(),
            expected_requests: budget.max_requests,
            expected_successes: total * (1.0 - error_rate),
            expected_errors: total * error_rate,
            expected_relevant: steps.iter().map(|s| s.expected_relevant).sum(),
            estimated_duration_ms: waves.saturating_mul(budget.request_interval_ms),
            steps,
        })
    }
}

#[async_trait]
impl ReplaySimulator for DryRunSimulator {
    async fn simulate(&self, request: &ReplayRequest) -> Result<ReplayEstimate, ReplayError> {
        self.estimate(request)
    }
}

/// Requests per target, proportional to priority; leftovers go to the top target.
fn allocate(max_requests: u32, plan: &CrawlPlan) -> Vec<u32> {
    let weights: Vec<f64> = plan
        .targets
        .iter()
        .map(|t| if t.priority.is_finite() { t.priority.max(0.0) } else { 0.0 })
        .collect();
    let sum: f64 = weights.iter().sum();
    let n = weights.len() as f64;

    let mut allocation: Vec<u32> = weights
        .iter()
        .map(|w| {
            let share = if sum > 0.0 { w / sum } else { 1.0 / n };
            (max_requests as f64 * share).floor() as u32
        })
        .collect();

    let assigned: u32 = allocation.iter().sum();
    let top = weights
        .iter()
        .enumerate()
        .fold(0, |best, (i, w)| if *w > weights[best] { i } else { best });
    if let Some(slot) = allocation.get_mut(top) {
        *slot += max_requests.saturating_sub(assigned);
    }
    allocation
}

/// Run `simulator` under `timeout`; errors and timeouts become a degraded report.
#[instrument(skip_all, fields(domain = %request.domain, plan_id = %request.blueprint.id))]
pub async fn simulate_best_effort(
    simulator: &dyn ReplaySimulator,
    request: &ReplayRequest,
    timeout: Duration,
) -> ReplayReport {
    let outcome = match tokio::time::timeout(timeout, simulator.simulate(request)).await {
        Ok(result) => result,
        Err(_) => Err(ReplayError::Timeout {
            ms: timeout.as_millis() as u64,
        }),
    };
    match outcome {
        Ok(estimate) => ReplayReport {
            estimate: Some(estimate),
            degraded_reason: None,
        },
        Err(err) => {
            let reason = err.to_string();
            METRICS.inc_replays_degraded();
            obs::emit_replay_degraded(&request.domain, &reason);
            ReplayReport::degraded(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlBudget, PlanOrigin, PlanTarget};

    fn request() -> ReplayRequest {
        let plan = CrawlPlan::new(
            "bp",
            "example.com",
            PlanOrigin::Blueprint,
            CrawlBudget {
                max_requests: 100,
                max_concurrency: 4,
                max_depth: 2,
                request_interval_ms: 500,
            },
        )
        .with_target(PlanTarget::new("hub:/world", "^/world/", 0.75, 0.4))
        .with_target(PlanTarget::new("hub:/sport", "^/sport/", 0.25, 1.0));
        ReplayRequest {
            domain: "example.com".into(),
            blueprint: plan,
            history: DomainHistory::default(),
            telemetry: Telemetry {
                error_rate: Some(0.1),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_estimate_spreads_budget_by_priority() {
        let e = DryRunSimulator.estimate(&request()).unwrap();
        assert_eq!(e.steps[0].requests, 75);
        assert_eq!(e.steps[1].requests, 25);
        assert!((e.expected_errors - 10.0).abs() < 1e-9);
        assert!((e.expected_relevant - (75.0 * 0.9 * 0.4 + 25.0 * 0.9)).abs() < 1e-9);
        assert_eq!(e.estimated_duration_ms, 25 * 500);
    }

    #[test]
    fn test_allocation_sums_to_budget() {
        let mut r = request();
        r.blueprint.budget.max_requests = 7;
        r.blueprint.targets[1].priority = 0.75;
        let e = DryRunSimulator.estimate(&r).unwrap();
        assert_eq!(e.steps.iter().map(|s| s.requests).sum::<u32>(), 7);
    }

    #[test]
    fn test_empty_plan_errors() {
        let mut r = request();
        r.blueprint.targets.clear();
        assert!(matches!(
            DryRunSimulator.estimate(&r),
            Err(ReplayError::EmptyPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_best_effort_degrades_on_error() {
        let mut r = request();
        r.blueprint.targets.clear();
        let report = simulate_best_effort(&DryRunSimulator, &r, Duration::from_secs(1)).await;
        assert!(report.is_degraded());
        assert!(report.estimate.is_none());
    }
}
