//! Crawl plan values.
//!
//! A [`CrawlPlan`] is opaque to the engine apart from a small typed surface:
//! the domain, the per-decision-point targets and the resource budget.
//! Everything else rides along in `attributes` untouched. Plans are never
//! mutated in place; validation and fusion build new values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which planner produced a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Rule-based baseline plan.
    Blueprint,
    /// Candidate from another strategy generator.
    Alternative { strategy: String },
    /// Candidate from the logic-program planner.
    Microprolog,
    /// Output of safety-first fusion.
    Fused {
        seed_id: String,
        contributors: Vec<String>,
    },
}

impl PlanOrigin {
    /// Whether the origin itself explains how targets were chosen.
    pub fn is_explainable(&self) -> bool {
        match self {
            Self::Blueprint | Self::Microprolog | Self::Fused { .. } => true,
            Self::Alternative { strategy } => !strategy.trim().is_empty(),
        }
    }
}

/// Resource allocation for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlBudget {
    /// Projected request volume for one run.
    pub max_requests: u32,
    /// Parallel fetch slots.
    pub max_concurrency: u32,
    /// Maximum link depth from the seed URLs.
    pub max_depth: u32,
    /// Delay between requests on one slot.
    pub request_interval_ms: u64,
}

impl CrawlBudget {
    /// Peak request rate implied by the budget.
    ///
    /// A zero interval is treated as one millisecond.
    pub fn requests_per_second(&self) -> f64 {
        let interval = self.request_interval_ms.max(1) as f64;
        self.max_concurrency as f64 * 1000.0 / interval
    }

    /// Element-wise most conservative of two budgets.
    pub fn clipped_to(&self, ceiling: &CrawlBudget) -> CrawlBudget {
        CrawlBudget {
            max_requests: self.max_requests.min(ceiling.max_requests),
            max_concurrency: self.max_concurrency.min(ceiling.max_concurrency),
            max_depth: self.max_depth.min(ceiling.max_depth),
            request_interval_ms: self.request_interval_ms.max(ceiling.request_interval_ms),
        }
    }
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_requests: 500,
            max_concurrency: 2,
            max_depth: 3,
            request_interval_ms: 1000,
        }
    }
}

/// One fetch target filling a decision point of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTarget {
    /// Slot this target fills, e.g. `hub:/world`.
    pub decision_point: String,
    /// Regex the crawl executor matches URLs against.
    pub url_pattern: String,
    /// Scheduling priority in [0, 1].
    pub priority: f64,
    /// Expected share of relevant documents in [0, 1].
    pub expected_yield: f64,
    /// Seed element that fusion must keep.
    #[serde(default)]
    pub safety_critical: bool,
    /// Why the planner picked this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl PlanTarget {
    pub fn new(decision_point: &str, url_pattern: &str, priority: f64, expected_yield: f64) -> Self {
        Self {
            decision_point: decision_point.into(),
            url_pattern: url_pattern.into(),
            priority,
            expected_yield,
            safety_critical: false,
            rationale: None,
        }
    }

    pub fn safety_critical(mut self) -> Self {
        self.safety_critical = true;
        self
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Structured crawl instructions for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlPlan {
    pub id: String,
    pub domain: String,
    pub origin: PlanOrigin,
    #[serde(default)]
    pub targets: Vec<PlanTarget>,
    #[serde(default)]
    pub budget: CrawlBudget,
    /// Pass-through payload the engine never inspects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CrawlPlan {
    pub fn new(id: &str, domain: &str, origin: PlanOrigin, budget: CrawlBudget) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            origin,
            targets: Vec::new(),
            budget,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: PlanTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Target filling `decision_point`, if any.
    pub fn target(&self, decision_point: &str) -> Option<&PlanTarget> {
        self.targets
            .iter()
            .find(|t| t.decision_point == decision_point)
    }

    /// Decision points in target order.
    pub fn decision_points(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.decision_point.as_str())
    }
}
