//! Read-only input bag assembled by the caller for one arbitration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-call safety policy overrides. `None` keeps the validator default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub max_requests: Option<u32>,
    pub max_concurrency: Option<u32>,
    pub min_request_interval_ms: Option<u64>,
    pub max_depth: Option<u32>,
    pub max_targets: Option<usize>,
    pub max_overall_risk: Option<f64>,
    pub max_error_rate: Option<f64>,
}

/// Caller options for one arbitration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningOptions {
    pub domain: String,
    #[serde(default)]
    pub policies: PolicyOverrides,
}

/// Historical effectiveness of past runs against a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainHistory {
    /// Number of completed runs backing the rates below.
    pub runs: u32,
    pub success_rate: Option<f64>,
    pub avg_precision: Option<f64>,
    pub error_rate: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl DomainHistory {
    pub fn is_empty(&self) -> bool {
        self.runs == 0
            && self.success_rate.is_none()
            && self.avg_precision.is_none()
            && self.error_rate.is_none()
    }

    /// Run-weighted merge of two histories for the same domain.
    ///
    /// A side that reports a rate without a run count weighs as one run.
    pub fn combine(&self, other: &DomainHistory) -> DomainHistory {
        DomainHistory {
            runs: self.runs.saturating_add(other.runs),
            success_rate: weighted(self, self.success_rate, other, other.success_rate),
            avg_precision: weighted(self, self.avg_precision, other, other.avg_precision),
            error_rate: weighted(self, self.error_rate, other, other.error_rate),
            last_run_at: match (self.last_run_at, other.last_run_at) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

fn weighted(
    a: &DomainHistory,
    a_value: Option<f64>,
    b: &DomainHistory,
    b_value: Option<f64>,
) -> Option<f64> {
    let weight = |h: &DomainHistory| (h.runs.max(1)) as f64;
    match (a_value, b_value) {
        (Some(x), Some(y)) => {
            let (wa, wb) = (weight(a), weight(b));
            Some((x * wa + y * wb) / (wa + wb))
        }
        (x, y) => x.or(y),
    }
}

/// Live crawl telemetry for the domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    pub error_rate: Option<f64>,
    /// Share of responses that were throttled (HTTP 429/503).
    pub throttle_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Telemetry {
    pub fn is_empty(&self) -> bool {
        self.error_rate.is_none() && self.throttle_rate.is_none() && self.avg_latency_ms.is_none()
    }
}

/// Everything an arbitration may read besides the candidate plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningContext {
    pub options: PlanningOptions,
    #[serde(default)]
    pub history: DomainHistory,
    #[serde(default)]
    pub telemetry: Telemetry,
    /// Reference instant for recency; pinning it makes scoring reproducible.
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl PlanningContext {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            options: PlanningOptions {
                domain: domain.into(),
                policies: PolicyOverrides::default(),
            },
            history: DomainHistory::default(),
            telemetry: Telemetry::default(),
            as_of: Utc::now(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.options.domain
    }

    pub fn with_history(mut self, history: DomainHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_policies(mut self, policies: PolicyOverrides) -> Self {
        self.options.policies = policies;
        self
    }

    pub fn at(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }
}
