//! Effectiveness feedback: preview scores and post-execution KPIs.
//!
//! The tracker is append-only. Samples are never mutated; the only removal
//! is capacity eviction of the oldest samples under [`RetentionPolicy`].
//! Reads are bounded and most-recent-first. Execution KPIs aggregate into a
//! [`DomainHistory`] that feeds future scoring.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CrawlPlan, DomainHistory, PlanScore, PlanningOptions};

/// Capacity limits for the tracker's sample lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Keep at most this many preview samples (oldest evicted first).
    pub max_preview_samples: Option<usize>,
    /// Keep at most this many execution samples (oldest evicted first).
    pub max_execution_samples: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_preview_samples: Some(10_000),
            max_execution_samples: Some(10_000),
        }
    }
}

impl RetentionPolicy {
    /// No eviction at all.
    pub fn unbounded() -> Self {
        Self {
            max_preview_samples: None,
            max_execution_samples: None,
        }
    }
}

/// A score observed while previewing a candidate plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSample {
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub plan_id: String,
    pub plan_score: PlanScore,
}

/// Share of an execution attributed to one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanContribution {
    pub plan_id: String,
    /// Fraction of the session's requests issued on behalf of this plan.
    pub share: f64,
}

/// Raw outcome counters from one crawl session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionKpis {
    pub requests_issued: u32,
    pub successful_fetches: u32,
    pub relevant_documents: u32,
    pub errors: u32,
}

impl ExecutionKpis {
    pub fn success_rate(&self) -> Option<f64> {
        ratio(self.successful_fetches, self.requests_issued)
    }

    pub fn precision(&self) -> Option<f64> {
        ratio(self.relevant_documents, self.successful_fetches)
    }

    pub fn error_rate(&self) -> Option<f64> {
        ratio(self.errors, self.requests_issued)
    }
}

fn ratio(part: u32, whole: u32) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some((part as f64 / whole as f64).clamp(0.0, 1.0))
    }
}

/// Executor callback payload after a plan ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub domain: String,
    pub session_id: String,
    #[serde(default)]
    pub contributions: Vec<PlanContribution>,
    pub kpis: ExecutionKpis,
}

/// A recorded execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSample {
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub session_id: String,
    pub contributions: Vec<PlanContribution>,
    pub kpis: ExecutionKpis,
}

/// Concurrent-safe append-only store of effectiveness samples.
#[derive(Debug, Default)]
pub struct EffectivenessTracker {
    retention: RetentionPolicy,
    previews: Mutex<VecDeque<PreviewSample>>,
    executions: Mutex<VecDeque<ExecutionSample>>,
}

impl EffectivenessTracker {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            previews: Mutex::new(VecDeque::new()),
            executions: Mutex::new(VecDeque::new()),
        }
    }

    /// Record the score a candidate plan received during evaluation.
    pub fn observe_preview_score(
        &self,
        score: &PlanScore,
        plan: &CrawlPlan,
        options: &PlanningOptions,
    ) {
        let domain = if options.domain.is_empty() {
            plan.domain.clone()
        } else {
            options.domain.clone()
        };
        let sample = PreviewSample {
            timestamp: Utc::now(),
            domain,
            plan_id: plan.id.clone(),
            plan_score: *score,
        };
        let mut previews = lock(&self.previews);
        previews.push_back(sample);
        evict(&mut previews, self.retention.max_preview_samples);
    }

    /// Record post-hoc KPIs for a finished crawl session.
    pub fn record_execution_metrics(&self, report: ExecutionReport) {
        let sample = ExecutionSample {
            timestamp: Utc::now(),
            domain: report.domain,
            session_id: report.session_id,
            contributions: report.contributions,
            kpis: report.kpis,
        };
        tracing::debug!(
            event = "effectiveness.execution_recorded",
            domain = %sample.domain,
            session_id = %sample.session_id,
            requests = sample.kpis.requests_issued,
        );
        let mut executions = lock(&self.executions);
        executions.push_back(sample);
        evict(&mut executions, self.retention.max_execution_samples);
    }

    /// At most `limit` preview samples, most recent first.
    pub fn get_recent_preview_stats(&self, limit: usize) -> Vec<PreviewSample> {
        lock(&self.previews).iter().rev().take(limit).cloned().collect()
    }

    /// At most `limit` execution samples, most recent first.
    pub fn get_execution_kpis(&self, limit: usize) -> Vec<ExecutionSample> {
        lock(&self.executions)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Aggregate the most recent `limit` executions for `domain`.
    pub fn domain_history(&self, domain: &str, limit: usize) -> DomainHistory {
        let executions = lock(&self.executions);
        let recent: Vec<&ExecutionSample> = executions
            .iter()
            .rev()
            .filter(|s| s.domain.eq_ignore_ascii_case(domain))
            .take(limit)
            .collect();

        let runs = recent.len() as u32;
        DomainHistory {
            runs,
            success_rate: mean(recent.iter().filter_map(|s| s.kpis.success_rate())),
            avg_precision: mean(recent.iter().filter_map(|s| s.kpis.precision())),
            error_rate: mean(recent.iter().filter_map(|s| s.kpis.error_rate())),
            last_run_at: recent.first().map(|s| s.timestamp),
        }
    }

    pub fn preview_len(&self) -> usize {
        lock(&self.previews).len()
    }

    pub fn execution_len(&self) -> usize {
        lock(&self.executions).len()
    }
}

/// Recover from a poisoned lock: samples are plain data and stay consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn evict<T>(samples: &mut VecDeque<T>, max: Option<usize>) {
    if let Some(max) = max {
        while samples.len() > max {
            samples.pop_front();
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
