//! Structured observability hooks for arbitration events.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Set `RUST_LOG` for verbosity and `CRAWLPLAN_LOG_FORMAT=json` for JSON lines.

use tracing::{debug, info, warn};

use crate::domain::OutcomeKind;

/// RAII guard that enters a domain-scoped span for one arbitration.
///
/// ```ignore
/// let _span = ArbitrationSpan::enter("example.com");
/// // every event below is tagged with domain = "example.com"
/// ```
pub struct ArbitrationSpan {
    _span: tracing::span::EnteredSpan,
}

impl ArbitrationSpan {
    pub fn enter(domain: &str) -> Self {
        let span = tracing::info_span!("crawlplan.arbitration", domain = %domain);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: blueprint validated.
pub fn emit_plan_validated(domain: &str, valid: bool, issue_count: usize, overall_risk: f64) {
    info!(
        event = "plan.validated",
        domain = %domain,
        valid = valid,
        issues = issue_count,
        overall_risk = overall_risk,
    );
}

/// Emit event: candidate plan scored.
pub fn emit_plan_scored(plan_id: &str, total_score: f64, confidence: f64) {
    debug!(
        event = "plan.scored",
        plan_id = %plan_id,
        total_score = total_score,
        confidence = confidence,
    );
}

/// Emit event: the arbitrator reached an outcome.
pub fn emit_arbitration_decided(
    domain: &str,
    outcome: OutcomeKind,
    confidence: f64,
    chosen_plan_id: Option<&str>,
) {
    info!(
        event = "arbitration.decided",
        domain = %domain,
        outcome = %outcome,
        confidence = confidence,
        chosen_plan_id = chosen_plan_id.unwrap_or("none"),
    );
}

/// Emit event: fusion finished, with or without a plan.
pub fn emit_fusion_evaluated(seed_plan_id: &str, fused: bool, safety_margin: f64, floor: f64) {
    info!(
        event = "fusion.evaluated",
        seed_plan_id = %seed_plan_id,
        fused = fused,
        safety_margin = safety_margin,
        floor = floor,
    );
}

/// Emit event: the decision logger failed (warning level, never fatal).
pub fn emit_decision_log_failed(domain: &str, error: &dyn std::fmt::Display) {
    warn!(event = "decision_log.failed", domain = %domain, error = %error);
}

/// Emit event: replay degraded to an empty estimate (warning level).
pub fn emit_replay_degraded(domain: &str, reason: &str) {
    warn!(event = "replay.degraded", domain = %domain, reason = %reason);
}
