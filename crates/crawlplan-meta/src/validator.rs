//! Structural and safety validation of the baseline plan.
//!
//! Validation never fails: malformed or unsafe input yields `valid = false`
//! with enumerated issues. The sanitized blueprint is a separate copy with
//! unsafe fields clipped and is the only blueprint variant downstream
//! components may execute.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{CrawlBudget, CrawlPlan, PlanTarget, PlanningContext, PolicyOverrides};
use crate::obs;
use crate::risk::{RiskMetrics, RiskScorer};

/// Safety limits a blueprint must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    pub max_requests: u32,
    pub max_concurrency: u32,
    pub min_request_interval_ms: u64,
    pub max_depth: u32,
    pub max_targets: usize,
    pub max_overall_risk: f64,
    pub max_error_rate: f64,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_requests: 2000,
            max_concurrency: 8,
            min_request_interval_ms: 250,
            max_depth: 6,
            max_targets: 200,
            max_overall_risk: 0.75,
            max_error_rate: 0.6,
        }
    }
}

impl SafetyPolicy {
    /// Apply per-call overrides on top of this policy.
    pub fn with_overrides(&self, o: &PolicyOverrides) -> Self {
        Self {
            max_requests: o.max_requests.unwrap_or(self.max_requests),
            max_concurrency: o.max_concurrency.unwrap_or(self.max_concurrency),
            min_request_interval_ms: o
                .min_request_interval_ms
                .unwrap_or(self.min_request_interval_ms),
            max_depth: o.max_depth.unwrap_or(self.max_depth),
            max_targets: o.max_targets.unwrap_or(self.max_targets),
            max_overall_risk: o.max_overall_risk.unwrap_or(self.max_overall_risk),
            max_error_rate: o.max_error_rate.unwrap_or(self.max_error_rate),
        }
    }

    /// Most permissive budget the policy allows.
    pub fn ceiling(&self) -> CrawlBudget {
        CrawlBudget {
            max_requests: self.max_requests,
            max_concurrency: self.max_concurrency,
            max_depth: self.max_depth,
            request_interval_ms: self.min_request_interval_ms,
        }
    }
}

/// Machine-readable issue kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingDomain,
    DomainMismatch,
    NoTargets,
    EmptyBudget,
    EmptyDecisionPoint,
    DuplicateDecisionPoint,
    InvalidUrlPattern,
    PriorityOutOfRange,
    YieldOutOfRange,
    RequestBudgetExceeded,
    ConcurrencyExceeded,
    IntervalTooShort,
    DepthExceeded,
    TooManyTargets,
    RiskAboveLimit,
    ErrorRateAboveLimit,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingDomain => "missing_domain",
            Self::DomainMismatch => "domain_mismatch",
            Self::NoTargets => "no_targets",
            Self::EmptyBudget => "empty_budget",
            Self::EmptyDecisionPoint => "empty_decision_point",
            Self::DuplicateDecisionPoint => "duplicate_decision_point",
            Self::InvalidUrlPattern => "invalid_url_pattern",
            Self::PriorityOutOfRange => "priority_out_of_range",
            Self::YieldOutOfRange => "yield_out_of_range",
            Self::RequestBudgetExceeded => "request_budget_exceeded",
            Self::ConcurrencyExceeded => "concurrency_exceeded",
            Self::IntervalTooShort => "interval_too_short",
            Self::DepthExceeded => "depth_exceeded",
            Self::TooManyTargets => "too_many_targets",
            Self::RiskAboveLimit => "risk_above_limit",
            Self::ErrorRateAboveLimit => "error_rate_above_limit",
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub detail: String,
}

impl ValidationIssue {
    fn new(code: IssueCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.detail)
    }
}

/// Outcome of validating a blueprint.
///
/// When `valid` is false the sanitized blueprint is a clipped copy kept for
/// inspection only; it must not be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub sanitized_blueprint: Option<CrawlPlan>,
    pub metrics: RiskMetrics,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// The sanitized blueprint, only when it is safe to execute.
    pub fn executable_blueprint(&self) -> Option<&CrawlPlan> {
        if self.valid {
            self.sanitized_blueprint.as_ref()
        } else {
            None
        }
    }

    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// A passing result around an already trusted plan.
    pub fn accepted(plan: CrawlPlan, metrics: RiskMetrics) -> Self {
        Self {
            valid: true,
            sanitized_blueprint: Some(plan),
            metrics,
            issues: Vec::new(),
        }
    }

    /// A failing result with a single issue and no executable plan.
    pub fn rejected(code: IssueCode, detail: &str) -> Self {
        Self {
            valid: false,
            sanitized_blueprint: None,
            metrics: RiskMetrics::default(),
            issues: vec![ValidationIssue::new(code, detail)],
        }
    }
}

/// Validates a blueprint against safety policy.
pub trait Validator: Send + Sync {
    fn validate(&self, blueprint: &CrawlPlan, context: &PlanningContext) -> ValidationResult;
}

/// Default validator: structural checks, policy limits and risk ceiling.
#[derive(Debug, Clone, Default)]
pub struct SafetyPlanValidator {
    policy: SafetyPolicy,
    scorer: RiskScorer,
}

impl SafetyPlanValidator {
    pub fn new(policy: SafetyPolicy, scorer: RiskScorer) -> Self {
        Self { policy, scorer }
    }
}

impl Validator for SafetyPlanValidator {
    fn validate(&self, blueprint: &CrawlPlan, context: &PlanningContext) -> ValidationResult {
        let policy = self.policy.with_overrides(&context.options.policies);
        let metrics = self.scorer.score(blueprint, &context.history);
        let mut issues = Vec::new();

        check_structure(blueprint, context, &mut issues);
        let targets = sanitize_targets(&blueprint.targets, &mut issues);
        check_limits(blueprint, &policy, &metrics, context, &mut issues);

        let mut sanitized = blueprint.clone();
        sanitized.budget = blueprint.budget.clipped_to(&policy.ceiling());
        sanitized.targets = targets;
        sanitized.targets.truncate(policy.max_targets);

        let result = ValidationResult {
            valid: issues.is_empty(),
            sanitized_blueprint: Some(sanitized),
            metrics,
            issues,
        };
        obs::emit_plan_validated(
            context.domain(),
            result.valid,
            result.issues.len(),
            result.metrics.overall_risk,
        );
        result
    }
}

fn check_structure(plan: &CrawlPlan, context: &PlanningContext, issues: &mut Vec<ValidationIssue>) {
    if plan.domain.trim().is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::MissingDomain,
            format!("plan '{}' has no domain", plan.id),
        ));
    } else if !context.domain().is_empty() && !plan.domain.eq_ignore_ascii_case(context.domain()) {
        issues.push(ValidationIssue::new(
            IssueCode::DomainMismatch,
            format!(
                "plan domain '{}' does not match requested domain '{}'",
                plan.domain,
                context.domain()
            ),
        ));
    }
    if plan.targets.is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::NoTargets,
            format!("plan '{}' selects no targets", plan.id),
        ));
    }
    if plan.budget.max_requests == 0 || plan.budget.max_concurrency == 0 {
        issues.push(ValidationIssue::new(
            IssueCode::EmptyBudget,
            "budget allows no requests",
        ));
    }
}

/// Keep well-formed, first-seen targets; record an issue for everything dropped or clamped.
fn sanitize_targets(targets: &[PlanTarget], issues: &mut Vec<ValidationIssue>) -> Vec<PlanTarget> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(targets.len());

    for target in targets {
        if target.decision_point.trim().is_empty() {
            issues.push(ValidationIssue::new(
                IssueCode::EmptyDecisionPoint,
                format!("target '{}' has no decision point", target.url_pattern),
            ));
            continue;
        }
        if !seen.insert(target.decision_point.as_str()) {
            issues.push(ValidationIssue::new(
                IssueCode::DuplicateDecisionPoint,
                format!("decision point '{}' appears more than once", target.decision_point),
            ));
            continue;
        }
        if target.url_pattern.is_empty() || Regex::new(&target.url_pattern).is_err() {
            issues.push(ValidationIssue::new(
                IssueCode::InvalidUrlPattern,
                format!(
                    "decision point '{}' has invalid url pattern '{}'",
                    target.decision_point, target.url_pattern
                ),
            ));
            continue;
        }

        let mut clean = target.clone();
        if !in_unit(target.priority) {
            issues.push(ValidationIssue::new(
                IssueCode::PriorityOutOfRange,
                format!(
                    "decision point '{}' priority {} outside [0, 1]",
                    target.decision_point, target.priority
                ),
            ));
            clean.priority = crate::domain::score::clamp_unit(target.priority);
        }
        if !in_unit(target.expected_yield) {
            issues.push(ValidationIssue::new(
                IssueCode::YieldOutOfRange,
                format!(
                    "decision point '{}' expected yield {} outside [0, 1]",
                    target.decision_point, target.expected_yield
                ),
            ));
            clean.expected_yield = crate::domain::score::clamp_unit(target.expected_yield);
        }
        kept.push(clean);
    }
    kept
}

fn check_limits(
    plan: &CrawlPlan,
    policy: &SafetyPolicy,
    metrics: &RiskMetrics,
    context: &PlanningContext,
    issues: &mut Vec<ValidationIssue>,
) {
    let budget = &plan.budget;
    if budget.max_requests > policy.max_requests {
        issues.push(ValidationIssue::new(
            IssueCode::RequestBudgetExceeded,
            format!(
                "max_requests {} > allowed {}",
                budget.max_requests, policy.max_requests
            ),
        ));
    }
    if budget.max_concurrency > policy.max_concurrency {
        issues.push(ValidationIssue::new(
            IssueCode::ConcurrencyExceeded,
            format!(
                "max_concurrency {} > allowed {}",
                budget.max_concurrency, policy.max_concurrency
            ),
        ));
    }
    if budget.request_interval_ms < policy.min_request_interval_ms {
        issues.push(ValidationIssue::new(
            IssueCode::IntervalTooShort,
            format!(
                "request_interval_ms {} < required {}",
                budget.request_interval_ms, policy.min_request_interval_ms
            ),
        ));
    }
    if budget.max_depth > policy.max_depth {
        issues.push(ValidationIssue::new(
            IssueCode::DepthExceeded,
            format!("max_depth {} > allowed {}", budget.max_depth, policy.max_depth),
        ));
    }
    if plan.targets.len() > policy.max_targets {
        issues.push(ValidationIssue::new(
            IssueCode::TooManyTargets,
            format!(
                "{} targets > allowed {}",
                plan.targets.len(),
                policy.max_targets
            ),
        ));
    }
    if metrics.overall_risk.is_nan() || metrics.overall_risk > policy.max_overall_risk {
        issues.push(ValidationIssue::new(
            IssueCode::RiskAboveLimit,
            format!(
                "overall risk {:.3} ({}) > allowed {:.3}",
                metrics.overall_risk, metrics.tier, policy.max_overall_risk
            ),
        ));
    }
    if let Some(rate) = context.history.error_rate {
        if rate.is_nan() || rate > policy.max_error_rate {
            issues.push(ValidationIssue::new(
                IssueCode::ErrorRateAboveLimit,
                format!(
                    "domain error rate {:.3} > allowed {:.3}",
                    rate, policy.max_error_rate
                ),
            ));
        }
    }
}

/// Whether a target would survive sanitization unchanged.
pub(crate) fn target_is_well_formed(target: &PlanTarget) -> bool {
    !target.decision_point.trim().is_empty()
        && !target.url_pattern.is_empty()
        && Regex::new(&target.url_pattern).is_ok()
        && in_unit(target.priority)
        && in_unit(target.expected_yield)
}

fn in_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainHistory, PlanOrigin};

    fn blueprint() -> CrawlPlan {
        CrawlPlan::new(
            "bp-1",
            "example.com",
            PlanOrigin::Blueprint,
            CrawlBudget {
                max_requests: 800,
                max_concurrency: 2,
                max_depth: 3,
                request_interval_ms: 500,
            },
        )
        .with_target(PlanTarget::new("hub:/world", "^https://example\\.com/world/", 0.9, 0.7))
        .with_target(PlanTarget::new("hub:/business", "^https://example\\.com/business/", 0.6, 0.5))
    }

    fn validate(plan: &CrawlPlan, ctx: &PlanningContext) -> ValidationResult {
        SafetyPlanValidator::default().validate(plan, ctx)
    }

    #[test]
    fn test_clean_blueprint_is_valid() {
        let r = validate(&blueprint(), &PlanningContext::for_domain("example.com"));
        assert!(r.valid, "unexpected issues: {:?}", r.issues);
        assert_eq!(r.executable_blueprint(), Some(&blueprint()));
    }

    #[test]
    fn test_budget_violation_is_clipped_and_rejected() {
        let mut plan = blueprint();
        plan.budget.max_requests = 9000;
        plan.budget.request_interval_ms = 50;

        let r = validate(&plan, &PlanningContext::for_domain("example.com"));
        assert!(!r.valid);
        assert!(r.has_issue(IssueCode::RequestBudgetExceeded));
        assert!(r.has_issue(IssueCode::IntervalTooShort));
        assert!(r.executable_blueprint().is_none());

        let sanitized = r.sanitized_blueprint.expect("clipped copy");
        assert_eq!(sanitized.budget.max_requests, 2000);
        assert_eq!(sanitized.budget.request_interval_ms, 250);
        // The submitted plan is untouched.
        assert_eq!(plan.budget.max_requests, 9000);
    }

    #[test]
    fn test_structural_issues() {
        let plan = blueprint()
            .with_target(PlanTarget::new("hub:/world", ".*", 0.5, 0.5))
            .with_target(PlanTarget::new("hub:/broken", "([", 0.5, 0.5))
            .with_target(PlanTarget::new("hub:/loud", ".*", 1.7, 0.5));

        let r = validate(&plan, &PlanningContext::for_domain("other.org"));
        assert!(!r.valid);
        assert!(r.has_issue(IssueCode::DomainMismatch));
        assert!(r.has_issue(IssueCode::DuplicateDecisionPoint));
        assert!(r.has_issue(IssueCode::InvalidUrlPattern));
        assert!(r.has_issue(IssueCode::PriorityOutOfRange));

        let sanitized = r.sanitized_blueprint.unwrap();
        let points: Vec<&str> = sanitized.decision_points().collect();
        assert_eq!(points, vec!["hub:/world", "hub:/business", "hub:/loud"]);
        assert_eq!(sanitized.target("hub:/loud").unwrap().priority, 1.0);
    }

    #[test]
    fn test_empty_plan_never_panics() {
        let plan = CrawlPlan::new(
            "",
            "",
            PlanOrigin::Blueprint,
            CrawlBudget {
                max_requests: 0,
                max_concurrency: 0,
                max_depth: 0,
                request_interval_ms: 0,
            },
        );
        let r = validate(&plan, &PlanningContext::for_domain(""));
        assert!(!r.valid);
        assert!(r.has_issue(IssueCode::MissingDomain));
        assert!(r.has_issue(IssueCode::NoTargets));
        assert!(r.has_issue(IssueCode::EmptyBudget));
    }

    #[test]
    fn test_error_history_and_overrides() {
        let ctx = PlanningContext::for_domain("example.com").with_history(DomainHistory {
            runs: 10,
            error_rate: Some(0.7),
            ..Default::default()
        });
        let r = validate(&blueprint(), &ctx);
        assert!(r.has_issue(IssueCode::ErrorRateAboveLimit));

        let relaxed = ctx.with_policies(PolicyOverrides {
            max_error_rate: Some(0.9),
            ..Default::default()
        });
        let r = validate(&blueprint(), &relaxed);
        assert!(!r.has_issue(IssueCode::ErrorRateAboveLimit));
    }

    #[test]
    fn test_issue_messages_are_prefixed_by_code() {
        let mut plan = blueprint();
        plan.budget.max_depth = 12;
        let r = validate(&plan, &PlanningContext::for_domain("example.com"));
        let messages = r.issue_messages();
        assert!(messages.iter().any(|m| m.starts_with("depth_exceeded:")));
    }
}
