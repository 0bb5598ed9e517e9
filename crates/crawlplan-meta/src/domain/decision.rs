//! Arbitration outcomes.

use serde::{Deserialize, Serialize};

use super::plan::CrawlPlan;

/// The closed set of arbitration outcomes. There is no "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Replan,
    AcceptAlternative,
    SeekHumanConfirmation,
    AcceptMicroprolog,
    Fuse,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replan => "replan",
            Self::AcceptAlternative => "accept_alternative",
            Self::SeekHumanConfirmation => "seek_human_confirmation",
            Self::AcceptMicroprolog => "accept_microprolog",
            Self::Fuse => "fuse",
        }
    }

    /// Outcomes that endorse a candidate as scored.
    pub fn is_accept(self) -> bool {
        matches!(self, Self::AcceptAlternative | Self::AcceptMicroprolog)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule tag explaining one step toward an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RationaleTag {
    ValidatorReject,
    MicroprologAbsent,
    MicroprologUnscored,
    MicroprologThresholdPass,
    MicroprologThresholdFail,
    AlternativeThresholdPass,
    FusionAttempted,
    FusionApplied,
    FusionUnavailable,
    FallbackAlternative,
    NoCandidatePlan,
}

impl RationaleTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidatorReject => "validator_reject",
            Self::MicroprologAbsent => "microprolog_absent",
            Self::MicroprologUnscored => "microprolog_unscored",
            Self::MicroprologThresholdPass => "microprolog_threshold_pass",
            Self::MicroprologThresholdFail => "microprolog_threshold_fail",
            Self::AlternativeThresholdPass => "alternative_threshold_pass",
            Self::FusionAttempted => "fusion_attempted",
            Self::FusionApplied => "fusion_applied",
            Self::FusionUnavailable => "fusion_unavailable",
            Self::FallbackAlternative => "fallback_alternative",
            Self::NoCandidatePlan => "no_candidate_plan",
        }
    }
}

impl std::fmt::Display for RationaleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fused plan and how it was assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub plan: CrawlPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Decision points kept from the microprolog seed.
    #[serde(default)]
    pub seed_decision_points: Vec<String>,
    /// Alternative plan ids that contributed fragments.
    #[serde(default)]
    pub contributors: Vec<String>,
    /// Overall risk of the fused plan.
    #[serde(default)]
    pub estimated_risk: f64,
}

impl FusionResult {
    pub fn new(plan: CrawlPlan, confidence: f64) -> Self {
        Self {
            plan,
            confidence: Some(confidence),
            seed_decision_points: Vec::new(),
            contributors: Vec::new(),
            estimated_risk: 0.0,
        }
    }
}

/// The arbitrator's verdict for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: OutcomeKind,
    pub rationale: Vec<RationaleTag>,
    pub confidence: f64,
    /// Plan the executor should run. `None` only when no candidate existed.
    pub chosen_plan: Option<CrawlPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_plan: Option<FusionResult>,
}

impl Decision {
    pub fn chosen_plan_id(&self) -> Option<&str> {
        self.chosen_plan.as_ref().map(|p| p.id.as_str())
    }
}
