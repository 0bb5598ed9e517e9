//! One-call orchestration of validation, scoring, arbitration and replay.
//!
//! The coordinator owns no mutable state besides the shared effectiveness
//! tracker; every `process` call is independent. Only the replay step can
//! suspend, and it is best effort: it never changes the decision.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arbitration::{Arbiter, ArbitrationInput, PlanArbitrator};
use crate::config::MetaPlannerConfig;
use crate::domain::{
    CrawlPlan, Decision, MetaPlanError, PlanScore, PlanningContext, Result, ScoredPlan,
};
use crate::effectiveness::{EffectivenessTracker, ExecutionReport};
use crate::evaluator::{EvaluationInput, Evaluator, WeightedPlanEvaluator};
use crate::fusion::SafetyFirstFusion;
use crate::obs::ArbitrationSpan;
use crate::replay::{simulate_best_effort, DryRunSimulator, ReplayReport, ReplayRequest, ReplaySimulator};
use crate::risk::RiskScorer;
use crate::validator::{SafetyPlanValidator, ValidationResult, Validator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Consider the microprolog plan at all. Off until that planner is proven.
    pub microprolog_enabled: bool,
    pub replay_timeout_ms: u64,
    /// Most recent executions folded into the domain history.
    pub history_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            microprolog_enabled: false,
            replay_timeout_ms: 2000,
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub blueprint: Option<CrawlPlan>,
    pub context: PlanningContext,
    #[serde(default)]
    pub microprolog_plan: Option<CrawlPlan>,
    #[serde(default)]
    pub alternative_plans: Vec<CrawlPlan>,
}

impl ProcessRequest {
    pub fn new(blueprint: CrawlPlan, context: PlanningContext) -> Self {
        Self {
            blueprint: Some(blueprint),
            context,
            microprolog_plan: None,
            alternative_plans: Vec::new(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<CrawlPlan>) -> Self {
        self.alternative_plans = alternatives;
        self
    }

    pub fn with_microprolog(mut self, plan: CrawlPlan) -> Self {
        self.microprolog_plan = Some(plan);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub validator_result: ValidationResult,
    pub micro_score: Option<PlanScore>,
    pub alternative_scores: Vec<ScoredPlan>,
    pub decision: Decision,
    pub replay: ReplayReport,
    pub sanitized_blueprint: Option<CrawlPlan>,
}

pub struct MetaPlanCoordinator {
    config: CoordinatorConfig,
    validator: Arc<dyn Validator>,
    evaluator: Arc<dyn Evaluator>,
    arbiter: Arc<dyn Arbiter>,
    replay: Arc<dyn ReplaySimulator>,
    tracker: Arc<EffectivenessTracker>,
}

impl std::fmt::Debug for MetaPlanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaPlanCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetaPlanCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        validator: Arc<dyn Validator>,
        evaluator: Arc<dyn Evaluator>,
        arbiter: Arc<dyn Arbiter>,
        replay: Arc<dyn ReplaySimulator>,
        tracker: Arc<EffectivenessTracker>,
    ) -> Self {
        Self {
            config,
            validator,
            evaluator,
            arbiter,
            replay,
            tracker,
        }
    }

    /// Wire the default components from a validated configuration.
    pub fn from_config(config: &MetaPlannerConfig) -> Result<Self> {
        config.validate()?;
        let scorer = RiskScorer::new(config.risk);
        let tracker = Arc::new(EffectivenessTracker::new(config.retention.clone()));
        let evaluator = WeightedPlanEvaluator::new(config.evaluator.clone(), scorer)
            .with_tracker(Arc::clone(&tracker));
        let arbiter = PlanArbitrator::new(
            config.arbitration,
            Arc::new(SafetyFirstFusion::new(scorer)),
            config.decision_log.build_decision_logger()?,
        );

        Ok(Self::new(
            config.coordinator.clone(),
            Arc::new(SafetyPlanValidator::new(config.safety.clone(), scorer)),
            Arc::new(evaluator),
            Arc::new(arbiter),
            Arc::new(DryRunSimulator),
            tracker,
        ))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<EffectivenessTracker> {
        &self.tracker
    }

    /// Executor callback closing the feedback loop.
    pub fn record_execution(&self, report: ExecutionReport) {
        self.tracker.record_execution_metrics(report);
    }

    /// Validate, score, arbitrate, then replay the chosen plan.
    ///
    /// # Errors
    ///
    /// [`MetaPlanError::NothingToArbitrate`] when neither a blueprint nor an
    /// alternative is supplied. Every other failure degrades into the result.
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessResult> {
        let ProcessRequest {
            blueprint,
            context,
            microprolog_plan,
            mut alternative_plans,
        } = request;

        let blueprint_supplied = blueprint.is_some();
        let baseline = match blueprint.or_else(|| alternative_plans.first().cloned()) {
            Some(plan) => plan,
            None => return Err(MetaPlanError::NothingToArbitrate),
        };

        let (validator_result, micro_score, alternative_scores, decision, history) = {
            let _span = ArbitrationSpan::enter(context.domain());

            let validator_result = self.validator.validate(&baseline, &context);
            let sanitized = validator_result
                .sanitized_blueprint
                .clone()
                .unwrap_or_else(|| baseline.clone());

            if blueprint_supplied {
                // A listed copy of the blueprint is replaced, never scored raw.
                match alternative_plans.iter_mut().find(|p| p.id == sanitized.id) {
                    Some(slot) => *slot = sanitized,
                    None => alternative_plans.insert(0, sanitized),
                }
            } else if let Some(first) = alternative_plans.first_mut() {
                *first = sanitized;
            }

            let tracked = self
                .tracker
                .domain_history(context.domain(), self.config.history_limit);
            let history = context.history.combine(&tracked);
            let input = EvaluationInput::new(&validator_result.metrics, &history, &context);

            let alternative_scores: Vec<ScoredPlan> = alternative_plans
                .iter()
                .map(|plan| ScoredPlan::new(plan.clone(), self.evaluator.score(plan, &input)))
                .collect();

            let microprolog_plan = match microprolog_plan {
                Some(plan) if !self.config.microprolog_enabled => {
                    tracing::debug!(
                        event = "microprolog.disabled",
                        plan_id = %plan.id,
                        "ignoring microprolog plan",
                    );
                    None
                }
                other => other,
            };
            let micro_score = microprolog_plan
                .as_ref()
                .map(|plan| self.evaluator.score(plan, &input));

            let decision = self.arbiter.decide(&ArbitrationInput {
                microprolog_plan: microprolog_plan.as_ref(),
                alternative_plans: &alternative_plans,
                micro_score: micro_score.as_ref(),
                alt_scores: &alternative_scores,
                validator_result: &validator_result,
                context: &context,
            });

            (validator_result, micro_score, alternative_scores, decision, history)
        };

        let replay = match &decision.chosen_plan {
            Some(chosen) => {
                let request = ReplayRequest {
                    domain: context.domain().to_string(),
                    blueprint: chosen.clone(),
                    history,
                    telemetry: context.telemetry.clone(),
                };
                simulate_best_effort(
                    self.replay.as_ref(),
                    &request,
                    Duration::from_millis(self.config.replay_timeout_ms),
                )
                .await
            }
            None => ReplayReport::degraded("no plan chosen"),
        };

        Ok(ProcessResult {
            sanitized_blueprint: validator_result.sanitized_blueprint.clone(),
            validator_result,
            micro_score,
            alternative_scores,
            decision,
            replay,
        })
    }
}
