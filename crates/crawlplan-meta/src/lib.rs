//! Crawl plan arbitration engine.
//!
//! Decides, for one crawl domain, which candidate plan actually runs: the
//! validated blueprint, an alternative, the microprolog plan, or a
//! safety-first fusion of them. Start at [`MetaPlanCoordinator::process`].

pub mod arbitration;
pub mod config;
pub mod coordinator;
pub mod decision_log;
pub mod domain;
pub mod effectiveness;
pub mod evaluator;
pub mod experiment;
pub mod fakes;
pub mod fusion;
pub mod metrics;
pub mod obs;
pub mod replay;
pub mod risk;
pub mod telemetry;
pub mod validator;

pub use arbitration::{Arbiter, ArbitrationInput, ArbitrationThresholds, PlanArbitrator};

pub use config::{DecisionLogConfig, DecisionLogSink, MetaPlannerConfig};

pub use coordinator::{CoordinatorConfig, MetaPlanCoordinator, ProcessRequest, ProcessResult};

pub use decision_log::{
    read_decision_log, DecisionLogContext, DecisionLogEntry, DecisionLogError, DecisionLogger,
    JsonlDecisionLogger, MemoryDecisionLogger, NoopDecisionLogger, TracingDecisionLogger,
};

pub use domain::{
    CrawlBudget, CrawlPlan, Decision, DomainHistory, FusionResult, MetaPlanError, OutcomeKind,
    PlanOrigin, PlanScore, PlanTarget, PlanningContext, PlanningOptions, PolicyOverrides,
    RationaleTag, Result, ScoreMetrics, ScoredPlan, Telemetry,
};

pub use effectiveness::{
    EffectivenessTracker, ExecutionKpis, ExecutionReport, ExecutionSample, PlanContribution,
    PreviewSample, RetentionPolicy,
};

pub use evaluator::{EvaluationInput, Evaluator, EvaluatorWeights, WeightedPlanEvaluator};

pub use experiment::{
    ArbitrationCase, ArmSummary, Experiment, ExperimentArm, ExperimentManager, ExperimentReport,
};

pub use fusion::{FusionRequest, Fuser, SafetyFirstFusion};

pub use metrics::METRICS;

pub use replay::{
    simulate_best_effort, DryRunSimulator, ReplayError, ReplayEstimate, ReplayReport,
    ReplayRequest, ReplayStep, ReplaySimulator,
};

pub use risk::{RiskMetrics, RiskScale, RiskScorer, RiskTier};

pub use telemetry::{init_tracing, LogFormat};

pub use validator::{
    IssueCode, SafetyPlanValidator, SafetyPolicy, ValidationIssue, ValidationResult, Validator,
};
