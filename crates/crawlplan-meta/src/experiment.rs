//! Out-of-band comparison of arbitration configurations.
//!
//! An experiment pits a control threshold set against variants. Recorded
//! arbitration cases are replayed through one arbitrator per arm and the
//! outcomes compared. Nothing here sits on the per-call hot path.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::arbitration::{Arbiter, ArbitrationInput, ArbitrationThresholds, PlanArbitrator};
use crate::decision_log::NoopDecisionLogger;
use crate::domain::{
    CrawlPlan, Decision, MetaPlanError, OutcomeKind, PlanScore, PlanningContext, Result,
    ScoredPlan,
};
use crate::fusion::{Fuser, SafetyFirstFusion};
use crate::validator::ValidationResult;

const DEFAULT_REPORT_CAPACITY: usize = 100;

/// One arbitration configuration under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentArm {
    pub name: String,
    #[serde(default)]
    pub thresholds: ArbitrationThresholds,
}

impl ExperimentArm {
    pub fn new(name: &str, thresholds: ArbitrationThresholds) -> Self {
        Self {
            name: name.into(),
            thresholds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub control: ExperimentArm,
    pub variants: Vec<ExperimentArm>,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    pub fn new(name: &str, control: ExperimentArm, variants: Vec<ExperimentArm>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            control,
            variants,
            created_at: Utc::now(),
        }
    }

    /// Control first, then variants in declaration order.
    pub fn arms(&self) -> impl Iterator<Item = &ExperimentArm> {
        std::iter::once(&self.control).chain(self.variants.iter())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MetaPlanError::InvalidConfig("experiment name is empty".into()));
        }
        let mut names = std::collections::HashSet::new();
        for arm in self.arms() {
            if arm.name.trim().is_empty() {
                return Err(MetaPlanError::InvalidConfig(format!(
                    "experiment '{}' has an unnamed arm",
                    self.name
                )));
            }
            if !names.insert(arm.name.as_str()) {
                return Err(MetaPlanError::InvalidConfig(format!(
                    "experiment '{}' repeats arm '{}'",
                    self.name, arm.name
                )));
            }
            arm.thresholds.validate()?;
        }
        Ok(())
    }
}

/// A recorded arbitration, replayable against any threshold set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationCase {
    pub label: String,
    #[serde(default)]
    pub microprolog_plan: Option<CrawlPlan>,
    #[serde(default)]
    pub alternative_plans: Vec<CrawlPlan>,
    #[serde(default)]
    pub micro_score: Option<PlanScore>,
    #[serde(default)]
    pub alt_scores: Vec<ScoredPlan>,
    pub validator_result: ValidationResult,
    pub context: PlanningContext,
}

impl ArbitrationCase {
    pub fn input(&self) -> ArbitrationInput<'_> {
        ArbitrationInput {
            microprolog_plan: self.microprolog_plan.as_ref(),
            alternative_plans: &self.alternative_plans,
            micro_score: self.micro_score.as_ref(),
            alt_scores: &self.alt_scores,
            validator_result: &self.validator_result,
            context: &self.context,
        }
    }
}

/// Aggregate behavior of one arm over all cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSummary {
    pub arm: String,
    pub cases: usize,
    pub outcomes: BTreeMap<OutcomeKind, usize>,
    pub mean_confidence: f64,
    /// Share of cases with the same outcome and chosen plan as control.
    pub agreement_with_control: f64,
    /// Labels of cases where this arm disagreed with control.
    pub divergent_cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: Uuid,
    pub experiment_name: String,
    pub generated_at: DateTime<Utc>,
    pub arms: Vec<ArmSummary>,
}

impl ExperimentReport {
    pub fn arm(&self, name: &str) -> Option<&ArmSummary> {
        self.arms.iter().find(|a| a.arm == name)
    }
}

/// Registry of experiments and their most recent reports.
pub struct ExperimentManager {
    fusion: Arc<dyn Fuser>,
    experiments: Mutex<HashMap<Uuid, Experiment>>,
    reports: Mutex<VecDeque<ExperimentReport>>,
    report_capacity: usize,
}

impl Default for ExperimentManager {
    fn default() -> Self {
        Self::new(Arc::new(SafetyFirstFusion::default()))
    }
}

impl ExperimentManager {
    pub fn new(fusion: Arc<dyn Fuser>) -> Self {
        Self {
            fusion,
            experiments: Mutex::new(HashMap::new()),
            reports: Mutex::new(VecDeque::new()),
            report_capacity: DEFAULT_REPORT_CAPACITY,
        }
    }

    pub fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    /// Register an experiment after validating every arm.
    pub fn register(&self, experiment: Experiment) -> Result<Uuid> {
        experiment.validate()?;
        let mut experiments = lock(&self.experiments);
        if experiments
            .values()
            .any(|e| e.name == experiment.name || e.id == experiment.id)
        {
            return Err(MetaPlanError::DuplicateExperiment(experiment.name));
        }
        let id = experiment.id;
        tracing::info!(
            event = "experiment.registered",
            experiment_id = %id,
            name = %experiment.name,
            arms = experiment.variants.len() + 1,
        );
        experiments.insert(id, experiment);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<Experiment> {
        lock(&self.experiments).get(&id).cloned()
    }

    /// Deterministically bucket `domain` into one arm of the experiment.
    pub fn assign_arm(&self, id: Uuid, domain: &str) -> Result<ExperimentArm> {
        let experiment = self.get(id).ok_or(MetaPlanError::ExperimentNotFound(id))?;
        let arms: Vec<&ExperimentArm> = experiment.arms().collect();

        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(domain.trim().to_ascii_lowercase().as_bytes());
        let digest = hasher.finalize();
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_be_bytes(bucket) % arms.len() as u64) as usize;
        tracing::debug!(
            event = "experiment.arm_assigned",
            experiment_id = %id,
            domain = %domain,
            bucket = %hex::encode(bucket),
            arm = %arms[index].name,
        );

        Ok(arms[index].clone())
    }

    /// Replay `cases` through every arm and compare against control.
    pub fn run(&self, id: Uuid, cases: &[ArbitrationCase]) -> Result<ExperimentReport> {
        let experiment = self.get(id).ok_or(MetaPlanError::ExperimentNotFound(id))?;

        let control_decisions = self.decide_all(&experiment.control, cases);
        let mut arms = Vec::with_capacity(experiment.variants.len() + 1);
        arms.push(summarize(&experiment.control, cases, &control_decisions, &control_decisions));
        for variant in &experiment.variants {
            let decisions = self.decide_all(variant, cases);
            arms.push(summarize(variant, cases, &decisions, &control_decisions));
        }

        let report = ExperimentReport {
            experiment_id: experiment.id,
            experiment_name: experiment.name.clone(),
            generated_at: Utc::now(),
            arms,
        };
        tracing::info!(
            event = "experiment.completed",
            experiment_id = %experiment.id,
            cases = cases.len(),
        );

        let mut reports = lock(&self.reports);
        reports.push_back(report.clone());
        while reports.len() > self.report_capacity {
            reports.pop_front();
        }
        Ok(report)
    }

    /// At most `limit` reports, most recent first.
    pub fn recent_reports(&self, limit: usize) -> Vec<ExperimentReport> {
        lock(&self.reports).iter().rev().take(limit).cloned().collect()
    }

    fn decide_all(&self, arm: &ExperimentArm, cases: &[ArbitrationCase]) -> Vec<Decision> {
        let arbitrator = PlanArbitrator::new(
            arm.thresholds,
            Arc::clone(&self.fusion),
            Arc::new(NoopDecisionLogger),
        );
        cases.iter().map(|c| arbitrator.decide(&c.input())).collect()
    }
}

fn summarize(
    arm: &ExperimentArm,
    cases: &[ArbitrationCase],
    decisions: &[Decision],
    control: &[Decision],
) -> ArmSummary {
    let mut outcomes = BTreeMap::new();
    let mut divergent_cases = Vec::new();
    for ((case, decision), baseline) in cases.iter().zip(decisions).zip(control) {
        *outcomes.entry(decision.outcome).or_insert(0) += 1;
        let agrees = decision.outcome == baseline.outcome
            && decision.chosen_plan_id() == baseline.chosen_plan_id();
        if !agrees {
            divergent_cases.push(case.label.clone());
        }
    }

    let n = decisions.len();
    let (mean_confidence, agreement_with_control) = if n == 0 {
        (0.0, 1.0)
    } else {
        (
            decisions.iter().map(|d| d.confidence).sum::<f64>() / n as f64,
            (n - divergent_cases.len()) as f64 / n as f64,
        )
    };

    ArmSummary {
        arm: arm.name.clone(),
        cases: n,
        outcomes,
        mean_confidence,
        agreement_with_control,
        divergent_cases,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
