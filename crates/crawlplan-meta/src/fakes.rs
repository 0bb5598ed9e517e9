//! Test doubles for the arbitration collaborators.
//!
//! Each fake satisfies one trait with fixed, inspectable behavior so the
//! arbitrator and coordinator can be exercised without real fusion, sinks or
//! simulators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::decision_log::{DecisionLogEntry, DecisionLogError, DecisionLogger};
use crate::domain::FusionResult;
use crate::fusion::{FusionRequest, Fuser};
use crate::replay::{ReplayError, ReplayEstimate, ReplayRequest, ReplaySimulator};

/// Returns the same fusion result on every call and counts calls.
#[derive(Debug, Default)]
pub struct FixedFuser {
    result: Option<FusionResult>,
    calls: AtomicUsize,
}

impl FixedFuser {
    pub fn returning(result: FusionResult) -> Self {
        Self {
            result: Some(result),
            calls: AtomicUsize::new(0),
        }
    }

    /// A fuser that never finds a viable combination.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fuser for FixedFuser {
    fn fuse(&self, _request: &FusionRequest<'_>) -> Option<FusionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Fails every write and counts attempts.
#[derive(Debug, Default)]
pub struct FailingDecisionLogger {
    attempts: AtomicUsize,
}

impl FailingDecisionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DecisionLogger for FailingDecisionLogger {
    fn log(&self, _entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DecisionLogError::Unavailable("sink offline".into()))
    }
}

/// Always errors.
#[derive(Debug, Default)]
pub struct FailingReplaySimulator;

#[async_trait]
impl ReplaySimulator for FailingReplaySimulator {
    async fn simulate(&self, _request: &ReplayRequest) -> Result<ReplayEstimate, ReplayError> {
        Err(ReplayError::Failed("simulator crashed".into()))
    }
}

/// Sleeps before answering with an empty estimate.
#[derive(Debug)]
pub struct SlowReplaySimulator {
    pub delay: Duration,
}

impl SlowReplaySimulator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ReplaySimulator for SlowReplaySimulator {
    async fn simulate(&self, request: &ReplayRequest) -> Result<ReplayEstimate, ReplayError> {
        tokio::time::sleep(self.delay).await;
        Ok(ReplayEstimate {
            plan_id: request.blueprint.id.clone(),
            domain: request.domain.clone(),
            expected_requests: 0,
            expected_successes: 0.0,
            expected_errors: 0.0,
            expected_relevant: 0.0,
            estimated_duration_ms: 0,
            steps: Vec::new(),
        })
    }
}
