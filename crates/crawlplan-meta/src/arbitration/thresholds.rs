//! Arbitration thresholds.
//!
//! An immutable value built once and handed to the arbitrator. Every bound
//! is inclusive (`>=`).

use serde::{Deserialize, Serialize};

use crate::domain::error::{check_unit, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationThresholds {
    /// Minimum total score to accept a plan outright.
    pub accept_score: f64,
    /// Minimum explainability for accepting the microprolog plan.
    pub explainability: f64,
    /// Minimum precision proxy for accepting the microprolog plan.
    pub precision: f64,
    /// Microprolog total score from which fusion is attempted.
    pub fuse_lower: f64,
    /// Confidence below which fusion is attempted regardless of score.
    pub confidence_min: f64,
    /// Safety margin floor handed to fusion.
    pub microprolog_floor: f64,
}

impl Default for ArbitrationThresholds {
    fn default() -> Self {
        Self {
            accept_score: 0.7,
            explainability: 0.6,
            precision: 0.6,
            fuse_lower: 0.5,
            confidence_min: 0.5,
            microprolog_floor: 0.2,
        }
    }
}

impl ArbitrationThresholds {
    pub fn validate(&self) -> Result<()> {
        check_unit("accept_score", self.accept_score)?;
        check_unit("explainability", self.explainability)?;
        check_unit("precision", self.precision)?;
        check_unit("fuse_lower", self.fuse_lower)?;
        check_unit("confidence_min", self.confidence_min)?;
        check_unit("microprolog_floor", self.microprolog_floor)?;
        Ok(())
    }

    pub fn with_accept_score(mut self, value: f64) -> Self {
        self.accept_score = value;
        self
    }

    pub fn with_explainability(mut self, value: f64) -> Self {
        self.explainability = value;
        self
    }

    pub fn with_precision(mut self, value: f64) -> Self {
        self.precision = value;
        self
    }

    pub fn with_fuse_lower(mut self, value: f64) -> Self {
        self.fuse_lower = value;
        self
    }

    pub fn with_confidence_min(mut self, value: f64) -> Self {
        self.confidence_min = value;
        self
    }

    pub fn with_microprolog_floor(mut self, value: f64) -> Self {
        self.microprolog_floor = value;
        self
    }
}
