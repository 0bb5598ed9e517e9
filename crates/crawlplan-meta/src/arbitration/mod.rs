//! The plan arbitration state machine and its threshold configuration.

pub mod arbitrator;
pub mod thresholds;

pub use arbitrator::{Arbiter, ArbitrationInput, PlanArbitrator};
pub use thresholds::ArbitrationThresholds;
