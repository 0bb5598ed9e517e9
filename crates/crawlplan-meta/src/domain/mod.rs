//! Core value types shared by every arbitration component.

pub mod context;
pub mod decision;
pub mod error;
pub mod plan;
pub mod score;

pub use context::{DomainHistory, PlanningContext, PlanningOptions, PolicyOverrides, Telemetry};
pub use decision::{Decision, FusionResult, OutcomeKind, RationaleTag};
pub use error::{MetaPlanError, Result};
pub use plan::{CrawlBudget, CrawlPlan, PlanOrigin, PlanTarget};
pub use score::{PlanScore, ScoreMetrics, ScoredPlan};
