//! Crate-level error taxonomy for the arbitration engine.
//!
//! Only caller mistakes surface here. Validation failures, scoring gaps and
//! side-channel outages degrade into decision outcomes instead of errors.

/// Errors produced by the arbitration engine.
#[derive(Debug, thiserror::Error)]
pub enum MetaPlanError {
    #[error("nothing to arbitrate: no blueprint and no alternative plans supplied")]
    NothingToArbitrate,

    #[error("invalid threshold {name}: {value} (must be finite and within [0, 1])")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("experiment not found: {0}")]
    ExperimentNotFound(uuid::Uuid),

    #[error("experiment already registered: {0}")]
    DuplicateExperiment(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MetaPlanError>;

/// Reject a threshold that is NaN, infinite or outside `[0, 1]`.
pub(crate) fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MetaPlanError::InvalidThreshold { name, value })
    }
}
