//! File-backed engine configuration.
//!
//! Every section is optional; missing keys keep their defaults. Files ending
//! in `.json` are parsed as JSON, anything else as TOML.
//!
//! ```toml
//! [arbitration]
//! accept_score = 0.75
//!
//! [coordinator]
//! microprolog_enabled = true
//!
//! [decision_log.sink]
//! kind = "jsonl"
//! path = "/var/log/crawlplan/decisions.jsonl"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arbitration::ArbitrationThresholds;
use crate::coordinator::CoordinatorConfig;
use crate::decision_log::{
    DecisionLogger, JsonlDecisionLogger, NoopDecisionLogger, TracingDecisionLogger,
};
use crate::domain::error::check_unit;
use crate::domain::{MetaPlanError, Result};
use crate::effectiveness::RetentionPolicy;
use crate::evaluator::EvaluatorWeights;
use crate::risk::RiskScale;
use crate::validator::SafetyPolicy;

/// Where decision audit records go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionLogSink {
    Noop,
    #[default]
    Tracing,
    Jsonl {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionLogConfig {
    pub sink: DecisionLogSink,
}

impl DecisionLogConfig {
    /// Build the configured sink. A JSONL sink gets its parent directory
    /// created here so a bad path fails at startup, not on the first write.
    pub fn build_decision_logger(&self) -> Result<Arc<dyn DecisionLogger>> {
        let logger: Arc<dyn DecisionLogger> = match &self.sink {
            DecisionLogSink::Noop => Arc::new(NoopDecisionLogger),
            DecisionLogSink::Tracing => Arc::new(TracingDecisionLogger),
            DecisionLogSink::Jsonl { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(JsonlDecisionLogger::new(path.clone()))
            }
        };
        Ok(logger)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaPlannerConfig {
    pub arbitration: ArbitrationThresholds,
    pub safety: SafetyPolicy,
    pub evaluator: EvaluatorWeights,
    pub risk: RiskScale,
    pub retention: RetentionPolicy,
    pub coordinator: CoordinatorConfig,
    pub decision_log: DecisionLogConfig,
}

impl MetaPlannerConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_toml_str(&raw)
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to print the effective defaults.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MetaPlanError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.arbitration.validate()?;

        check_unit("safety.max_overall_risk", self.safety.max_overall_risk)?;
        check_unit("safety.max_error_rate", self.safety.max_error_rate)?;

        let w = &self.evaluator;
        for (name, value) in [
            ("evaluator.structural", w.structural),
            ("evaluator.historical", w.historical),
            ("evaluator.telemetry", w.telemetry),
            ("evaluator.history_saturation", w.history_saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MetaPlanError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if w.structural + w.historical + w.telemetry <= 0.0 {
            return Err(MetaPlanError::InvalidConfig(
                "evaluator weights must not all be zero".into(),
            ));
        }
        positive("evaluator.recency_half_life_hours", w.recency_half_life_hours)?;

        positive("risk.volume_ceiling", self.risk.volume_ceiling)?;
        positive("risk.rate_ceiling_rps", self.risk.rate_ceiling_rps)?;
        positive("risk.depth_ceiling", self.risk.depth_ceiling)?;
        positive("risk.breadth_ceiling", self.risk.breadth_ceiling)?;

        if self.coordinator.replay_timeout_ms == 0 {
            return Err(MetaPlanError::InvalidConfig(
                "coordinator.replay_timeout_ms must be positive".into(),
            ));
        }
        if self.coordinator.history_limit == 0 {
            return Err(MetaPlanError::InvalidConfig(
                "coordinator.history_limit must be positive".into(),
            ));
        }
        if let DecisionLogSink::Jsonl { path } = &self.decision_log.sink {
            if path.as_os_str().is_empty() {
                return Err(MetaPlanError::InvalidConfig(
                    "decision_log.sink.path is empty".into(),
                ));
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MetaPlanError::InvalidConfig(format!(
            "{name} must be finite and positive, got {value}"
        )))
    }
}
