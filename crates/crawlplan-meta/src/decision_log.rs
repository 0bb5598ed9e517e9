//! Audit sinks for arbitration outcomes.
//!
//! Logging is best effort. A sink reports failure through
//! [`DecisionLogError`]; the arbitrator warns and carries on.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Decision, OutcomeKind, PlanningContext, RationaleTag};
use crate::validator::ValidationResult;

#[derive(Debug, Error)]
pub enum DecisionLogError {
    #[error("decision log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decision log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("decision log unavailable: {0}")]
    Unavailable(String),
}

/// Inputs summarized alongside a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionLogContext {
    pub validator_valid: bool,
    pub issue_count: usize,
    pub alternatives: usize,
    pub microprolog_present: bool,
}

/// Write-once audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub decision_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub outcome: OutcomeKind,
    pub confidence: f64,
    pub rationale: Vec<RationaleTag>,
    pub chosen_plan_id: Option<String>,
    pub fused: bool,
    pub context: DecisionLogContext,
}

impl DecisionLogEntry {
    pub fn new(
        decision: &Decision,
        validator_result: &ValidationResult,
        context: &PlanningContext,
        alternatives: usize,
        microprolog_present: bool,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            domain: context.domain().to_string(),
            outcome: decision.outcome,
            confidence: decision.confidence,
            rationale: decision.rationale.clone(),
            chosen_plan_id: decision.chosen_plan_id().map(str::to_string),
            fused: decision.fused_plan.is_some(),
            context: DecisionLogContext {
                validator_valid: validator_result.valid,
                issue_count: validator_result.issues.len(),
                alternatives,
                microprolog_present,
            },
        }
    }
}

/// Persists decision audit records.
pub trait DecisionLogger: Send + Sync {
    fn log(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError>;
}

/// Discards every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDecisionLogger;

impl DecisionLogger for NoopDecisionLogger {
    fn log(&self, _entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        Ok(())
    }
}

/// Emits each entry as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDecisionLogger;

impl DecisionLogger for TracingDecisionLogger {
    fn log(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        let rationale = entry
            .rationale
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(
            event = "decision.logged",
            decision_id = %entry.decision_id,
            domain = %entry.domain,
            outcome = %entry.outcome,
            confidence = entry.confidence,
            rationale = %rationale,
            chosen_plan_id = entry.chosen_plan_id.as_deref().unwrap_or("none"),
            fused = entry.fused,
        );
        Ok(())
    }
}

/// Appends entries to a newline-delimited JSON file.
///
/// `log` opens the file and writes synchronously on the caller's thread,
/// including from inside `MetaPlanCoordinator::process`. Point it at local
/// disk; a slow filesystem stalls the runtime worker for each decision.
#[derive(Debug)]
pub struct JsonlDecisionLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDecisionLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DecisionLogger for JsonlDecisionLogger {
    fn log(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Read back every entry of a JSONL decision log, oldest first.
pub fn read_decision_log(path: &Path) -> Result<Vec<DecisionLogEntry>, DecisionLogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

/// Keeps the latest `capacity` entries in memory.
#[derive(Debug)]
pub struct MemoryDecisionLogger {
    capacity: usize,
    entries: Mutex<VecDeque<DecisionLogEntry>>,
}

impl MemoryDecisionLogger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// At most `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<DecisionLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionLogger for MemoryDecisionLogger {
    fn log(&self, entry: &DecisionLogEntry) -> Result<(), DecisionLogError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }
}
