//! Failure tolerance for stage validation.
//!
//! A stage whose outputs do not verify is recorded as a failure. The
//! validation policy then decides whether the remaining stages still run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::StageId;
use crate::errors::{TractflowError, ValidationError};
use crate::utils::iso_timestamp;

/// How to handle a stage whose outputs did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Stop the pipeline at the first failed stage (default).
    #[default]
    Strict,
    /// Log the failure and carry on with the next stage.
    WarnAndContinue,
}

impl std::fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::WarnAndContinue => f.write_str("warn_and_continue"),
        }
    }
}

/// Record of a stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failed stage.
    pub stage: StageId,
    /// Error message.
    pub error: String,
    /// Error category (`validation`, `resolution`, ...).
    pub error_type: String,
    /// Whether a re-run can be expected to fix it.
    pub recoverable: bool,
    /// When the failure was recorded.
    pub timestamp: String,
    /// Additional context.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(stage: StageId, error: impl Into<String>) -> Self {
        Self {
            stage,
            error: error.into(),
            error_type: "error".to_string(),
            recoverable: false,
            timestamp: iso_timestamp(),
            context: BTreeMap::new(),
        }
    }

    /// Records outputs that were still missing after the stage ran.
    #[must_use]
    pub fn validation(error: &ValidationError) -> Self {
        Self::new(error.stage, error.to_string())
            .with_error_type("validation")
            .recoverable()
            .with_context("expected", serde_json::json!(error.expected))
            .with_context("actual", serde_json::json!(error.actual))
    }

    /// Sets the error type.
    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    /// Marks as recoverable.
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    /// Adds context.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Attaches the error that interrupted the stage's steps.
    #[must_use]
    pub fn with_cause(self, cause: &TractflowError) -> Self {
        let kind = match cause {
            TractflowError::Resolution(_) => "resolution",
            TractflowError::Validation(_) => "validation",
            _ => "error",
        };
        self.with_context("cause", serde_json::json!(cause.to_string()))
            .with_context("cause_type", serde_json::json!(kind))
    }
}

/// Summary of failures during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Number of stages considered.
    pub total_stages: usize,
    /// Number of stages that verified.
    pub completed_stages: usize,
    /// Number of stages that failed.
    pub failed_stages: usize,
    /// List of failure records.
    pub failures: Vec<FailureRecord>,
}

impl FailureSummary {
    /// Creates a new failure summary.
    #[must_use]
    pub fn new(total_stages: usize) -> Self {
        Self {
            total_stages,
            ..Self::default()
        }
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Collects failures during a run and applies the validation policy.
#[derive(Debug)]
pub struct FailureCollector {
    /// Validation policy.
    pub policy: ValidationPolicy,
    failures: Vec<FailureRecord>,
    failed_stages: BTreeSet<StageId>,
    completed_stages: BTreeSet<StageId>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            failures: Vec::new(),
            failed_stages: BTreeSet::new(),
            completed_stages: BTreeSet::new(),
        }
    }

    /// Records a stage failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.completed_stages.remove(&record.stage);
        self.failed_stages.insert(record.stage);
        self.failures.push(record);
    }

    /// Records a stage completion.
    pub fn record_completion(&mut self, stage: StageId) {
        self.completed_stages.insert(stage);
    }

    /// Returns true if execution should stop based on the policy.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.policy {
            ValidationPolicy::Strict => !self.failures.is_empty(),
            ValidationPolicy::WarnAndContinue => false,
        }
    }

    /// Creates a summary of the execution.
    #[must_use]
    pub fn summary(&self, total_stages: usize) -> FailureSummary {
        FailureSummary {
            total_stages,
            completed_stages: self.completed_stages.len(),
            failed_stages: self.failed_stages.len(),
            failures: self.failures.clone(),
        }
    }

    /// Returns all failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }
}

impl Default for FailureCollector {
    fn default() -> Self {
        Self::new(ValidationPolicy::default())
    }
}
