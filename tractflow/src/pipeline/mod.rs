//! Pipeline building and execution.
//!
//! This module provides:
//! - Step plans for each stage
//! - The sequential executor and its builder
//! - Validation policy and failure records
//! - Cleanup of intermediate artifacts

mod builder;
mod cleanup;
mod executor;
mod failure_tolerance;
mod report;
mod stages;


pub use builder::PipelineBuilder;
pub use cleanup::{CleanupPolicy, CleanupReport, Retention};
pub use executor::{clean_output, inspect_output, PipelineExecutor, StageState};
pub use failure_tolerance::{FailureCollector, FailureRecord, FailureSummary, ValidationPolicy};
pub use report::{RunReport, StageDisposition, StageOutcome};
pub use stages::{StagePlanner, Step, StepAction};
