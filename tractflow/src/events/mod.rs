//! Pipeline events.
//!
//! Every stage transition, tool output line and cleanup action is emitted as
//! a named event with a JSON payload. The executor holds one sink; the
//! default sink writes events to the log.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage started executing.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage was already complete and was not run.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage ran and its outputs verified.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage ran but its outputs did not verify.
pub const STAGE_FAILED: &str = "stage.failed";
/// One step of a stage started.
pub const STEP_STARTED: &str = "step.started";
/// One line of combined tool output.
pub const TOOL_OUTPUT: &str = "tool.output";
/// A tool process exited.
pub const TOOL_EXITED: &str = "tool.exited";
/// A harden pass finished.
pub const TRANSFORM_PASS: &str = "transform.pass";
/// Cleanup removed a path.
pub const CLEANUP_REMOVED: &str = "cleanup.removed";
/// The run finished.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
