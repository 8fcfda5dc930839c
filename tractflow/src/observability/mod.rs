//! Logging setup and timing helpers.

mod logging;
mod tracing;

pub use self::logging::{init_logging, level_for_verbosity, LogFormat};
pub use self::tracing::{run_span, stage_span, SpanTimer};
