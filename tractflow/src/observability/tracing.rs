//! Spans and timing for runs and stages.

use std::time::{Duration, Instant};
use tracing::{info_span, Span};

use crate::core::{CaseId, RegistrationMode, StageId};

/// Span covering a whole run.
#[must_use]
pub fn run_span(case: &CaseId, mode: RegistrationMode) -> Span {
    info_span!("run", case = %case, mode = %mode)
}

/// Span covering one stage.
#[must_use]
pub fn stage_span(stage: StageId) -> Span {
    info_span!("stage", stage = %stage, ordinal = stage.ordinal())
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> Duration {
        self.start.elapsed()
    }
}
