//! Side-effect free probes of expected stage outputs.

use glob::Pattern;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

use crate::core::{ArtifactExpectation, StageId};
use crate::errors::ValidationError;

/// Counts the directory entries of `dir` whose names match `pattern`.
///
/// Only regular files directly inside `dir` are counted. A missing directory
/// counts as zero; nothing is ever created.
#[must_use]
pub fn count_matching(dir: &Path, pattern: &str) -> usize {
    let pattern = match Pattern::new(pattern) {
        Ok(p) => p,
        Err(e) => {
            warn!(pattern, error = %e, "Invalid artifact pattern");
            return 0;
        }
    };

    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_str().is_some_and(|name| pattern.matches(name)))
        .count()
}

/// Returns true if a single expectation is met on disk.
#[must_use]
pub fn is_complete(expectation: &ArtifactExpectation) -> bool {
    ArtifactState::probe(expectation).complete
}

/// Observed state of one expected artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactState {
    /// What was expected.
    pub expectation: ArtifactExpectation,
    /// Number of matching files found (0 or 1 for single files).
    pub found: usize,
    /// Whether the expectation is met.
    pub complete: bool,
}

impl ArtifactState {
    /// Probes the filesystem for an expectation.
    #[must_use]
    pub fn probe(expectation: &ArtifactExpectation) -> Self {
        let (found, complete) = match expectation {
            ArtifactExpectation::File { path } => {
                let exists = path.is_file();
                (usize::from(exists), exists)
            }
            ArtifactExpectation::Files {
                dir,
                pattern,
                min_count,
            } => {
                let found = count_matching(dir, pattern);
                (found, found >= *min_count)
            }
        };

        Self {
            expectation: expectation.clone(),
            found,
            complete,
        }
    }

    fn describe_found(&self) -> String {
        match &self.expectation {
            ArtifactExpectation::File { path } if self.complete => format!("{}", path.display()),
            ArtifactExpectation::File { path } => format!("no {}", path.display()),
            ArtifactExpectation::Files { dir, .. } => {
                format!("{} in {}", self.found, dir.display())
            }
        }
    }
}

/// Result of checking every declared output of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointReport {
    /// The stage checked.
    pub stage: StageId,
    /// Per-artifact observations.
    pub artifacts: Vec<ArtifactState>,
}

impl CheckpointReport {
    /// Returns true if every declared artifact is present and complete.
    ///
    /// A stage with no declared artifacts is never complete on its own.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.artifacts.is_empty() && self.artifacts.iter().all(|a| a.complete)
    }

    /// Artifacts that are still missing or short.
    pub fn missing(&self) -> impl Iterator<Item = &ArtifactState> {
        self.artifacts.iter().filter(|a| !a.complete)
    }

    /// Builds the validation error describing expected vs. actual.
    #[must_use]
    pub fn to_validation_error(&self) -> ValidationError {
        let expected = self
            .missing()
            .map(|a| a.expectation.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let actual = self
            .missing()
            .map(ArtifactState::describe_found)
            .collect::<Vec<_>>()
            .join("; ");
        ValidationError::new(self.stage, expected, actual)
    }
}

/// Checkpoint evaluation for stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCheckpoint;

impl StageCheckpoint {
    /// Probes every expectation of a stage.
    #[must_use]
    pub fn inspect(stage: StageId, expected: &[ArtifactExpectation]) -> CheckpointReport {
        CheckpointReport {
            stage,
            artifacts: expected.iter().map(ArtifactState::probe).collect(),
        }
    }

    /// Returns true if a stage's outputs are all present and complete.
    #[must_use]
    pub fn is_complete(stage: StageId, expected: &[ArtifactExpectation]) -> bool {
        Self::inspect(stage, expected).is_complete()
    }
}
