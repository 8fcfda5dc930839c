//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The recorded status of a stage in the run manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not run yet.
    Pending,
    /// Stage was started and has not finished.
    ///
    /// Seen on load only when a previous run was interrupted mid-stage.
    Running,
    /// Stage outputs were produced and verified.
    Complete,
    /// Stage ran but its outputs failed verification.
    Failed,
    /// Stage completed and its intermediates were removed by cleanup.
    Pruned,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Pruned => write!(f, "pruned"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a finished stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Pruned)
    }

    /// Returns true if the stage finished successfully at some point.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete | Self::Pruned)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if a previous run was interrupted while this stage ran.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        matches!(self, Self::Running)
    }
}
