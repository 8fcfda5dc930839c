//! What a run did, stage by stage.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use super::cleanup::CleanupReport;
use super::failure_tolerance::FailureSummary;
use crate::core::{CaseId, RegistrationMode, StageId, StageStatus};
use crate::transform::HardenSummary;

/// How the executor handled one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    /// Outputs were already in place; nothing ran.
    Skipped,
    /// The stage's steps ran.
    Executed,
    /// The run halted before reaching the stage.
    NotReached,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    /// The stage.
    pub stage: StageId,
    /// Status after the stage was handled.
    pub status: StageStatus,
    /// Whether it ran, was skipped or never reached.
    pub disposition: StageDisposition,
    /// Tool processes started for this stage.
    pub invocations: usize,
    /// Wall time spent on the stage.
    pub duration: Duration,
    /// Transform passes run by the stage.
    pub harden: Vec<HardenSummary>,
    /// Failure message, if the stage failed.
    pub error: Option<String>,
}

impl StageOutcome {
    pub(crate) fn new(stage: StageId, disposition: StageDisposition, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            disposition,
            invocations: 0,
            duration: Duration::ZERO,
            harden: Vec::new(),
            error: None,
        }
    }

    /// Returns true if the stage's steps ran.
    #[must_use]
    pub fn executed(&self) -> bool {
        self.disposition == StageDisposition::Executed
    }
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Manifest run identifier.
    pub run_id: Uuid,
    /// Case processed.
    pub case: CaseId,
    /// Registration mode.
    pub mode: RegistrationMode,
    /// Outcome of every stage, in order.
    pub stages: Vec<StageOutcome>,
    /// Failures recorded along the way.
    pub failures: FailureSummary,
    /// What cleanup removed, if it ran.
    pub cleanup: Option<CleanupReport>,
    /// Anatomical tract files present at the end of the run.
    pub anatomical_tracts: Vec<PathBuf>,
    /// True if the run stopped early on a failed stage.
    pub halted: bool,
    /// Total wall time.
    pub duration: Duration,
}

impl RunReport {
    /// Stages visited, in order.
    #[must_use]
    pub fn visited(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|o| o.disposition != StageDisposition::NotReached)
            .map(|o| o.stage)
            .collect()
    }

    /// Outcome of one stage.
    #[must_use]
    pub fn outcome(&self, stage: StageId) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| o.stage == stage)
    }

    /// Total tool processes started.
    #[must_use]
    pub fn total_invocations(&self) -> usize {
        self.stages.iter().map(|o| o.invocations).sum()
    }

    /// Returns true if every stage verified and nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.halted && !self.failures.has_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailureRecord;

    fn report(stages: Vec<StageOutcome>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            case: CaseId::new("subj01").unwrap(),
            mode: RegistrationMode::Affine,
            stages,
            failures: FailureSummary::new(10),
            cleanup: None,
            anatomical_tracts: Vec::new(),
            halted: false,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_visited_excludes_unreached() {
        let mut ran = StageOutcome::new(StageId::Registration, StageDisposition::Executed, StageStatus::Complete);
        ran.invocations = 2;
        let skipped = StageOutcome::new(StageId::FiberClustering, StageDisposition::Skipped, StageStatus::Complete);
        let unreached = StageOutcome::new(StageId::OutlierRemoval, StageDisposition::NotReached, StageStatus::Pending);

        let r = report(vec![ran, skipped, unreached]);
        assert_eq!(r.visited(), vec![StageId::Registration, StageId::FiberClustering]);
        assert_eq!(r.total_invocations(), 2);
        assert!(r.outcome(StageId::Registration).unwrap().executed());
        assert!(r.is_success());
    }

    #[test]
    fn test_failures_mark_unsuccessful() {
        let mut r = report(Vec::new());
        r.failures.failures.push(FailureRecord::new(StageId::TractAppend, "short"));
        assert!(!r.is_success());
    }
}
