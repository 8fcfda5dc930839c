//! Sequential execution of the fixed stage list.
//!
//! Every stage goes through the same transition: probe its outputs, skip it
//! when they already verify, otherwise run its steps and probe again. The
//! manifest next to the outputs records each transition so an interrupted
//! run can be told apart from a finished one.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use super::cleanup::{CleanupPolicy, CleanupReport};
use super::failure_tolerance::{FailureCollector, FailureRecord};
use super::report::{RunReport, StageDisposition, StageOutcome};
use super::stages::{StagePlanner, Step, StepAction};
use crate::cancellation::CancellationToken;
use crate::checkpoint::{count_matching, CheckpointReport, ManifestError, RunManifest, StageCheckpoint};
use crate::config::RunConfiguration;
use crate::core::{StageId, StageStatus};
use crate::errors::{ResolutionError, TractflowError, ValidationError};
use crate::events::{
    EventSink, CLEANUP_REMOVED, PIPELINE_COMPLETED, STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED,
    STAGE_STARTED, STEP_STARTED, TRANSFORM_PASS,
};
use crate::observability::{run_span, stage_span, SpanTimer};
use crate::paths::PathPlanner;
use crate::tools::ToolInvoker;
use crate::transform::{is_mesh_file, run_pass, MeshTransformer};
use crate::utils::format_duration;

/// Stages whose completion allows cleanup to run.
const MEASUREMENT_STAGES: [StageId; 2] = [StageId::DiffusionMeasurement, StageId::AnatomicalTractMeasurement];

/// Runs the parcellation pipeline for one case.
pub struct PipelineExecutor {
    config: RunConfiguration,
    plans: StagePlanner,
    invoker: Arc<dyn ToolInvoker>,
    transformer: Arc<dyn MeshTransformer>,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("config", &self.config)
            .field("plans", &self.plans)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    pub(crate) fn new(
        config: RunConfiguration,
        plans: StagePlanner,
        invoker: Arc<dyn ToolInvoker>,
        transformer: Arc<dyn MeshTransformer>,
        sink: Arc<dyn EventSink>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            config,
            plans,
            invoker,
            transformer,
            sink,
            cancel,
        }
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// The run's output layout.
    #[must_use]
    pub fn paths(&self) -> &PathPlanner {
        self.plans.paths()
    }

    /// Steps a stage would run.
    ///
    /// # Errors
    ///
    /// Returns an error if a script the stage needs is not installed.
    pub fn plan(&self, stage: StageId) -> Result<Vec<Step>, ResolutionError> {
        self.plans.steps(stage)
    }

    /// Runs every stage in order and cleans up.
    ///
    /// # Errors
    ///
    /// Returns an error if a process cannot be launched, the manifest or
    /// output root cannot be written, or the run is cancelled. Stages whose
    /// outputs do not verify are reported in the [`RunReport`] instead.
    pub async fn run(&self) -> Result<RunReport, TractflowError> {
        let span = run_span(self.config.case(), self.config.mode());
        self.execute().instrument(span).await
    }

    async fn execute(&self) -> Result<RunReport, TractflowError> {
        let timer = SpanTimer::start("run");
        let paths = self.plans.paths();
        std::fs::create_dir_all(paths.output_root())?;
        self.notice_existing_results();

        let manifest_path = paths.manifest_path();
        let mut manifest = RunManifest::load_or_new(
            &manifest_path,
            self.config.case(),
            self.config.mode(),
            self.config.input(),
        )?;
        manifest.save(&manifest_path)?;

        info!(
            run_id = %manifest.run_id,
            input = %self.config.input().display(),
            output = %paths.output_root().display(),
            threads = self.config.threads(),
            policy = %self.config.validation_policy(),
            "Starting pipeline"
        );

        let mut collector = FailureCollector::new(self.config.validation_policy());
        let mut outcomes = Vec::with_capacity(StageId::ALL.len());
        let mut halted = false;

        for stage in StageId::ALL.into_iter().filter(|s| *s != StageId::Cleanup) {
            if halted {
                outcomes.push(StageOutcome::new(stage, StageDisposition::NotReached, manifest.status(stage)));
                continue;
            }
            self.check_cancelled()?;

            let outcome = self
                .run_stage(stage, &mut manifest, &mut collector)
                .instrument(stage_span(stage))
                .await?;
            outcomes.push(outcome);

            if collector.should_stop() {
                error!(stage = %stage, "Halting pipeline; later stages depend on this output");
                halted = true;
            }
        }

        let (cleanup_outcome, cleanup) = self
            .run_cleanup(&mut manifest)
            .instrument(stage_span(StageId::Cleanup))
            .await;
        outcomes.push(cleanup_outcome);
        manifest.save(&manifest_path)?;

        let report = RunReport {
            run_id: manifest.run_id,
            case: self.config.case().clone(),
            mode: self.config.mode(),
            stages: outcomes,
            failures: collector.summary(StageId::ALL.len() - 1),
            cleanup,
            anatomical_tracts: produced_tracts(&paths.anatomical_tracts()),
            halted,
            duration: timer.finish(),
        };

        info!(
            invocations = report.total_invocations(),
            failures = report.failures.failures.len(),
            halted,
            duration = %format_duration(report.duration),
            "Pipeline finished"
        );
        self.sink
            .emit(
                PIPELINE_COMPLETED,
                Some(json!({
                    "run_id": report.run_id.to_string(),
                    "case": report.case.as_str(),
                    "success": report.is_success(),
                    "halted": halted,
                    "invocations": report.total_invocations(),
                    "duration_ms": millis(report.duration),
                })),
            )
            .await;
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: StageId,
        manifest: &mut RunManifest,
        collector: &mut FailureCollector,
    ) -> Result<StageOutcome, TractflowError> {
        let timer = SpanTimer::start(stage.name());
        let paths = self.plans.paths();
        let manifest_path = paths.manifest_path();
        let expected = paths.expected_outputs(stage);

        if self.already_done(stage, manifest) {
            let status = match manifest.status(stage) {
                StageStatus::Pruned => StageStatus::Pruned,
                StageStatus::Complete => StageStatus::Complete,
                _ => {
                    manifest.mark_complete(stage);
                    StageStatus::Complete
                }
            };
            info!(stage = %stage, status = %status, "{} already done", stage.description());
            collector.record_completion(stage);
            self.sink
                .emit(STAGE_SKIPPED, Some(json!({ "stage": stage.name(), "status": status })))
                .await;

            let mut outcome = StageOutcome::new(stage, StageDisposition::Skipped, status);
            outcome.duration = timer.finish();
            return Ok(outcome);
        }

        info!(stage = %stage, ordinal = stage.ordinal() + 1, "{}", stage.description());
        manifest.mark_running(stage);
        manifest.save(&manifest_path)?;
        let attempt = manifest.record(stage).map_or(1, |r| r.attempts);
        self.sink
            .emit(
                STAGE_STARTED,
                Some(json!({
                    "stage": stage.name(),
                    "description": stage.description(),
                    "attempt": attempt,
                })),
            )
            .await;

        let mut outcome = StageOutcome::new(stage, StageDisposition::Executed, StageStatus::Running);
        let interrupted = match self.run_steps(stage, &mut outcome).await {
            Ok(()) => None,
            Err(e) if e.is_fatal() => {
                // A cancelled stage stays Running so the next run redoes it.
                if !matches!(e, TractflowError::Cancelled(_)) {
                    manifest.mark_failed(stage, e.to_string());
                }
                if let Err(save) = manifest.save(&manifest_path) {
                    warn!(error = %save, "Failed to record stage failure");
                }
                self.sink
                    .emit(STAGE_FAILED, Some(json!({ "stage": stage.name(), "error": e.to_string(), "fatal": true })))
                    .await;
                return Err(e);
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "Stage steps did not all run");
                Some(e)
            }
        };

        let check = StageCheckpoint::inspect(stage, &expected);
        outcome.duration = timer.finish();
        if check.is_complete() {
            manifest.mark_complete(stage);
            collector.record_completion(stage);
            outcome.status = StageStatus::Complete;
            info!(
                stage = %stage,
                invocations = outcome.invocations,
                duration = %format_duration(outcome.duration),
                "{} has been done",
                stage.description()
            );
            self.sink
                .emit(
                    STAGE_COMPLETED,
                    Some(json!({
                        "stage": stage.name(),
                        "invocations": outcome.invocations,
                        "duration_ms": millis(outcome.duration),
                    })),
                )
                .await;
        } else {
            let err = check.to_validation_error();
            error!(
                stage = %stage,
                expected = %err.expected,
                actual = %err.actual,
                "{} failed",
                stage.description()
            );
            let mut record = FailureRecord::validation(&err);
            if let Some(cause) = &interrupted {
                record = record.with_cause(cause);
            }
            collector.record_failure(record);
            manifest.mark_failed(stage, err.to_string());
            outcome.status = StageStatus::Failed;
            outcome.error = Some(err.to_string());
            self.sink
                .emit(
                    STAGE_FAILED,
                    Some(json!({
                        "stage": stage.name(),
                        "expected": err.expected,
                        "actual": err.actual,
                        "fatal": false,
                    })),
                )
                .await;
        }
        manifest.save(&manifest_path)?;
        Ok(outcome)
    }

    async fn run_steps(&self, stage: StageId, outcome: &mut StageOutcome) -> Result<(), TractflowError> {
        let steps = self.plans.steps(stage)?;

        for step in &steps {
            self.check_cancelled()?;
            if let Some(required) = &step.requires {
                if !required.exists() {
                    return Err(ValidationError::new(stage, required.display().to_string(), "missing").into());
                }
            }

            debug!(step = %step, "Starting step");
            self.sink
                .emit(STEP_STARTED, Some(json!({ "stage": stage.name(), "step": step.name })))
                .await;

            match &step.action {
                StepAction::Run(invocation) => {
                    info!(command = %invocation, "Running {}", invocation.tool().script_name());
                    let result = self.invoker.invoke(invocation).await?;
                    outcome.invocations += 1;
                    if !result.success() {
                        warn!(step = %step.name, exit = %result.exit, "Tool reported failure");
                    }
                }
                StepAction::Harden(pass) => {
                    let summary = run_pass(pass, self.transformer.as_ref(), self.config.threads()).await?;
                    outcome.invocations += summary.transformed + summary.failed.len();
                    self.sink
                        .emit(
                            TRANSFORM_PASS,
                            Some(json!({
                                "stage": stage.name(),
                                "step": step.name,
                                "transformed": summary.transformed,
                                "copied_empty": summary.copied_empty,
                                "skipped_existing": summary.skipped_existing,
                                "failed": summary.failed.len(),
                            })),
                        )
                        .await;
                    outcome.harden.push(summary);
                }
            }
        }
        Ok(())
    }

    /// A stage is done when its outputs verify, or when cleanup pruned it
    /// and the stage consuming its outputs is itself done. An interrupted
    /// stage always runs again.
    fn already_done(&self, stage: StageId, manifest: &RunManifest) -> bool {
        let recorded = manifest.status(stage);
        if recorded.was_interrupted() {
            warn!(stage = %stage, "Previous run was interrupted during this stage; running it again");
            return false;
        }
        if StageCheckpoint::is_complete(stage, &self.plans.paths().expected_outputs(stage)) {
            return true;
        }
        recorded == StageStatus::Pruned && self.consumers_verified(stage, manifest)
    }

    /// Walks forward over pruned stages until one whose outputs verify.
    fn consumers_verified(&self, stage: StageId, manifest: &RunManifest) -> bool {
        let paths = self.plans.paths();
        let mut current = stage.next();
        while let Some(next) = current.filter(|s| *s != StageId::Cleanup) {
            let recorded = manifest.status(next);
            if recorded.was_interrupted() {
                return false;
            }
            if StageCheckpoint::is_complete(next, &paths.expected_outputs(next)) {
                return true;
            }
            if recorded != StageStatus::Pruned {
                return false;
            }
            current = next.next();
        }
        true
    }

    async fn run_cleanup(&self, manifest: &mut RunManifest) -> (StageOutcome, Option<CleanupReport>) {
        let stage = StageId::Cleanup;
        let timer = SpanTimer::start(stage.name());
        let policy = CleanupPolicy::new(self.config.retain_intermediates());

        let Some(report) = clean_output(self.plans.paths(), manifest, policy) else {
            let mut outcome = StageOutcome::new(stage, StageDisposition::Skipped, manifest.status(stage));
            outcome.duration = timer.finish();
            return (outcome, None);
        };

        for path in &report.removed {
            self.sink
                .emit(CLEANUP_REMOVED, Some(json!({ "stage": stage.name(), "path": path })))
                .await;
        }

        let mut outcome = StageOutcome::new(stage, StageDisposition::Executed, StageStatus::Complete);
        outcome.duration = timer.finish();
        (outcome, Some(report))
    }

    fn notice_existing_results(&self) {
        let tracts = self.plans.paths().anatomical_tracts();
        let existing = count_matching(&tracts, "T*.vtp");
        if existing > 1 {
            info!(
                folder = %tracts.display(),
                tracts = existing,
                "Anatomical tracts already exist; completed stages will be reused"
            );
        }
    }

    fn check_cancelled(&self) -> Result<(), TractflowError> {
        if self.cancel.is_cancelled() {
            let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            return Err(TractflowError::Cancelled(reason));
        }
        Ok(())
    }
}

/// Applies `policy` to an output tree once both measurement stages verify,
/// and records the pruned stages in the manifest.
///
/// Returns `None` without touching anything when the measurements are
/// incomplete.
pub fn clean_output(
    planner: &PathPlanner,
    manifest: &mut RunManifest,
    policy: CleanupPolicy,
) -> Option<CleanupReport> {
    let measured = MEASUREMENT_STAGES
        .iter()
        .all(|s| StageCheckpoint::is_complete(*s, &planner.expected_outputs(*s)));
    if !measured {
        info!("Skipping cleanup; diffusion measurements are incomplete");
        return None;
    }

    let mut report = policy.apply(planner);
    report.pruned.retain(|s| manifest.status(*s).is_success());
    for pruned in &report.pruned {
        manifest.mark_pruned(*pruned);
    }
    manifest.mark_complete(StageId::Cleanup);
    Some(report)
}

/// Recorded and observed state of one stage.
#[derive(Debug, Clone)]
pub struct StageState {
    /// The stage.
    pub stage: StageId,
    /// Status from the manifest, `Pending` when there is none.
    pub recorded: StageStatus,
    /// What is on disk now.
    pub checkpoint: CheckpointReport,
}

/// Reads the manifest and probes every stage of an output tree, without
/// running anything.
///
/// # Errors
///
/// Returns an error if a manifest exists but cannot be read.
pub fn inspect_output(planner: &PathPlanner) -> Result<(Option<RunManifest>, Vec<StageState>), ManifestError> {
    let manifest = RunManifest::load(&planner.manifest_path())?;
    let states = StageId::ALL
        .into_iter()
        .map(|stage| StageState {
            stage,
            recorded: manifest.as_ref().map(|m| m.status(stage)).unwrap_or_default(),
            checkpoint: StageCheckpoint::inspect(stage, &planner.expected_outputs(stage)),
        })
        .collect();
    Ok((manifest, states))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Anatomical tract files in name order.
fn produced_tracts(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut tracts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_mesh_file(p))
        .collect();
    tracts.sort();
    tracts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CaseId, RegistrationMode};
    use crate::paths::HemisphereGroup;
    use crate::testing::fixtures::{write_clusters, write_mesh};

    fn planner(root: &Path) -> PathPlanner {
        PathPlanner::new(root, CaseId::new("subj01").unwrap(), RegistrationMode::Affine)
    }

    #[test]
    fn test_inspect_output_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let p = planner(dir.path());
        write_mesh(&p.registered_tractography());

        let (manifest, states) = inspect_output(&p).unwrap();
        assert!(manifest.is_none());
        assert_eq!(states.len(), StageId::ALL.len());
        assert!(states[0].checkpoint.is_complete());
        assert_eq!(states[0].recorded, StageStatus::Pending);
        assert!(!states[1].checkpoint.is_complete());
    }

    #[test]
    fn test_clean_output_requires_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let p = planner(dir.path());
        write_clusters(&p.initial_clusters(), 2);
        let mut manifest = RunManifest::new(p.case().clone(), p.mode(), dir.path().join("subj01.vtk"));

        assert!(clean_output(&p, &mut manifest, CleanupPolicy::new(true)).is_none());
        assert!(p.initial_clusters().exists());

        for group in HemisphereGroup::ALL {
            write_mesh(&p.group_measurements(group));
        }
        write_mesh(&p.anatomical_measurements());
        manifest.mark_complete(StageId::FiberClustering);

        let report = clean_output(&p, &mut manifest, CleanupPolicy::new(true)).unwrap();
        assert_eq!(report.pruned, vec![StageId::FiberClustering]);
        assert_eq!(manifest.status(StageId::FiberClustering), StageStatus::Pruned);
        assert_eq!(manifest.status(StageId::Cleanup), StageStatus::Complete);
        assert!(!p.initial_clusters_root().exists());
    }

    #[test]
    fn test_produced_tracts_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_mesh(&dir.path().join("T_b.vtp"));
        write_mesh(&dir.path().join("T_a.vtp"));
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let tracts = produced_tracts(dir.path());
        assert_eq!(tracts, vec![dir.path().join("T_a.vtp"), dir.path().join("T_b.vtp")]);
        assert!(produced_tracts(&dir.path().join("missing")).is_empty());
    }
}
