//! Step plans for each stage.
//!
//! A stage runs one or more steps in order. A step is either a single tool
//! invocation or a per-file transform pass.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AtlasReference, RunConfiguration};
use crate::core::{RegistrationMode, StageId};
use crate::errors::ResolutionError;
use crate::paths::{HemisphereGroup, PathPlanner};
use crate::tools::{Tool, ToolInvocation, ToolchainLocator};
use crate::transform::HardenPass;

/// What a step does.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Run one tool to completion.
    Run(ToolInvocation),
    /// Apply a transform to every mesh of a folder.
    Harden(HardenPass),
}

/// One unit of work within a stage.
#[derive(Debug, Clone)]
pub struct Step {
    /// Short label used in logs and events.
    pub name: String,
    /// The work itself.
    pub action: StepAction,
    /// Artifact an earlier step must have produced.
    pub requires: Option<PathBuf>,
}

impl Step {
    fn run(name: impl Into<String>, invocation: ToolInvocation) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Run(invocation),
            requires: None,
        }
    }

    fn harden(name: impl Into<String>, pass: HardenPass) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Harden(pass),
            requires: None,
        }
    }

    fn requiring(mut self, path: PathBuf) -> Self {
        self.requires = Some(path);
        self
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            StepAction::Run(invocation) => write!(f, "{}: {invocation}", self.name),
            StepAction::Harden(pass) => write!(
                f,
                "{}: harden {} -> {} with {}{}",
                self.name,
                pass.input_dir.display(),
                pass.output_dir.display(),
                pass.transform.display(),
                if pass.inverse { " (inverse)" } else { "" }
            ),
        }
    }
}

/// Builds the steps of every stage for one run.
#[derive(Debug, Clone)]
pub struct StagePlanner {
    planner: PathPlanner,
    atlas: AtlasReference,
    locator: Arc<ToolchainLocator>,
    input: PathBuf,
    threads: usize,
}

impl StagePlanner {
    /// Creates a planner for a run.
    #[must_use]
    pub fn new(config: &RunConfiguration, atlas: AtlasReference, locator: Arc<ToolchainLocator>) -> Self {
        Self {
            planner: config.planner(),
            atlas,
            locator,
            input: config.input().to_path_buf(),
            threads: config.threads(),
        }
    }

    /// The run's path planner.
    #[must_use]
    pub fn paths(&self) -> &PathPlanner {
        &self.planner
    }

    /// Steps of a stage, in execution order.
    ///
    /// Cleanup has no steps; it is handled by the cleanup policy.
    ///
    /// # Errors
    ///
    /// Returns an error if a script or the measurement CLI the stage needs
    /// is not installed.
    pub fn steps(&self, stage: StageId) -> Result<Vec<Step>, ResolutionError> {
        let p = &self.planner;
        let steps = match stage {
            StageId::Registration => self.registration()?,
            StageId::FiberClustering => vec![Step::run(
                "cluster",
                self.tool(Tool::ClusterFromAtlas)?
                    .arg("-j")
                    .arg(self.threads.to_string())
                    .arg(p.registered_tractography())
                    .arg(self.atlas.clustering_atlas())
                    .arg(p.initial_clusters_root())
                    .arg("-norender"),
            )],
            StageId::OutlierRemoval => vec![Step::run(
                "remove_outliers",
                self.tool(Tool::RemoveOutliers)?
                    .arg("-j")
                    .arg(self.threads.to_string())
                    .arg(p.initial_clusters())
                    .arg(self.atlas.clustering_atlas())
                    .arg(p.outlier_removed_root()),
            )],
            StageId::HemisphereAssessment => vec![Step::run(
                "assess_hemisphere",
                self.tool(Tool::AssessHemisphereLocation)?
                    .arg("-clusterLocationFile")
                    .arg(self.atlas.cluster_location_file())
                    .arg(p.outlier_removed()),
            )],
            StageId::TransformToNativeSpace => self.transform_passes(),
            StageId::HemisphereSeparation => vec![Step::run(
                "separate",
                self.tool(Tool::SeparateByHemisphere)?
                    .arg(p.transformed_clusters())
                    .arg(p.separated_root()),
            )],
            StageId::TractAppend => vec![Step::run(
                "append",
                self.tool(Tool::AppendToAnatomicalTracts)?
                    .arg(p.separated_root())
                    .arg(self.atlas.clustering_atlas())
                    .arg(p.anatomical_tracts()),
            )],
            StageId::DiffusionMeasurement => {
                let cli = self.locator.measurement_cli()?;
                HemisphereGroup::ALL
                    .iter()
                    .map(|group| {
                        Ok(Step::run(
                            format!("measure_{}", group.suffix()),
                            self.tool(Tool::DiffusionMeasurements)?
                                .arg(p.separated_group(*group))
                                .arg(p.group_measurements(*group))
                                .arg(cli),
                        ))
                    })
                    .collect::<Result<Vec<_>, ResolutionError>>()?
            }
            StageId::AnatomicalTractMeasurement => {
                let cli = self.locator.measurement_cli()?;
                vec![Step::run(
                    "measure_anatomical",
                    self.tool(Tool::DiffusionMeasurements)?
                        .arg(p.anatomical_tracts())
                        .arg(p.anatomical_measurements())
                        .arg(cli),
                )]
            }
            StageId::Cleanup => Vec::new(),
        };
        Ok(steps)
    }

    fn tool(&self, tool: Tool) -> Result<ToolInvocation, ResolutionError> {
        self.locator.invocation(tool)
    }

    fn register(&self, mode: &str, input: PathBuf) -> Result<ToolInvocation, ResolutionError> {
        Ok(self
            .tool(Tool::RegisterToAtlas)?
            .arg("-mode")
            .arg(mode)
            .arg(input)
            .arg(self.atlas.registration_atlas())
            .arg(self.planner.registration_root()))
    }

    fn registration(&self) -> Result<Vec<Step>, ResolutionError> {
        match self.planner.mode() {
            RegistrationMode::Affine => Ok(vec![Step::run(
                "register_rigid_affine",
                self.register("rigid_affine_fast", self.input.clone())?,
            )]),
            RegistrationMode::AffineNonlinear => {
                let affine = self.planner.affine_registered();
                Ok(vec![
                    Step::run("register_affine", self.register("affine", self.input.clone())?),
                    Step::run("register_nonrigid", self.register("nonrigid", affine.clone())?)
                        .requiring(affine),
                ])
            }
        }
    }

    fn transform_passes(&self) -> Vec<Step> {
        let p = &self.planner;
        match p.mode() {
            RegistrationMode::Affine => vec![Step::harden(
                "harden_rigid",
                HardenPass::inverse(p.outlier_removed(), p.transformed_clusters(), p.rigid_transform()),
            )],
            RegistrationMode::AffineNonlinear => vec![
                Step::harden(
                    "harden_nonrigid",
                    HardenPass::inverse(
                        p.outlier_removed(),
                        p.transformed_clusters_tmp(),
                        p.nonrigid_transform(),
                    ),
                ),
                Step::harden(
                    "harden_rigid",
                    HardenPass::inverse(
                        p.transformed_clusters_tmp(),
                        p.transformed_clusters(),
                        p.rigid_transform(),
                    ),
                ),
            ],
        }
    }
}
