//! Deterministic output layout for a run.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::{ArtifactExpectation, CaseId, RegistrationMode, StageId, ANATOMICAL_TRACT_COUNT};

/// File name of the run manifest at the output root.
pub const MANIFEST_FILE_NAME: &str = "tractflow_manifest.json";

const REGISTRATION_DIR: &str = "TractRegistration";
const FIBER_CLUSTERING_DIR: &str = "FiberClustering";
const INITIAL_CLUSTERS_DIR: &str = "InitialClusters";
const OUTLIER_REMOVED_DIR: &str = "OutlierRemovedClusters";
const TRANSFORMED_DIR: &str = "TransformedClusters";
const SEPARATED_DIR: &str = "SeparatedClusters";
const ANATOMICAL_DIR: &str = "AnatomicalTracts";
const REGISTERED_OUTPUT_DIR: &str = "output_tractography";
const HEMISPHERE_LOG: &str = "cluster_location_by_hemisphere.log";
const ANATOMICAL_CSV: &str = "diffusion_measurements_anatomical_tracts.csv";

/// One of the three cluster groups produced by hemisphere separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HemisphereGroup {
    /// Clusters crossing the midline.
    Commissural,
    /// Clusters in the left hemisphere.
    LeftHemisphere,
    /// Clusters in the right hemisphere.
    RightHemisphere,
}

impl HemisphereGroup {
    /// All groups in measurement order.
    pub const ALL: [Self; 3] = [Self::Commissural, Self::LeftHemisphere, Self::RightHemisphere];

    /// Suffix shared by the folder and CSV names.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Commissural => "commissural",
            Self::LeftHemisphere => "left_hemisphere",
            Self::RightHemisphere => "right_hemisphere",
        }
    }

    /// Folder name under `SeparatedClusters`.
    #[must_use]
    pub fn dir_name(self) -> String {
        format!("tracts_{}", self.suffix())
    }

    /// Measurement CSV name under `SeparatedClusters`.
    #[must_use]
    pub fn csv_name(self) -> String {
        format!("diffusion_measurements_{}.csv", self.suffix())
    }
}

impl fmt::Display for HemisphereGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Derives every output location of a run.
///
/// A pure function of (output root, case, registration mode): two planners
/// built from the same inputs always point at the same files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPlanner {
    output_root: PathBuf,
    case: CaseId,
    mode: RegistrationMode,
}

impl PathPlanner {
    /// Creates a new planner.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>, case: CaseId, mode: RegistrationMode) -> Self {
        Self {
            output_root: output_root.into(),
            case,
            mode,
        }
    }

    /// Returns the output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Returns the case id.
    #[must_use]
    pub fn case(&self) -> &CaseId {
        &self.case
    }

    /// Returns the registration mode.
    #[must_use]
    pub fn mode(&self) -> RegistrationMode {
        self.mode
    }

    /// `O/TractRegistration`, the output folder handed to the registration tool.
    #[must_use]
    pub fn registration_root(&self) -> PathBuf {
        self.output_root.join(REGISTRATION_DIR)
    }

    fn registration_output(&self, subject: &str) -> PathBuf {
        self.registration_root().join(subject).join(REGISTERED_OUTPUT_DIR)
    }

    fn affine_case(&self) -> String {
        format!("{}_reg", self.case)
    }

    /// Output of the affine (or rigid-affine) registration: `<case>_reg.vtk`.
    #[must_use]
    pub fn affine_registered(&self) -> PathBuf {
        self.registration_output(self.case.as_str())
            .join(format!("{}.vtk", self.affine_case()))
    }

    /// Output of the non-rigid refinement: `<case>_reg_reg.vtk`.
    #[must_use]
    pub fn nonrigid_registered(&self) -> PathBuf {
        let affine_case = self.affine_case();
        self.registration_output(&affine_case)
            .join(format!("{affine_case}_reg.vtk"))
    }

    /// The registered tractography that downstream stages consume.
    #[must_use]
    pub fn registered_tractography(&self) -> PathBuf {
        match self.mode {
            RegistrationMode::Affine => self.affine_registered(),
            RegistrationMode::AffineNonlinear => self.nonrigid_registered(),
        }
    }

    /// Affine transform written by the first registration pass.
    #[must_use]
    pub fn rigid_transform(&self) -> PathBuf {
        self.registration_output(self.case.as_str())
            .join(format!("itk_txform_{}.tfm", self.case))
    }

    /// Non-rigid transform written by the refinement pass.
    #[must_use]
    pub fn nonrigid_transform(&self) -> PathBuf {
        let affine_case = self.affine_case();
        self.registration_output(&affine_case)
            .join(format!("itk_txform_{affine_case}.tfm"))
    }

    /// Subject id seen by the clustering tools.
    ///
    /// The clustering tool names its output folder after its input file, so
    /// this is the stem of the mode-correct registered tractography.
    #[must_use]
    pub fn clustering_case(&self) -> String {
        match self.mode {
            RegistrationMode::Affine => self.affine_case(),
            RegistrationMode::AffineNonlinear => format!("{}_reg_reg", self.case),
        }
    }

    /// `O/FiberClustering`.
    #[must_use]
    pub fn fiber_clustering_root(&self) -> PathBuf {
        self.output_root.join(FIBER_CLUSTERING_DIR)
    }

    /// Output folder handed to the clustering tool.
    #[must_use]
    pub fn initial_clusters_root(&self) -> PathBuf {
        self.fiber_clustering_root().join(INITIAL_CLUSTERS_DIR)
    }

    /// Folder holding this case's initial clusters.
    #[must_use]
    pub fn initial_clusters(&self) -> PathBuf {
        self.initial_clusters_root().join(self.clustering_case())
    }

    /// Output folder handed to the outlier removal tool.
    #[must_use]
    pub fn outlier_removed_root(&self) -> PathBuf {
        self.fiber_clustering_root().join(OUTLIER_REMOVED_DIR)
    }

    /// Folder holding this case's outlier-removed clusters.
    #[must_use]
    pub fn outlier_removed(&self) -> PathBuf {
        self.outlier_removed_root()
            .join(format!("{}_outlier_removed", self.clustering_case()))
    }

    /// Log written by the hemisphere assessment tool.
    #[must_use]
    pub fn hemisphere_log(&self) -> PathBuf {
        self.outlier_removed().join(HEMISPHERE_LOG)
    }

    /// `O/FiberClustering/TransformedClusters`.
    #[must_use]
    pub fn transformed_clusters_root(&self) -> PathBuf {
        self.fiber_clustering_root().join(TRANSFORMED_DIR)
    }

    /// Clusters hardened back into the input tractography space.
    #[must_use]
    pub fn transformed_clusters(&self) -> PathBuf {
        self.transformed_clusters_root().join(self.case.as_str())
    }

    /// Intermediate folder for the non-rigid inverse pass.
    #[must_use]
    pub fn transformed_clusters_tmp(&self) -> PathBuf {
        self.transformed_clusters().join("tmp")
    }

    /// `O/FiberClustering/SeparatedClusters`.
    #[must_use]
    pub fn separated_root(&self) -> PathBuf {
        self.fiber_clustering_root().join(SEPARATED_DIR)
    }

    /// Folder of one hemisphere group.
    #[must_use]
    pub fn separated_group(&self, group: HemisphereGroup) -> PathBuf {
        self.separated_root().join(group.dir_name())
    }

    /// Measurement CSV of one hemisphere group.
    #[must_use]
    pub fn group_measurements(&self, group: HemisphereGroup) -> PathBuf {
        self.separated_root().join(group.csv_name())
    }

    /// `O/AnatomicalTracts`.
    #[must_use]
    pub fn anatomical_tracts(&self) -> PathBuf {
        self.output_root.join(ANATOMICAL_DIR)
    }

    /// Measurement CSV of the anatomical tracts.
    #[must_use]
    pub fn anatomical_measurements(&self) -> PathBuf {
        self.anatomical_tracts().join(ANATOMICAL_CSV)
    }

    /// Location of the run manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.output_root.join(MANIFEST_FILE_NAME)
    }

    /// Primary output location of a stage.
    #[must_use]
    pub fn derive_path(&self, stage: StageId) -> PathBuf {
        match stage {
            StageId::Registration => self.registered_tractography(),
            StageId::FiberClustering => self.initial_clusters(),
            StageId::OutlierRemoval => self.outlier_removed(),
            StageId::HemisphereAssessment => self.hemisphere_log(),
            StageId::TransformToNativeSpace => self.transformed_clusters(),
            StageId::HemisphereSeparation => self.separated_root(),
            StageId::TractAppend => self.anatomical_tracts(),
            StageId::DiffusionMeasurement => self.separated_root(),
            StageId::AnatomicalTractMeasurement => self.anatomical_measurements(),
            StageId::Cleanup => self.output_root.clone(),
        }
    }

    /// Every artifact a stage must leave behind to count as complete.
    #[must_use]
    pub fn expected_outputs(&self, stage: StageId) -> Vec<ArtifactExpectation> {
        match stage {
            StageId::Registration => vec![ArtifactExpectation::file(self.registered_tractography())],
            StageId::FiberClustering => vec![ArtifactExpectation::clusters(self.initial_clusters())],
            StageId::OutlierRemoval => vec![ArtifactExpectation::clusters(self.outlier_removed())],
            StageId::HemisphereAssessment => vec![ArtifactExpectation::file(self.hemisphere_log())],
            StageId::TransformToNativeSpace => {
                vec![ArtifactExpectation::clusters(self.transformed_clusters())]
            }
            StageId::HemisphereSeparation => HemisphereGroup::ALL
                .iter()
                .map(|g| ArtifactExpectation::clusters(self.separated_group(*g)))
                .collect(),
            StageId::TractAppend => vec![ArtifactExpectation::files(
                self.anatomical_tracts(),
                "*.vtp",
                ANATOMICAL_TRACT_COUNT,
            )],
            StageId::DiffusionMeasurement => HemisphereGroup::ALL
                .iter()
                .map(|g| ArtifactExpectation::file(self.group_measurements(*g)))
                .collect(),
            StageId::AnatomicalTractMeasurement => {
                vec![ArtifactExpectation::file(self.anatomical_measurements())]
            }
            StageId::Cleanup => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn planner(mode: RegistrationMode) -> PathPlanner {
        PathPlanner::new("/out", CaseId::new("subj01").unwrap(), mode)
    }

    #[test]
    fn test_affine_registered_name() {
        let p = planner(RegistrationMode::Affine);
        assert_eq!(
            p.registered_tractography(),
            PathBuf::from("/out/TractRegistration/subj01/output_tractography/subj01_reg.vtk")
        );
        assert_eq!(p.clustering_case(), "subj01_reg");
    }

    #[test]
    fn test_nonlinear_registered_name() {
        let p = planner(RegistrationMode::AffineNonlinear);
        assert_eq!(
            p.affine_registered(),
            PathBuf::from("/out/TractRegistration/subj01/output_tractography/subj01_reg.vtk")
        );
        assert_eq!(
            p.registered_tractography(),
            PathBuf::from("/out/TractRegistration/subj01_reg/output_tractography/subj01_reg_reg.vtk")
        );
        assert_eq!(p.clustering_case(), "subj01_reg_reg");
    }

    #[test]
    fn test_downstream_paths_follow_mode() {
        let affine = planner(RegistrationMode::Affine);
        let nonlinear = planner(RegistrationMode::AffineNonlinear);

        assert_eq!(
            affine.initial_clusters(),
            PathBuf::from("/out/FiberClustering/InitialClusters/subj01_reg")
        );
        assert_eq!(
            nonlinear.initial_clusters(),
            PathBuf::from("/out/FiberClustering/InitialClusters/subj01_reg_reg")
        );
        assert_eq!(
            nonlinear.outlier_removed(),
            PathBuf::from("/out/FiberClustering/OutlierRemovedClusters/subj01_reg_reg_outlier_removed")
        );
        assert_eq!(
            nonlinear.hemisphere_log(),
            PathBuf::from(
                "/out/FiberClustering/OutlierRemovedClusters/subj01_reg_reg_outlier_removed/cluster_location_by_hemisphere.log"
            )
        );

        // Native-space folders are keyed on the original case in both modes.
        assert_eq!(affine.transformed_clusters(), nonlinear.transformed_clusters());
        assert_eq!(
            affine.transformed_clusters(),
            PathBuf::from("/out/FiberClustering/TransformedClusters/subj01")
        );
    }

    #[test]
    fn test_transform_files() {
        let p = planner(RegistrationMode::AffineNonlinear);
        assert_eq!(
            p.rigid_transform(),
            PathBuf::from("/out/TractRegistration/subj01/output_tractography/itk_txform_subj01.tfm")
        );
        assert_eq!(
            p.nonrigid_transform(),
            PathBuf::from("/out/TractRegistration/subj01_reg/output_tractography/itk_txform_subj01_reg.tfm")
        );
    }

    #[test]
    fn test_separated_and_measurements() {
        let p = planner(RegistrationMode::Affine);
        assert_eq!(
            p.separated_group(HemisphereGroup::LeftHemisphere),
            PathBuf::from("/out/FiberClustering/SeparatedClusters/tracts_left_hemisphere")
        );
        assert_eq!(
            p.group_measurements(HemisphereGroup::Commissural),
            PathBuf::from("/out/FiberClustering/SeparatedClusters/diffusion_measurements_commissural.csv")
        );
        assert_eq!(
            p.anatomical_measurements(),
            PathBuf::from("/out/AnatomicalTracts/diffusion_measurements_anatomical_tracts.csv")
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = planner(RegistrationMode::AffineNonlinear);
        let b = planner(RegistrationMode::AffineNonlinear);
        for stage in StageId::ALL {
            assert_eq!(a.derive_path(stage), b.derive_path(stage));
            assert_eq!(a.expected_outputs(stage), b.expected_outputs(stage));
        }
    }

    #[test]
    fn test_expected_output_counts() {
        let p = planner(RegistrationMode::Affine);
        assert_eq!(p.expected_outputs(StageId::HemisphereSeparation).len(), 3);
        assert_eq!(p.expected_outputs(StageId::DiffusionMeasurement).len(), 3);
        assert!(p.expected_outputs(StageId::Cleanup).is_empty());
        assert_eq!(
            p.expected_outputs(StageId::TractAppend),
            vec![ArtifactExpectation::files("/out/AnatomicalTracts", "*.vtp", 73)]
        );
    }
}
