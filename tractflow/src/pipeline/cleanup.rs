//! Removal of intermediate artifacts after a finished run.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::StageId;
use crate::paths::PathPlanner;

/// How much of the intermediate tree to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Only the initial and transformed cluster folders.
    Minimal,
    /// Registration outputs and every cluster folder's contents as well.
    Maximal,
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => f.write_str("minimal"),
            Self::Maximal => f.write_str("maximal"),
        }
    }
}

/// Something the policy removes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Every path matching a glob pattern.
    Matching(PathBuf, &'static str),
    /// A whole directory.
    Dir(PathBuf),
}

/// Outcome of a cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Removal mode applied.
    pub removal: Option<Retention>,
    /// Paths removed, in removal order.
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed.
    pub errors: Vec<String>,
    /// Stages whose intermediates are gone.
    pub pruned: Vec<StageId>,
}

/// Decides which intermediates to remove once the measurements exist.
///
/// Transforms, CSV files, the separated clusters, the anatomical tracts and
/// the manifest are never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    retention: Retention,
}

impl CleanupPolicy {
    /// Policy for the run's retention flag.
    ///
    /// Keeping intermediates still removes the minimal set.
    #[must_use]
    pub fn new(retain_intermediates: bool) -> Self {
        let retention = if retain_intermediates {
            Retention::Minimal
        } else {
            Retention::Maximal
        };
        Self { retention }
    }

    /// The removal mode.
    #[must_use]
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Stages whose outputs this policy removes.
    #[must_use]
    pub fn pruned_stages(&self) -> &'static [StageId] {
        match self.retention {
            Retention::Minimal => &[StageId::FiberClustering, StageId::TransformToNativeSpace],
            Retention::Maximal => &[
                StageId::Registration,
                StageId::FiberClustering,
                StageId::OutlierRemoval,
                StageId::HemisphereAssessment,
                StageId::TransformToNativeSpace,
            ],
        }
    }

    fn targets(&self, planner: &PathPlanner) -> Vec<Target> {
        let mut targets = Vec::new();
        if self.retention == Retention::Maximal {
            let registration = planner.registration_root();
            targets.extend([
                Target::Matching(registration.clone(), "*/output_tractography/*vtk"),
                Target::Matching(registration, "*/iteration*"),
                Target::Matching(planner.initial_clusters_root(), "*"),
                Target::Matching(planner.outlier_removed_root(), "*"),
                Target::Matching(planner.transformed_clusters_root(), "*"),
            ]);
        }
        targets.push(Target::Dir(planner.initial_clusters_root()));
        targets.push(Target::Dir(planner.transformed_clusters_root()));
        targets
    }

    /// Paths the policy would remove right now, without removing them.
    #[must_use]
    pub fn preview(&self, planner: &PathPlanner) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for target in self.targets(planner) {
            for path in expand(&target) {
                if !paths.iter().any(|p: &PathBuf| path.starts_with(p)) {
                    paths.push(path);
                }
            }
        }
        paths
    }

    /// Removes the intermediates. Failures are logged and reported, never
    /// raised.
    pub fn apply(&self, planner: &PathPlanner) -> CleanupReport {
        info!(removal = %self.retention, "Cleaning intermediate files");
        let mut report = CleanupReport {
            removal: Some(self.retention),
            pruned: self.pruned_stages().to_vec(),
            ..CleanupReport::default()
        };

        for target in self.targets(planner) {
            for path in expand(&target) {
                match remove(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed");
                        report.removed.push(path);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove intermediate");
                        report.errors.push(format!("{}: {e}", path.display()));
                    }
                }
            }
        }
        report
    }
}

fn expand(target: &Target) -> Vec<PathBuf> {
    match target {
        Target::Dir(dir) => {
            if dir.exists() {
                vec![dir.clone()]
            } else {
                Vec::new()
            }
        }
        Target::Matching(root, pattern) => {
            let Some(root) = root.to_str() else {
                warn!(root = %root.display(), "Skipping non UTF-8 path");
                return Vec::new();
            };
            let full = format!("{}/{pattern}", glob::Pattern::escape(root));
            match glob::glob(&full) {
                Ok(paths) => {
                    let mut paths: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
                    paths.sort();
                    paths
                }
                Err(e) => {
                    warn!(pattern = %full, error = %e, "Invalid cleanup pattern");
                    Vec::new()
                }
            }
        }
    }
}

fn remove(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CaseId, RegistrationMode};
    use crate::paths::HemisphereGroup;
    use crate::testing::fixtures::{write_clusters, write_mesh};
    use crate::testing::{assert_absent, assert_present};

    fn finished_tree(root: &Path) -> PathPlanner {
        let p = PathPlanner::new(root, CaseId::new("subj01").unwrap(), RegistrationMode::Affine);
        write_mesh(&p.registered_tractography());
        write_mesh(&p.rigid_transform());
        write_mesh(&p.registration_root().join("subj01").join("iteration_1").join("it.vtk"));
        write_clusters(&p.initial_clusters(), 3);
        write_clusters(&p.outlier_removed(), 3);
        write_mesh(&p.hemisphere_log());
        write_clusters(&p.transformed_clusters(), 3);
        for group in HemisphereGroup::ALL {
            write_clusters(&p.separated_group(group), 3);
            write_mesh(&p.group_measurements(group));
        }
        write_clusters(&p.anatomical_tracts(), 3);
        write_mesh(&p.anatomical_measurements());
        write_mesh(&p.manifest_path());
        p
    }

    fn assert_outputs_preserved(p: &PathPlanner) {
        assert_present(&p.rigid_transform());
        assert_present(&p.anatomical_tracts().join("cluster_00001.vtp"));
        assert_present(&p.anatomical_measurements());
        assert_present(&p.manifest_path());
        for group in HemisphereGroup::ALL {
            assert_present(&p.separated_group(group).join("cluster_00003.vtp"));
            assert_present(&p.group_measurements(group));
        }
    }

    #[test]
    fn test_minimal_removal() {
        let dir = tempfile::tempdir().unwrap();
        let p = finished_tree(dir.path());

        let report = CleanupPolicy::new(true).apply(&p);

        assert_eq!(report.removal, Some(Retention::Minimal));
        assert_eq!(report.removed, vec![p.initial_clusters_root(), p.transformed_clusters_root()]);
        assert!(report.errors.is_empty());
        assert_absent(&p.initial_clusters_root());
        assert_absent(&p.transformed_clusters_root());
        assert_present(&p.registered_tractography());
        assert_present(&p.outlier_removed().join("cluster_00001.vtp"));
        assert_outputs_preserved(&p);
    }

    #[test]
    fn test_maximal_removal() {
        let dir = tempfile::tempdir().unwrap();
        let p = finished_tree(dir.path());

        let report = CleanupPolicy::new(false).apply(&p);

        assert_eq!(report.pruned.len(), 5);
        assert_absent(&p.registered_tractography());
        assert_absent(&p.registration_root().join("subj01").join("iteration_1"));
        assert_absent(&p.outlier_removed());
        assert_absent(&p.initial_clusters_root());
        assert_absent(&p.transformed_clusters_root());
        assert_present(&p.outlier_removed_root());
        assert_outputs_preserved(&p);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = finished_tree(dir.path());
        let policy = CleanupPolicy::new(false);

        policy.apply(&p);
        let second = policy.apply(&p);
        assert!(second.removed.is_empty());
        assert!(second.errors.is_empty());
    }

    #[test]
    fn test_preview_does_not_remove() {
        let dir = tempfile::tempdir().unwrap();
        let p = finished_tree(dir.path());

        let preview = CleanupPolicy::new(false).preview(&p);
        assert!(preview.contains(&p.initial_clusters()));
        assert!(preview.contains(&p.registered_tractography()));
        assert!(!preview.contains(&p.rigid_transform()));
        assert_present(&p.initial_clusters());
    }
}
