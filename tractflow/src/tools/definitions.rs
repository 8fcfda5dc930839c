//! The toolkit scripts driven by the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One external tool of the whitematteranalysis toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Registers tractography to the atlas.
    RegisterToAtlas,
    /// Clusters fibers against the clustering atlas.
    ClusterFromAtlas,
    /// Removes outlier fibers from clusters.
    RemoveOutliers,
    /// Tags each cluster with its hemisphere location.
    AssessHemisphereLocation,
    /// Applies a transform to every mesh of a folder.
    HardenTransform,
    /// Splits clusters by hemisphere.
    SeparateByHemisphere,
    /// Appends clusters into anatomical tracts.
    AppendToAnatomicalTracts,
    /// Computes diffusion measurements for a folder of tracts.
    DiffusionMeasurements,
}

impl Tool {
    /// Every tool, in pipeline order.
    pub const ALL: [Self; 8] = [
        Self::RegisterToAtlas,
        Self::ClusterFromAtlas,
        Self::RemoveOutliers,
        Self::AssessHemisphereLocation,
        Self::HardenTransform,
        Self::SeparateByHemisphere,
        Self::AppendToAnatomicalTracts,
        Self::DiffusionMeasurements,
    ];

    /// Script file name installed by the toolkit.
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::RegisterToAtlas => "wm_register_to_atlas_new.py",
            Self::ClusterFromAtlas => "wm_cluster_from_atlas.py",
            Self::RemoveOutliers => "wm_cluster_remove_outliers.py",
            Self::AssessHemisphereLocation => "wm_assess_cluster_location_by_hemisphere.py",
            Self::HardenTransform => "wm_harden_transform.py",
            Self::SeparateByHemisphere => "wm_separate_clusters_by_hemisphere.py",
            Self::AppendToAnatomicalTracts => "wm_append_clusters_to_anatomical_tracts.py",
            Self::DiffusionMeasurements => "wm_diffusion_measurements.py",
        }
    }

    /// Short name used in logs and events.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RegisterToAtlas => "register",
            Self::ClusterFromAtlas => "cluster",
            Self::RemoveOutliers => "remove_outliers",
            Self::AssessHemisphereLocation => "assess_hemisphere",
            Self::HardenTransform => "harden_transform",
            Self::SeparateByHemisphere => "separate",
            Self::AppendToAnatomicalTracts => "append",
            Self::DiffusionMeasurements => "measure",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_script_names_are_unique_python_files() {
        let names: HashSet<_> = Tool::ALL.iter().map(|t| t.script_name()).collect();
        assert_eq!(names.len(), Tool::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("wm_") && n.ends_with(".py")));
    }

    #[test]
    fn test_display_uses_short_name() {
        assert_eq!(Tool::RegisterToAtlas.to_string(), "register");
        assert_eq!(Tool::HardenTransform.script_name(), "wm_harden_transform.py");
    }
}
