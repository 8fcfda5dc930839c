//! The fixed stage sequence of the parcellation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one stage in the fixed pipeline.
///
/// Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Register the input tractography to the atlas space.
    Registration,
    /// Initial 800-cluster parcellation.
    FiberClustering,
    /// Remove outlier fibers from each cluster.
    OutlierRemoval,
    /// Assess cluster location by hemisphere in atlas space.
    HemisphereAssessment,
    /// Harden the inverse registration back into the input space.
    TransformToNativeSpace,
    /// Split clusters into commissural, left and right groups.
    HemisphereSeparation,
    /// Append clusters into anatomical tracts.
    TractAppend,
    /// Diffusion measurements for each hemisphere group.
    DiffusionMeasurement,
    /// Diffusion measurements for the anatomical tracts.
    AnatomicalTractMeasurement,
    /// Remove intermediate artifacts.
    Cleanup,
}

impl StageId {
    /// Every stage in execution order.
    pub const ALL: [Self; 10] = [
        Self::Registration,
        Self::FiberClustering,
        Self::OutlierRemoval,
        Self::HemisphereAssessment,
        Self::TransformToNativeSpace,
        Self::HemisphereSeparation,
        Self::TractAppend,
        Self::DiffusionMeasurement,
        Self::AnatomicalTractMeasurement,
        Self::Cleanup,
    ];

    /// Zero-based position in the sequence.
    #[must_use]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Machine name, as stored in the manifest.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::FiberClustering => "fiber_clustering",
            Self::OutlierRemoval => "outlier_removal",
            Self::HemisphereAssessment => "hemisphere_assessment",
            Self::TransformToNativeSpace => "transform_to_native_space",
            Self::HemisphereSeparation => "hemisphere_separation",
            Self::TractAppend => "tract_append",
            Self::DiffusionMeasurement => "diffusion_measurement",
            Self::AnatomicalTractMeasurement => "anatomical_tract_measurement",
            Self::Cleanup => "cleanup",
        }
    }

    /// Human-readable description used in progress logs.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Registration => "Tractography registration",
            Self::FiberClustering => "Fiber clustering for whole-brain 800 fiber cluster parcellation",
            Self::OutlierRemoval => "Outlier fiber removal",
            Self::HemisphereAssessment => "Hemisphere location assessment in the atlas space",
            Self::TransformToNativeSpace => "Transform fiber clusters back to tractography space",
            Self::HemisphereSeparation => "Separate fiber clusters by hemisphere",
            Self::TractAppend => "Append clusters into anatomical tracts",
            Self::DiffusionMeasurement => "Report diffusion measurements of fiber clusters",
            Self::AnatomicalTractMeasurement => "Report diffusion measurements of the anatomical tracts",
            Self::Cleanup => "Clean intermediate files",
        }
    }

    /// The stage that runs after this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
