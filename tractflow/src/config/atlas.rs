//! Location and validation of the atlas bundle.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::InputError;

/// Folder of the registration atlas inside the bundle.
pub const REGISTRATION_ATLAS_DIR: &str = "ORG-RegAtlas-100HCP";

/// Folder of the fiber clustering atlas inside the bundle.
pub const CLUSTERING_ATLAS_DIR: &str = "ORG-800FC-100HCP";

/// Cluster-to-hemisphere location table inside the clustering atlas.
pub const CLUSTER_LOCATION_FILE: &str = "cluster_hemisphere_location.txt";

const REGISTRATION_ATLAS_FILE: &str = "registration_atlas.vtk";
const BUNDLE_PREFIX: &str = "ORG-Atlases";

/// The resolved, validated atlas bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasReference {
    root: PathBuf,
}

impl AtlasReference {
    /// Resolves the bundle from a directory.
    ///
    /// `dir` may be the bundle itself or a folder containing an
    /// `ORG-Atlases*` bundle, in which case the first one in name order wins.
    ///
    /// # Errors
    ///
    /// Returns an error if no bundle is found or a required file is missing.
    pub fn discover(dir: &Path) -> Result<Self, InputError> {
        let root = if dir.join(REGISTRATION_ATLAS_DIR).is_dir() {
            dir.to_path_buf()
        } else {
            find_bundle(dir).ok_or_else(|| InputError::AtlasNotFound(dir.to_path_buf()))?
        };

        let atlas = Self { root };
        atlas.validate()?;
        debug!(root = %atlas.root.display(), "Resolved atlas bundle");
        Ok(atlas)
    }

    /// Checks that every file the stages read is present.
    ///
    /// # Errors
    ///
    /// Returns the first missing file or folder.
    pub fn validate(&self) -> Result<(), InputError> {
        let required = [
            self.registration_atlas(),
            self.clustering_atlas(),
            self.cluster_location_file(),
        ];
        match required.into_iter().find(|p| !p.exists()) {
            Some(missing) => Err(InputError::AtlasIncomplete(missing)),
            None => Ok(()),
        }
    }

    /// Bundle root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `ORG-RegAtlas-100HCP/registration_atlas.vtk`.
    #[must_use]
    pub fn registration_atlas(&self) -> PathBuf {
        self.root
            .join(REGISTRATION_ATLAS_DIR)
            .join(REGISTRATION_ATLAS_FILE)
    }

    /// `ORG-800FC-100HCP`.
    #[must_use]
    pub fn clustering_atlas(&self) -> PathBuf {
        self.root.join(CLUSTERING_ATLAS_DIR)
    }

    /// `ORG-800FC-100HCP/cluster_hemisphere_location.txt`.
    #[must_use]
    pub fn cluster_location_file(&self) -> PathBuf {
        self.clustering_atlas().join(CLUSTER_LOCATION_FILE)
    }
}

fn find_bundle(dir: &Path) -> Option<PathBuf> {
    let mut bundles: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().starts_with(BUNDLE_PREFIX))
        .map(|e| e.path())
        .collect();
    bundles.sort();
    bundles.into_iter().next()
}
