//! Declared output artifacts used by stage checkpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of fiber clusters produced by the clustering atlas.
pub const CLUSTER_COUNT: usize = 800;

/// Number of anatomical tracts produced by the append stage.
pub const ANATOMICAL_TRACT_COUNT: usize = 73;

/// An output a stage must leave on disk before it counts as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactExpectation {
    /// A single file that must exist.
    File {
        /// Exact file path.
        path: PathBuf,
    },
    /// A directory holding at least `min_count` entries matching `pattern`.
    Files {
        /// Directory to scan (non-recursive).
        dir: PathBuf,
        /// Glob pattern matched against entry names, e.g. `*.vtp`.
        pattern: String,
        /// Minimum number of matching entries.
        min_count: usize,
    },
}

impl ArtifactExpectation {
    /// Expects a single file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Expects at least `min_count` entries matching `pattern` in `dir`.
    #[must_use]
    pub fn files(dir: impl Into<PathBuf>, pattern: impl Into<String>, min_count: usize) -> Self {
        Self::Files {
            dir: dir.into(),
            pattern: pattern.into(),
            min_count,
        }
    }

    /// Expects a full set of fiber-cluster meshes in `dir`.
    #[must_use]
    pub fn clusters(dir: impl Into<PathBuf>) -> Self {
        Self::files(dir, "*.vtp", CLUSTER_COUNT)
    }

    /// The file or directory this expectation refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::File { path } => path,
            Self::Files { dir, .. } => dir,
        }
    }
}

impl fmt::Display for ArtifactExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "file {}", path.display()),
            Self::Files {
                dir,
                pattern,
                min_count,
            } => write!(f, "{min_count} x {pattern} in {}", dir.display()),
        }
    }
}
