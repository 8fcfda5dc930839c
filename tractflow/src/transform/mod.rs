//! Bringing fiber clusters back into the input tractography space.
//!
//! The transform tool works one file at a time; this module runs it over a
//! folder with a bounded worker pool, copies zero-cell meshes through
//! unchanged and keeps outputs that already exist.

mod harden;
mod mesh;

pub use harden::{list_meshes, run_pass, HardenPass, HardenSummary, MeshTransformer, ToolMeshTransformer};
pub use mesh::{count_cells, is_mesh_file, MeshError, MESH_EXTENSIONS};

use std::path::PathBuf;
use thiserror::Error;

use crate::errors::{InvokeError, ResolutionError};

/// Errors that stop a harden pass.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The transform tool is not installed.
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    /// The transform tool could not be run.
    #[error("{0}")]
    Invoke(#[from] InvokeError),

    /// A folder or file of the pass could not be read or written.
    #[error("Transform I/O error at {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
