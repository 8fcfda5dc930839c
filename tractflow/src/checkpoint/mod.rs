//! On-disk progress state.
//!
//! Progress lives in two places: the artifacts each stage leaves in the output
//! tree, and a small manifest recording each stage's status. The manifest says
//! what happened; the artifact probes verify that it is still true.

mod manifest;
mod probe;

pub use manifest::{fingerprint, ManifestError, RunManifest, StageRecord, MANIFEST_VERSION};
pub use probe::{count_matching, is_complete, ArtifactState, CheckpointReport, StageCheckpoint};
