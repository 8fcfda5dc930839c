//! # Tractflow
//!
//! Resumable orchestration of the white-matter tract parcellation tool chain.
//!
//! Tractflow drives a fixed sequence of external toolkit scripts over one
//! tractography file:
//!
//! - **Path planning**: every intermediate and final artifact location is
//!   derived from the output root, the case and the registration mode
//! - **Checkpoints**: a stage whose outputs already verify is skipped, so an
//!   interrupted run resumes where it stopped
//! - **Tool invocation**: scripts run under a resolved interpreter with their
//!   output streamed into the log
//! - **Transforms**: cluster files are hardened one by one over a worker pool
//! - **Cleanup**: intermediates are removed once the measurements exist
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tractflow::prelude::*;
//!
//! let config = RunConfiguration::new("subj01.vtk", "out", RegistrationMode::Affine, 4, true)?;
//! let atlas = AtlasReference::discover(Path::new("atlas"))?;
//! let locator = ToolchainLocator::resolve(&Settings::default(), &detect_platform())?;
//!
//! let report = PipelineBuilder::new(config, atlas, locator).build()?.run().await?;
//! for tract in &report.anatomical_tracts {
//!     println!("{}", tract.display());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod paths;
pub mod pipeline;
pub mod tools;
pub mod transform;
pub mod utils;

#[cfg(test)]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{CheckpointReport, RunManifest, StageCheckpoint};
    pub use crate::config::{AtlasReference, RunConfiguration, Settings};
    pub use crate::core::{ArtifactExpectation, CaseId, RegistrationMode, StageId, StageStatus};
    pub use crate::errors::{
        InputError, InvokeError, ResolutionError, TractflowError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::paths::{detect_platform, PathPlanner, PlatformPaths};
    pub use crate::pipeline::{
        CleanupPolicy, PipelineBuilder, PipelineExecutor, RunReport, StageOutcome,
        ValidationPolicy,
    };
    pub use crate::tools::{SubprocessInvoker, Tool, ToolInvocation, ToolInvoker, ToolchainLocator};
    pub use crate::transform::{HardenPass, MeshTransformer};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
