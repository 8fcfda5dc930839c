//! Run configuration, settings file and atlas discovery.
//!
//! - `RunConfiguration`: the immutable, validated inputs of one run
//! - `Settings`: optional JSON settings with environment overrides
//! - `AtlasReference`: the read-only atlas bundle shared by several stages

mod atlas;
mod run;
mod settings;

pub use atlas::{AtlasReference, CLUSTERING_ATLAS_DIR, CLUSTER_LOCATION_FILE, REGISTRATION_ATLAS_DIR};
pub use run::RunConfiguration;
pub use settings::{ConfigError, LogSettings, Settings, ENV_ATLAS_DIR, ENV_INTERPRETER, ENV_MEASUREMENT_CLI, ENV_SLICER, ENV_TOOL_TIMEOUT};
