//! Testing utilities for tractflow runs.
//!
//! This module provides:
//! - Fixtures for atlas bundles, toolkits, meshes and run workspaces
//! - `ScriptedInvoker`, a `ToolInvoker` that writes what each tool would
//! - Assertions over output trees

mod assertions;
pub mod fixtures;
mod scripted;

pub use assertions::{assert_absent, assert_file_count, assert_present};
pub use fixtures::TestWorkspace;
pub use scripted::ScriptedInvoker;
