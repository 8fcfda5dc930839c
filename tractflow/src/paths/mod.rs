//! Output layout and platform path conventions.
//!
//! This module provides:
//! - `PathPlanner`, the deterministic map from stage to output location
//! - `PlatformPaths`, the POSIX/Windows differences in locating the toolkit

mod planner;
mod platform;

pub use planner::{HemisphereGroup, PathPlanner, MANIFEST_FILE_NAME};
pub use platform::{detect_platform, search_path, PlatformPaths, PosixPaths, WindowsPaths};
