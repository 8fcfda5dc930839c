//! Core domain model types for tractflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identity and status enums
//! - Registration mode and case identifier
//! - Declared artifact expectations

mod artifact;
mod case;
mod mode;
mod stage;
mod status;

pub use artifact::{ArtifactExpectation, ANATOMICAL_TRACT_COUNT, CLUSTER_COUNT};
pub use case::CaseId;
pub use mode::RegistrationMode;
pub use stage::StageId;
pub use status::StageStatus;
