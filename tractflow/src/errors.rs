//! Error types for the tractflow orchestrator.
//!
//! The taxonomy separates errors that stop a run (bad inputs, processes that
//! cannot be launched, cancellation) from errors that are recovered at stage
//! level (missing tool scripts, incomplete stage outputs).

use std::path::PathBuf;
use thiserror::Error;

use crate::checkpoint::ManifestError;
use crate::config::ConfigError;
use crate::core::StageId;
use crate::transform::TransformError;

/// The main error type for tractflow operations.
#[derive(Debug, Error)]
pub enum TractflowError {
    /// Run inputs were missing or invalid.
    #[error("{0}")]
    Input(#[from] InputError),

    /// A tool or the interpreter could not be resolved.
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    /// A subprocess could not be launched or supervised.
    #[error("{0}")]
    Invoke(InvokeError),

    /// A stage finished without producing its declared outputs.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The run manifest could not be read or written.
    #[error("{0}")]
    Manifest(#[from] ManifestError),

    /// The settings file was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A harden pass could not write its outputs.
    #[error("{0}")]
    Transform(TransformError),

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TractflowError {
    /// Returns true if the error must stop the run.
    ///
    /// Resolution and validation failures are recorded against the stage and
    /// the pipeline keeps going (subject to the validation policy).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Resolution(ResolutionError::Script { .. }) | Self::Validation(_))
    }
}

/// Errors raised while validating run inputs, before any stage executes.
#[derive(Debug, Clone, Error)]
pub enum InputError {
    /// The input tractography file does not exist.
    #[error("Input tractography not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The input is not a `.vtk` or `.vtp` file.
    #[error("Unsupported tractography format (expected .vtk or .vtp): {}", .0.display())]
    UnsupportedInput(PathBuf),

    /// No case identifier could be derived from the input file name.
    #[error("Cannot derive a case identifier from: {}", .0.display())]
    InvalidCase(PathBuf),

    /// The output root exists but is not a directory.
    #[error("Output root is not a directory: {}", .0.display())]
    OutputNotDirectory(PathBuf),

    /// The thread count was zero.
    #[error("Thread count must be at least 1")]
    InvalidThreads,

    /// The registration mode string was not recognised.
    #[error("Unknown registration mode '{0}' (expected 'affine' or 'affine+nonlinear')")]
    UnknownMode(String),

    /// No atlas bundle was found.
    #[error("Atlas bundle not found under {}", .0.display())]
    AtlasNotFound(PathBuf),

    /// The atlas bundle is missing a required file or folder.
    #[error("Atlas bundle incomplete, missing {}", .0.display())]
    AtlasIncomplete(PathBuf),
}

/// Errors raised when locating the interpreter or a tool script.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// The interpreter executable could not be located.
    #[error("Interpreter '{name}' not found{}", .hint.as_ref().map(|h| format!(" (looked in {})", h.display())).unwrap_or_default())]
    Interpreter {
        /// Executable file name searched for.
        name: String,
        /// Explicit location that was checked, if any.
        hint: Option<PathBuf>,
    },

    /// A tool script is not installed where expected.
    #[error("Tool script for '{tool}' not found at {}", .path.display())]
    Script {
        /// Tool name.
        tool: String,
        /// Expected script path.
        path: PathBuf,
    },
}

/// Errors raised while launching or supervising a subprocess.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The OS refused to start the process.
    #[error("Failed to launch '{command}': {source}")]
    Launch {
        /// Command line that failed.
        command: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Reading output from or waiting on the process failed.
    #[error("IO error while running '{command}': {source}")]
    Io {
        /// Command line being supervised.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled while the process was running.
    #[error("'{command}' cancelled: {reason}")]
    Cancelled {
        /// Command line that was interrupted.
        command: String,
        /// Cancellation reason.
        reason: String,
    },
}

impl InvokeError {
    /// Creates a launch error.
    #[must_use]
    pub fn launch(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            command: command.into(),
            source,
        }
    }
}

impl From<InvokeError> for TractflowError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Cancelled { reason, .. } => Self::Cancelled(reason),
            other => Self::Invoke(other),
        }
    }
}

impl From<TransformError> for TractflowError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Resolution(e) => Self::Resolution(e),
            TransformError::Invoke(e) => e.into(),
            other => Self::Transform(other),
        }
    }
}

/// Error raised when a stage's post-condition check fails.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' incomplete: expected {expected}, found {actual}")]
pub struct ValidationError {
    /// The stage whose outputs were checked.
    pub stage: StageId,
    /// Human-readable description of the expected artifacts.
    pub expected: String,
    /// Human-readable description of what was found.
    pub actual: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(stage: StageId, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            stage,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
