//! Optional settings file and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::observability::LogFormat;
use crate::pipeline::ValidationPolicy;

/// Overrides the interpreter location.
pub const ENV_INTERPRETER: &str = "TRACTFLOW_INTERPRETER";

/// Overrides the host application executable handed to the harden tool.
pub const ENV_SLICER: &str = "TRACTFLOW_SLICER";

/// Overrides the atlas directory.
pub const ENV_ATLAS_DIR: &str = "TRACTFLOW_ATLAS_DIR";

/// Overrides the diffusion measurement CLI location.
pub const ENV_MEASUREMENT_CLI: &str = "TRACTFLOW_MEASUREMENT_CLI";

/// Overrides the per-tool timeout, in seconds.
pub const ENV_TOOL_TIMEOUT: &str = "TRACTFLOW_TOOL_TIMEOUT";

/// Errors loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("Failed to read settings file {}: {source}", .path.display())]
    Read {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`Settings`].
    #[error("Invalid settings file {}: {source}", .path.display())]
    Parse {
        /// Settings path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Base level when neither `-v` nor `RUST_LOG` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Toolchain and run settings read from an optional JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Interpreter executable; searched on `PATH` when unset.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
    /// Folder holding the toolkit scripts; derived from the interpreter when unset.
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
    /// Diffusion measurement CLI executable.
    #[serde(default)]
    pub measurement_cli: Option<PathBuf>,
    /// Host application executable; derived from the interpreter when unset.
    #[serde(default)]
    pub slicer: Option<PathBuf>,
    /// Atlas bundle, or a folder containing one.
    #[serde(default)]
    pub atlas_dir: Option<PathBuf>,
    /// Per-invocation timeout in seconds; unlimited when unset.
    #[serde(default)]
    pub tool_timeout_seconds: Option<u64>,
    /// Worker threads when not given on the command line.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// What to do when a stage fails validation.
    #[serde(default)]
    pub validation_policy: ValidationPolicy,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogSettings,
}

fn default_threads() -> usize {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interpreter: None,
            script_dir: None,
            measurement_cli: None,
            slicer: None,
            atlas_dir: None,
            tool_timeout_seconds: None,
            threads: default_threads(),
            validation_policy: ValidationPolicy::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `TRACTFLOW_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_INTERPRETER) {
            self.interpreter = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_ATLAS_DIR) {
            self.atlas_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_MEASUREMENT_CLI) {
            self.measurement_cli = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_SLICER) {
            self.slicer = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_TOOL_TIMEOUT) {
            let secs = v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_TOOL_TIMEOUT,
                value: v.clone(),
            })?;
            self.tool_timeout_seconds = (secs > 0).then_some(secs);
        }
        Ok(self)
    }

    /// Sets the interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }

    /// Sets the script folder.
    #[must_use]
    pub fn with_script_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(path.into());
        self
    }

    /// Sets the measurement CLI.
    #[must_use]
    pub fn with_measurement_cli(mut self, path: impl Into<PathBuf>) -> Self {
        self.measurement_cli = Some(path.into());
        self
    }

    /// Sets the host application executable.
    #[must_use]
    pub fn with_slicer(mut self, path: impl Into<PathBuf>) -> Self {
        self.slicer = Some(path.into());
        self
    }

    /// Sets the atlas directory.
    #[must_use]
    pub fn with_atlas_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.atlas_dir = Some(path.into());
        self
    }

    /// Sets the per-tool timeout.
    #[must_use]
    pub fn with_tool_timeout(mut self, seconds: u64) -> Self {
        self.tool_timeout_seconds = Some(seconds);
        self
    }

    /// Sets the validation policy.
    #[must_use]
    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation_policy = policy;
        self
    }

    /// Gets the tool timeout as a `Duration`.
    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_seconds.map(Duration::from_secs)
    }
}
