//! Resolution of the interpreter, scripts, host application and measurement CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Tool, ToolInvocation};
use crate::config::Settings;
use crate::errors::ResolutionError;
use crate::paths::PlatformPaths;

const MEASUREMENT_CLI_NAME: &str = "FiberTractMeasurements";
const HOST_NAME: &str = "Slicer";

/// Where the toolchain lives, resolved once per run.
#[derive(Debug, Clone)]
pub struct ToolchainLocator {
    interpreter: PathBuf,
    script_dir: PathBuf,
    measurement_cli: Option<PathBuf>,
    slicer: Option<PathBuf>,
}

impl ToolchainLocator {
    /// Creates a locator from explicit locations.
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_dir: script_dir.into(),
            measurement_cli: None,
            slicer: None,
        }
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

    /// Resolves the toolchain from settings and platform conventions.
    ///
    /// A missing interpreter is fatal. Missing scripts are only reported
    /// when the stage needing them runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be found.
    pub fn resolve(settings: &Settings, platform: &Arc<dyn PlatformPaths>) -> Result<Self, ResolutionError> {
        let interpreter = platform.locate_interpreter(settings.interpreter.as_deref())?;
        let script_dir = settings
            .script_dir
            .clone()
            .unwrap_or_else(|| platform.script_dir(&interpreter));
        let measurement_cli = settings
            .measurement_cli
            .clone()
            .or_else(|| platform.find_executable(MEASUREMENT_CLI_NAME));
        let slicer = settings
            .slicer
            .clone()
            .or_else(|| Some(platform.host_executable(&interpreter)).filter(|p| p.is_file()))
            .or_else(|| platform.find_executable(HOST_NAME));

        if measurement_cli.is_none() {
            warn!("{MEASUREMENT_CLI_NAME} not found; measurement stages will not complete");
        }
        if slicer.is_none() {
            warn!("{HOST_NAME} not found; transforms to native space will not complete");
        }
        debug!(
            platform = platform.name(),
            interpreter = %interpreter.display(),
            script_dir = %script_dir.display(),
            "Resolved toolchain"
        );

        Ok(Self {
            interpreter,
            script_dir,
            measurement_cli,
            slicer,
        })
    }

    /// The interpreter executable.
    #[must_use]
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    /// The script folder.
    #[must_use]
    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Expected location of a tool's script, whether or not it exists.
    #[must_use]
    pub fn script_path(&self, tool: Tool) -> PathBuf {
        self.script_dir.join(tool.script_name())
    }

    /// Resolves a tool's script.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is not installed.
    pub fn script(&self, tool: Tool) -> Result<PathBuf, ResolutionError> {
        let path = self.script_path(tool);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ResolutionError::Script {
                tool: tool.name().to_string(),
                path,
            })
        }
    }

    /// Resolves the measurement CLI.
    ///
    /// # Errors
    ///
    /// Returns an error if no CLI was configured or found.
    pub fn measurement_cli(&self) -> Result<&Path, ResolutionError> {
        self.measurement_cli
            .as_deref()
            .ok_or_else(|| ResolutionError::Script {
                tool: MEASUREMENT_CLI_NAME.to_string(),
                path: PathBuf::from(MEASUREMENT_CLI_NAME),
            })
    }

    /// Resolves the host application the harden tool drives.
    ///
    /// # Errors
    ///
    /// Returns an error if no host executable was configured or found.
    pub fn slicer(&self) -> Result<&Path, ResolutionError> {
        self.slicer.as_deref().ok_or_else(|| ResolutionError::Script {
            tool: HOST_NAME.to_string(),
            path: PathBuf::from(HOST_NAME),
        })
    }

    /// Starts an invocation `<interpreter> <script>` for a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool's script is not installed.
    pub fn invocation(&self, tool: Tool) -> Result<ToolInvocation, ResolutionError> {
        let script = self.script(tool)?;
        Ok(ToolInvocation::new(tool, &self.interpreter).arg(script))
    }
}
