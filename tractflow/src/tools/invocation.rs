//! A single tool command line and its outcome.

use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Tool;

/// One fully built invocation: `<program> <args…>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    tool: Tool,
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl ToolInvocation {
    /// Starts an invocation of `program` on behalf of `tool`.
    #[must_use]
    pub fn new(tool: Tool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The tool this invocation runs.
    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// The executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the executable.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Working directory, if set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Positional argument `i`, as a path.
    #[must_use]
    pub fn path_arg(&self, i: usize) -> Option<&Path> {
        self.args.get(i).map(Path::new)
    }

    /// Position of a flag argument, if present.
    #[must_use]
    pub fn flag_position(&self, flag: &str) -> Option<usize> {
        self.args.iter().position(|a| a == flag)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Exited with a code.
    Code(i32),
    /// Terminated by a signal.
    Signaled,
    /// Killed after exceeding the timeout.
    TimedOut,
}

impl ExitStatus {
    /// Returns true for exit code zero.
    ///
    /// Stage success is still decided by checkpoint validation.
    #[must_use]
    pub fn success(self) -> bool {
        self == Self::Code(0)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "exit code {c}"),
            Self::Signaled => f.write_str("terminated by signal"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Result of running one invocation to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// How the process ended.
    pub exit: ExitStatus,
    /// Combined stdout/stderr lines in arrival order.
    pub output: Vec<String>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl InvocationOutcome {
    /// Outcome of a process that exited with `code` and printed nothing.
    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            exit: ExitStatus::Code(code),
            output: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Shorthand for `exit.success()`.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit.success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_display() {
        let inv = ToolInvocation::new(Tool::ClusterFromAtlas, "/opt/bin/PythonSlicer")
            .arg("/opt/lib/Python/bin/wm_cluster_from_atlas.py")
            .args(["-j", "4"])
            .arg(Path::new("/out/reg.vtk"))
            .current_dir("/out");

        assert_eq!(inv.tool(), Tool::ClusterFromAtlas);
        assert_eq!(inv.arguments().len(), 4);
        assert_eq!(inv.flag_position("-j"), Some(1));
        assert_eq!(inv.path_arg(3), Some(Path::new("/out/reg.vtk")));
        assert_eq!(inv.cwd(), Some(Path::new("/out")));
        assert_eq!(
            inv.to_string(),
            "/opt/bin/PythonSlicer /opt/lib/Python/bin/wm_cluster_from_atlas.py -j 4 /out/reg.vtk"
        );
    }

    #[test]
    fn test_exit_status() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(1).success());
        assert!(!ExitStatus::TimedOut.success());
        assert_eq!(ExitStatus::Code(2).to_string(), "exit code 2");
        assert!(InvocationOutcome::exited(0).success());
    }
}
