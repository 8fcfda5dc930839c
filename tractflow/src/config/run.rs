//! Immutable per-run inputs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{CaseId, RegistrationMode};
use crate::errors::InputError;
use crate::paths::PathPlanner;
use crate::pipeline::ValidationPolicy;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["vtk", "vtp"];

/// Validated inputs of one run.
///
/// Built once before any stage executes and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    input: PathBuf,
    output_root: PathBuf,
    case: CaseId,
    mode: RegistrationMode,
    threads: usize,
    retain_intermediates: bool,
    validation_policy: ValidationPolicy,
    tool_timeout: Option<Duration>,
}

impl RunConfiguration {
    /// Validates inputs and creates a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is missing or not `.vtk`/`.vtp`, the
    /// output root exists but is not a directory, or `threads` is zero.
    pub fn new(
        input: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        mode: RegistrationMode,
        threads: usize,
        retain_intermediates: bool,
    ) -> Result<Self, InputError> {
        let input = input.into();
        let output_root = output_root.into();

        if !input.is_file() {
            return Err(InputError::MissingInput(input));
        }
        if !has_supported_extension(&input) {
            return Err(InputError::UnsupportedInput(input));
        }
        if output_root.exists() && !output_root.is_dir() {
            return Err(InputError::OutputNotDirectory(output_root));
        }
        if threads == 0 {
            return Err(InputError::InvalidThreads);
        }
        let input = std::fs::canonicalize(&input).map_err(|_| InputError::MissingInput(input))?;
        let output_root = absolute_root(output_root);
        let case = CaseId::from_input(&input)?;

        Ok(Self {
            input,
            output_root,
            case,
            mode,
            threads,
            retain_intermediates,
            validation_policy: ValidationPolicy::default(),
            tool_timeout: None,
        })
    }

    /// Sets the validation policy.
    #[must_use]
    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation_policy = policy;
        self
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Input tractography.
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Case id derived from the input name.
    #[must_use]
    pub fn case(&self) -> &CaseId {
        &self.case
    }

    /// Registration mode.
    #[must_use]
    pub fn mode(&self) -> RegistrationMode {
        self.mode
    }

    /// Thread count passed to the tools and the harden pool.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether cleanup keeps the registration and outlier-removal outputs.
    #[must_use]
    pub fn retain_intermediates(&self) -> bool {
        self.retain_intermediates
    }

    /// Validation policy.
    #[must_use]
    pub fn validation_policy(&self) -> ValidationPolicy {
        self.validation_policy
    }

    /// Per-invocation timeout.
    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout
    }

    /// Path planner for this run.
    #[must_use]
    pub fn planner(&self) -> PathPlanner {
        PathPlanner::new(self.output_root.clone(), self.case.clone(), self.mode)
    }
}

/// Resolves `root` to an absolute path without requiring it to exist.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended, so every spelling of one folder maps to the same path.
fn absolute_root(root: PathBuf) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(&root) {
        return resolved;
    }
    let absolute = if root.is_absolute() {
        root
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(root),
            Err(_) => return root,
        }
    };

    let mut tail = Vec::new();
    let mut existing = absolute.as_path();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            return absolute.clone();
        };
        tail.push(name.to_os_string());
        existing = parent;
    }
    match std::fs::canonicalize(existing) {
        Ok(mut resolved) => {
            resolved.extend(tail.iter().rev());
            resolved
        }
        Err(_) => absolute.clone(),
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}
