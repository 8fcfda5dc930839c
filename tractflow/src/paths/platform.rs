//! Platform conventions for locating the interpreter and toolkit scripts.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::ResolutionError;

/// Stem of the host application executable.
const HOST_EXECUTABLE: &str = "Slicer";

/// Platform-specific naming of the interpreter and its script folder.
///
/// Selected once at startup through [`detect_platform`].
pub trait PlatformPaths: Send + Sync + Debug {
    /// Short platform name for logs.
    fn name(&self) -> &'static str;

    /// File name of the interpreter executable.
    fn interpreter_file_name(&self) -> &'static str;

    /// Name of the folder installed console scripts land in.
    fn script_dir_name(&self) -> &'static str;

    /// File name of an executable called `stem`.
    fn executable_name(&self, stem: &str) -> String {
        stem.to_string()
    }

    /// Searches `PATH` for the executable called `stem`.
    fn find_executable(&self, stem: &str) -> Option<PathBuf> {
        search_path(&self.executable_name(stem))
    }

    /// The host application the interpreter belongs to.
    ///
    /// The interpreter lives in `<host>/bin`, the host executable in `<host>`.
    fn host_executable(&self, interpreter: &Path) -> PathBuf {
        interpreter
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("..")
            .join(self.executable_name(HOST_EXECUTABLE))
    }

    /// Locates the interpreter, honouring an explicit location first.
    ///
    /// # Errors
    ///
    /// Returns an error if no interpreter executable is found.
    fn locate_interpreter(&self, explicit: Option<&Path>) -> Result<PathBuf, ResolutionError> {
        resolve_interpreter(self.interpreter_file_name(), explicit)
    }

    /// Folder holding the toolkit scripts for a given interpreter.
    ///
    /// The toolkit is installed into the interpreter's own site, i.e.
    /// `<interpreter dir>/../lib/Python/<script dir>`.
    fn script_dir(&self, interpreter: &Path) -> PathBuf {
        interpreter
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("..")
            .join("lib")
            .join("Python")
            .join(self.script_dir_name())
    }
}

/// Linux and macOS conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixPaths;

impl PlatformPaths for PosixPaths {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn interpreter_file_name(&self) -> &'static str {
        "PythonSlicer"
    }

    fn script_dir_name(&self) -> &'static str {
        "bin"
    }
}

/// Windows conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPaths;

impl PlatformPaths for WindowsPaths {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn interpreter_file_name(&self) -> &'static str {
        "PythonSlicer.exe"
    }

    fn script_dir_name(&self) -> &'static str {
        "Scripts"
    }

    fn executable_name(&self, stem: &str) -> String {
        format!("{stem}.exe")
    }

    fn locate_interpreter(&self, explicit: Option<&Path>) -> Result<PathBuf, ResolutionError> {
        if explicit.is_none() {
            // The interpreter ships next to the host executable.
            let sibling = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(self.interpreter_file_name())))
                .filter(|candidate| candidate.is_file());
            if let Some(found) = sibling {
                return Ok(found);
            }
        }
        resolve_interpreter(self.interpreter_file_name(), explicit)
    }
}

/// Returns the conventions of the platform this binary was built for.
#[must_use]
pub fn detect_platform() -> Arc<dyn PlatformPaths> {
    if cfg!(windows) {
        Arc::new(WindowsPaths)
    } else {
        Arc::new(PosixPaths)
    }
}

fn resolve_interpreter(file_name: &str, explicit: Option<&Path>) -> Result<PathBuf, ResolutionError> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(ResolutionError::Interpreter {
            name: file_name.to_string(),
            hint: Some(path.to_path_buf()),
        }),
        None => search_path(file_name).ok_or_else(|| ResolutionError::Interpreter {
            name: file_name.to_string(),
            hint: None,
        }),
    }
}

/// Searches `PATH` for an executable file name.
#[must_use]
pub fn search_path(file_name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_names() {
        let p = PosixPaths;
        assert_eq!(p.interpreter_file_name(), "PythonSlicer");
        assert_eq!(p.script_dir_name(), "bin");
        assert_eq!(
            p.script_dir(Path::new("/opt/Slicer/bin/PythonSlicer")),
            PathBuf::from("/opt/Slicer/bin/../lib/Python/bin")
        );
    }

    #[test]
    fn test_windows_names() {
        let p = WindowsPaths;
        assert_eq!(p.interpreter_file_name(), "PythonSlicer.exe");
        assert!(p.script_dir(Path::new("/Slicer/bin/PythonSlicer.exe")).ends_with("lib/Python/Scripts"));
    }

    #[test]
    fn test_executable_naming() {
        assert_eq!(PosixPaths.executable_name("FiberTractMeasurements"), "FiberTractMeasurements");
        assert_eq!(WindowsPaths.executable_name("FiberTractMeasurements"), "FiberTractMeasurements.exe");
        assert_eq!(
            PosixPaths.host_executable(Path::new("/opt/Slicer/bin/PythonSlicer")),
            PathBuf::from("/opt/Slicer/bin/../Slicer")
        );
        assert!(WindowsPaths
            .host_executable(Path::new("/Slicer/bin/PythonSlicer.exe"))
            .ends_with("Slicer.exe"));
    }

    #[test]
    fn test_explicit_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("PythonSlicer");
        std::fs::write(&exe, "").unwrap();

        let found = PosixPaths.locate_interpreter(Some(&exe)).unwrap();
        assert_eq!(found, exe);

        let missing = dir.path().join("nope");
        let err = PosixPaths.locate_interpreter(Some(&missing)).unwrap_err();
        assert!(matches!(err, ResolutionError::Interpreter { hint: Some(_), .. }));
    }

    #[test]
    fn test_detect_matches_target() {
        let platform = detect_platform();
        if cfg!(windows) {
            assert_eq!(platform.name(), "windows");
        } else {
            assert_eq!(platform.name(), "posix");
        }
    }
}
