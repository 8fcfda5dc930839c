//! Case identifier derived from the input file name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::InputError;

/// Identifier of the subject being processed.
///
/// Derived once from the input tractography's file stem and used to build
/// every downstream path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Creates a case id from a raw string.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or contains a path separator.
    pub fn new(id: impl Into<String>) -> Result<Self, InputError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains(['/', '\\']) {
            return Err(InputError::InvalidCase(id.into()));
        }
        Ok(Self(id))
    }

    /// Derives the case id from an input tractography path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no usable file stem.
    pub fn from_input(path: &Path) -> Result<Self, InputError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| InputError::InvalidCase(path.to_path_buf()))?;
        Self::new(stem).map_err(|_| InputError::InvalidCase(path.to_path_buf()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_uses_stem() {
        let case = CaseId::from_input(Path::new("/data/subj01.vtk")).unwrap();
        assert_eq!(case.as_str(), "subj01");

        let case = CaseId::from_input(Path::new("relative/UKF_tracts.vtp")).unwrap();
        assert_eq!(case.to_string(), "UKF_tracts");
    }

    #[test]
    fn test_invalid_cases() {
        assert!(CaseId::new("").is_err());
        assert!(CaseId::new("  ").is_err());
        assert!(CaseId::new("a/b").is_err());
        assert!(CaseId::from_input(Path::new("/")).is_err());
    }
}
