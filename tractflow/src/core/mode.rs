//! Registration mode selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::InputError;

/// How the input tractography is registered to the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistrationMode {
    /// A single fast rigid+affine registration.
    #[default]
    #[serde(rename = "affine")]
    Affine,
    /// Affine registration followed by a non-rigid refinement.
    #[serde(rename = "affine+nonlinear")]
    AffineNonlinear,
}

impl RegistrationMode {
    /// Returns true if the mode adds a non-rigid refinement.
    #[must_use]
    pub fn is_nonlinear(self) -> bool {
        matches!(self, Self::AffineNonlinear)
    }
}

impl fmt::Display for RegistrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Affine => write!(f, "affine"),
            Self::AffineNonlinear => write!(f, "affine+nonlinear"),
        }
    }
}

impl FromStr for RegistrationMode {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        match normalized.as_str() {
            "affine" => Ok(Self::Affine),
            "affine+nonlinear" | "affine+nonrigid" | "nonlinear" => Ok(Self::AffineNonlinear),
            _ => Err(InputError::UnknownMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("affine".parse::<RegistrationMode>().unwrap(), RegistrationMode::Affine);
        assert_eq!(
            "affine+nonlinear".parse::<RegistrationMode>().unwrap(),
            RegistrationMode::AffineNonlinear
        );
        assert_eq!(
            "Affine + Nonlinear".parse::<RegistrationMode>().unwrap(),
            RegistrationMode::AffineNonlinear
        );
        assert!("rigid".parse::<RegistrationMode>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for mode in [RegistrationMode::Affine, RegistrationMode::AffineNonlinear] {
            assert_eq!(mode.to_string().parse::<RegistrationMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RegistrationMode::AffineNonlinear).unwrap();
        assert_eq!(json, r#""affine+nonlinear""#);
    }
}
