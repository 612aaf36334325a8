//! Package reference parsing.
//!
//! A package is always addressed as `owner/name`. Tags are never part of the
//! reference; they are passed as a separate selector.

use crate::error::{GhcrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
mod tests;

/// An `owner/name` container package reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    owner: String,
    name: String,
}

impl PackageRef {
    /// Creates a reference from already-validated parts.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();
        Self::from_str(&format!("{}/{}", owner, name))
    }

    /// Returns the owner (user or organization login).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the repository path used on the registry plane.
    ///
    /// GHCR repository names are lowercase.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::PackageRef;
    /// use std::str::FromStr;
    ///
    /// let pkg = PackageRef::from_str("Octo-Org/My-App").unwrap();
    /// assert_eq!(pkg.image(), "octo-org/my-app");
    /// assert_eq!(pkg.to_string(), "Octo-Org/My-App");
    /// ```
    pub fn image(&self) -> String {
        format!(
            "{}/{}",
            self.owner.to_ascii_lowercase(),
            self.name.to_ascii_lowercase()
        )
    }
}

impl FromStr for PackageRef {
    type Err = GhcrError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(':') {
            return Err(GhcrError::usage(format!(
                "invalid package reference '{}': inline tags not supported, use --tag to select a tag",
                s
            )));
        }

        let Some((owner, name)) = s.split_once('/') else {
            return Err(GhcrError::usage(format!(
                "invalid package reference '{}': must be in format owner/package",
                s
            )));
        };

        if name.contains('/') {
            return Err(GhcrError::usage(format!(
                "invalid package reference '{}': must be in format owner/package",
                s
            )));
        }
        if owner.is_empty() {
            return Err(GhcrError::usage(format!(
                "invalid package reference '{}': owner cannot be empty",
                s
            )));
        }
        if name.is_empty() {
            return Err(GhcrError::usage(format!(
                "invalid package reference '{}': package cannot be empty",
                s
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
