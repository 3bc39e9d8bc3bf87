//! Supervised targets.
//!
//! A target is one named process group owned by the supervision system. The
//! name is assigned externally and is the target's identity; the working
//! directory is what gets watched.

use std::borrow::Borrow;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// The externally assigned, unique name of a supervised target.
///
/// # Examples
///
/// ```
/// use ar_core::TargetName;
///
/// let name = TargetName::new("web");
/// assert_eq!(name.as_str(), "web");
/// assert_eq!(name.to_string(), "web");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetName(String);

impl TargetName {
    /// Creates a target name.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TargetName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TargetName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A supervised target selected for monitoring.
///
/// # Examples
///
/// ```
/// use ar_core::Target;
///
/// let target = Target::new("web", "/srv/web");
/// assert_eq!(target.name.as_str(), "web");
/// assert_eq!(target.working_dir.as_str(), "/srv/web");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Name of the target in the supervision system.
    pub name: TargetName,

    /// Working directory of the target's processes.
    pub working_dir: Utf8PathBuf,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(name: impl Into<TargetName>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Returns the working directory.
    #[inline]
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }
}
