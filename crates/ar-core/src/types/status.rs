//! Target run state.
//!
//! This module provides the [`TargetStatus`] enum describing what the
//! supervision system reports for a target when asked for its status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The run state of a supervised target.
///
/// Only [`Active`](Self::Active) targets are ever restarted. Anything the
/// supervisor reports that is not recognised is kept verbatim in
/// [`Other`](Self::Other) so it can still be logged.
///
/// # Examples
///
/// ```
/// use ar_core::TargetStatus;
///
/// assert!(TargetStatus::from_reply("active").is_active());
/// assert!(!TargetStatus::from_reply("stopped").is_active());
/// assert_eq!(
///     TargetStatus::from_reply("starting"),
///     TargetStatus::Other("starting".to_owned())
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// The target's processes are running.
    Active,

    /// The target is stopped.
    Stopped,

    /// Any other state reported by the supervisor (`starting`, `stopping`, ...).
    Other(String),
}

impl TargetStatus {
    /// Parses the status string found in a supervisor reply.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    #[must_use]
    pub fn from_reply(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Self::Active,
            "stopped" => Self::Stopped,
            _ => Self::Other(normalized),
        }
    }

    /// Returns `true` if the target is currently running.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns the label used in logs and CLI output.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
