//! Outcomes of the two registry ticks.

use std::fmt;

use ar_core::TargetName;
use serde::Serialize;

/// Why a target was left unmonitored during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The supervisor did not return the target's options.
    OptionsUnavailable,
    /// The target has no working directory.
    NoWorkingDir,
    /// Neither rule file exists in the working directory.
    NotOptedIn,
    /// No notification backend could be created.
    BackendFailed,
}

impl SkipReason {
    /// Short label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OptionsUnavailable => "options unavailable",
            Self::NoWorkingDir => "no working directory",
            Self::NotOptedIn => "no rule files",
            Self::BackendFailed => "backend unavailable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What one reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Targets that started being monitored.
    pub added: Vec<TargetName>,
    /// Targets that vanished from the supervisor and were released.
    pub dropped: Vec<TargetName>,
    /// Unmonitored targets that stayed unmonitored, with the reason.
    pub skipped: Vec<(TargetName, SkipReason)>,
    /// The target list could not be fetched; nothing else was attempted.
    pub list_failed: bool,
}

impl ReconcileReport {
    /// Returns `true` if the monitored set changed.
    #[must_use]
    pub fn changed_monitoring(&self) -> bool {
        !self.added.is_empty() || !self.dropped.is_empty()
    }

    /// The skip reason recorded for `name`, if any.
    #[must_use]
    pub fn skip_reason(&self, name: &str) -> Option<SkipReason> {
        self.skipped
            .iter()
            .find(|(skipped, _)| skipped.as_str() == name)
            .map(|(_, reason)| *reason)
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list_failed {
            return f.write_str("target list unavailable");
        }
        write!(
            f,
            "{} added, {} dropped, {} skipped",
            self.added.len(),
            self.dropped.len(),
            self.skipped.len()
        )
    }
}

/// What one poll observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Targets with at least one included change.
    pub changed: Vec<TargetName>,
    /// Targets that were sent the restart signal.
    pub restarted: Vec<TargetName>,
}

impl PollReport {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_display() {
        let report = ReconcileReport {
            added: vec![TargetName::new("web")],
            skipped: vec![(TargetName::new("db"), SkipReason::NotOptedIn)],
            ..ReconcileReport::default()
        };
        assert_eq!(report.to_string(), "1 added, 0 dropped, 1 skipped");
        assert!(report.changed_monitoring());
        assert_eq!(report.skip_reason("db"), Some(SkipReason::NotOptedIn));
        assert_eq!(report.skip_reason("web"), None);

        let failed = ReconcileReport {
            list_failed: true,
            ..ReconcileReport::default()
        };
        assert_eq!(failed.to_string(), "target list unavailable");
        assert!(!failed.changed_monitoring());
    }

    #[test]
    fn test_poll_report_quiet() {
        assert!(PollReport::default().is_quiet());
        let report = PollReport {
            changed: vec![TargetName::new("web")],
            restarted: Vec::new(),
        };
        assert!(!report.is_quiet());
    }
}
