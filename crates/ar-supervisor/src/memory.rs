//! In-process supervisor.

use std::collections::BTreeMap;
use std::sync::Arc;

use ar_core::{TargetName, TargetStatus};
use camino::Utf8PathBuf;
use parking_lot::Mutex;

use crate::{Supervisor, SupervisorError, TargetOptions};

/// A supervisor whose state lives in memory.
///
/// Clones share state, so a test can keep a handle to change targets,
/// statuses or reachability while the registry owns another clone.
///
/// # Examples
///
/// ```
/// use ar_core::{TargetName, TargetStatus};
/// use ar_supervisor::{MemorySupervisor, Supervisor};
///
/// # async fn example() -> Result<(), ar_supervisor::SupervisorError> {
/// let supervisor = MemorySupervisor::new();
/// supervisor.add_target("web", Some("/srv/web"), TargetStatus::Active);
///
/// let web = TargetName::new("web");
/// supervisor.kill(&web, 9).await?;
/// assert_eq!(supervisor.kills(), vec![(web, 9)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySupervisor {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    targets: BTreeMap<TargetName, MemoryTarget>,
    kills: Vec<(TargetName, i32)>,
    unreachable: bool,
}

#[derive(Debug)]
struct MemoryTarget {
    working_dir: Option<Utf8PathBuf>,
    status: TargetStatus,
}

impl MemorySupervisor {
    /// Creates a supervisor with no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a target.
    pub fn add_target(
        &self,
        name: impl Into<TargetName>,
        working_dir: Option<impl Into<Utf8PathBuf>>,
        status: TargetStatus,
    ) {
        self.state.lock().targets.insert(
            name.into(),
            MemoryTarget {
                working_dir: working_dir.map(Into::into),
                status,
            },
        );
    }

    /// Removes a target; returns `true` if it existed.
    pub fn remove_target(&self, name: &str) -> bool {
        self.state.lock().targets.remove(name).is_some()
    }

    /// Changes the status of an existing target.
    pub fn set_status(&self, name: &str, status: TargetStatus) {
        if let Some(target) = self.state.lock().targets.get_mut(name) {
            target.status = status;
        }
    }

    /// Makes every subsequent call fail with [`SupervisorError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Every signal sent so far, in order.
    pub fn kills(&self) -> Vec<(TargetName, i32)> {
        self.state.lock().kills.clone()
    }

    fn check_reachable(state: &MemoryState) -> Result<(), SupervisorError> {
        if state.unreachable {
            Err(SupervisorError::Unreachable("memory supervisor is offline".to_owned()))
        } else {
            Ok(())
        }
    }

    fn rejected(command: &str, name: &TargetName) -> SupervisorError {
        SupervisorError::Rejected {
            command: format!("{command} {name}"),
            reason: "program not found".to_owned(),
        }
    }
}

impl Supervisor for MemorySupervisor {
    async fn list(&self) -> Result<Vec<TargetName>, SupervisorError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(state.targets.keys().cloned().collect())
    }

    async fn options(&self, name: &TargetName) -> Result<TargetOptions, SupervisorError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        let target = state
            .targets
            .get(name)
            .ok_or_else(|| Self::rejected("options", name))?;
        Ok(TargetOptions {
            working_dir: target.working_dir.clone(),
        })
    }

    async fn status(&self, name: &TargetName) -> Result<TargetStatus, SupervisorError> {
        let state = self.state.lock();
        Self::check_reachable(&state)?;
        state
            .targets
            .get(name)
            .map(|target| target.status.clone())
            .ok_or_else(|| Self::rejected("status", name))
    }

    async fn kill(&self, name: &TargetName, signum: i32) -> Result<(), SupervisorError> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        if !state.targets.contains_key(name) {
            return Err(Self::rejected("kill", name));
        }
        state.kills.push((name.clone(), signum));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_sorted() {
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("worker", None::<&str>, TargetStatus::Active);
        supervisor.add_target("api", Some("/srv/api"), TargetStatus::Stopped);

        let names = supervisor.list().await.unwrap();
        assert_eq!(names, [TargetName::new("api"), TargetName::new("worker")]);
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let supervisor = MemorySupervisor::new();
        let ghost = TargetName::new("ghost");

        assert!(matches!(
            supervisor.status(&ghost).await,
            Err(SupervisorError::Rejected { .. })
        ));
        assert!(supervisor.kill(&ghost, 9).await.is_err());
        assert!(supervisor.kills().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some("/srv/web"), TargetStatus::Active);
        supervisor.set_unreachable(true);

        let err = supervisor.list().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Unreachable(_)));

        supervisor.set_unreachable(false);
        assert_eq!(supervisor.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_changes_are_shared() {
        let supervisor = MemorySupervisor::new();
        let handle = supervisor.clone();
        supervisor.add_target("web", Some("/srv/web"), TargetStatus::Active);

        handle.set_status("web", TargetStatus::Stopped);
        let status = supervisor.status(&TargetName::new("web")).await.unwrap();
        assert_eq!(status, TargetStatus::Stopped);

        assert!(handle.remove_target("web"));
        assert!(supervisor.list().await.unwrap().is_empty());
    }
}
