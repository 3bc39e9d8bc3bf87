//! The [`Supervisor`] trait.

use std::future::Future;

use ar_core::{TargetName, TargetStatus};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::SupervisorError;

/// Options of a target relevant to monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
    /// The target's working directory, if it has one.
    pub working_dir: Option<Utf8PathBuf>,
}

impl TargetOptions {
    /// Options with the given working directory.
    #[must_use]
    pub fn with_working_dir(working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }
}

/// Command channel of a process supervision system.
///
/// Implementations must be usable from a single task that awaits one call
/// at a time; none of the methods are expected to be called concurrently.
pub trait Supervisor: Send + Sync {
    /// Names of every target the supervisor currently manages.
    fn list(&self) -> impl Future<Output = Result<Vec<TargetName>, SupervisorError>> + Send;

    /// Options of one target.
    fn options(
        &self,
        name: &TargetName,
    ) -> impl Future<Output = Result<TargetOptions, SupervisorError>> + Send;

    /// Current run state of one target.
    fn status(
        &self,
        name: &TargetName,
    ) -> impl Future<Output = Result<TargetStatus, SupervisorError>> + Send;

    /// Sends `signum` to every process of the target.
    fn kill(
        &self,
        name: &TargetName,
        signum: i32,
    ) -> impl Future<Output = Result<(), SupervisorError>> + Send;
}
