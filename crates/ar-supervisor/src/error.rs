//! Error types for the ar-supervisor crate.

use std::time::Duration;

/// Errors raised while talking to the supervision system.
///
/// Every variant is local to one command: the caller skips whatever that
/// command was needed for and carries on with the next target or tick.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The control program could not be started or awaited.
    #[error("cannot run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within the configured timeout.
    #[error("`{command}` timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The command line.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The control program exited unsuccessfully.
    #[error("`{command}` failed with {}: {stderr}", exit_label(*code))]
    CommandFailed {
        /// The command line.
        command: String,
        /// Exit code, if the program exited normally.
        code: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The supervisor answered with an error reply.
    #[error("`{command}` rejected: {reason}")]
    Rejected {
        /// The command line.
        command: String,
        /// Reason given by the supervisor.
        reason: String,
    },

    /// The reply lacked a field the command needs.
    #[error("unexpected reply to `{command}`: {detail}")]
    UnexpectedReply {
        /// The command line.
        command: String,
        /// What was wrong with the reply.
        detail: String,
    },

    /// The reply was not valid JSON.
    #[error("invalid JSON reply: {0}")]
    Json(#[from] serde_json::Error),

    /// The supervisor cannot be reached at all.
    #[error("supervisor unreachable: {0}")]
    Unreachable(String),
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_owned(), |code| format!("exit code {code}"))
}

impl SupervisorError {
    /// Creates a new [`SupervisorError::UnexpectedReply`] error.
    #[inline]
    pub fn unexpected(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedReply {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Returns `true` if retrying the same command later may succeed.
    ///
    /// Rejections and malformed replies are answers, so they are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::Timeout { .. } | Self::CommandFailed { .. } | Self::Unreachable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = SupervisorError::CommandFailed {
            command: "circusctl --json list".to_owned(),
            code: Some(2),
            stderr: "Timed out".to_owned(),
        };
        assert_eq!(err.to_string(), "`circusctl --json list` failed with exit code 2: Timed out");
        assert!(err.is_transient());

        let err = SupervisorError::CommandFailed {
            command: "circusctl --json list".to_owned(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("a signal"));
    }

    #[test]
    fn test_timeout_display() {
        let err = SupervisorError::Timeout {
            command: "circusctl --json status web".to_owned(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "`circusctl --json status web` timed out after 250ms");
    }

    #[test]
    fn test_answers_are_not_transient() {
        let err = SupervisorError::unexpected("circusctl --json list", "missing `watchers`");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("missing `watchers`"));

        let err = SupervisorError::Rejected {
            command: "kill web".to_owned(),
            reason: "program not found".to_owned(),
        };
        assert!(!err.is_transient());
    }
}
