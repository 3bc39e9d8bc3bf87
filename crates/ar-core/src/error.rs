//! Error types for the ar-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration loading and
//! validation failures.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use ar_core::ConfigError;
///
/// let error = ConfigError::invalid_option("schedule.poll_interval_ms", "must be greater than zero");
/// assert!(error.to_string().contains("poll_interval_ms"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    MissingFile(Utf8PathBuf),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The dotted name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_display() {
        let error = ConfigError::MissingFile(Utf8PathBuf::from("/etc/autorestart.json"));
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/autorestart.json"
        );
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("schedule.kill_signal", "must be between 1 and 64");
        let msg = error.to_string();
        assert!(msg.contains("schedule.kill_signal"));
        assert!(msg.contains("between 1 and 64"));
    }

    #[test]
    fn test_parse_error_from_serde() {
        let source = serde_json::from_str::<serde_json::Value>("{").expect_err("truncated json");
        let error = ConfigError::from(source);
        assert!(error.to_string().starts_with("failed to parse configuration"));
    }
}
