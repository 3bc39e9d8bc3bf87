//! Configuration structures for autorestart.
//!
//! - [`WatchConfig`] - Rule file names and directory-walk behaviour
//! - [`ScheduleConfig`] - Poll/reconcile cadence and the restart signal
//! - [`SupervisorConfig`] - How to reach the supervision system
//! - [`Config`] - Root configuration combining all sections
//!
//! Every section is `#[serde(default)]`, so a configuration file only needs
//! to mention the values it changes.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default name of the include-rule file inside a working directory.
pub const DEFAULT_INCLUDES_FILE: &str = ".autorestart_includes";

/// Default name of the exclude-rule file inside a working directory.
pub const DEFAULT_EXCLUDES_FILE: &str = ".autorestart_excludes";

/// Highest signal number accepted for `kill_signal`.
const MAX_SIGNAL: i32 = 64;

/// Configuration for directory watching and rule files.
///
/// # Examples
///
/// ```
/// use ar_core::WatchConfig;
/// use camino::Utf8Path;
///
/// let config = WatchConfig::default();
/// assert_eq!(
///     config.includes_path(Utf8Path::new("/srv/app")),
///     "/srv/app/.autorestart_includes"
/// );
/// assert!(!config.watch_new_directories);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// File name of the include rules, relative to the working directory.
    pub includes_file: String,

    /// File name of the exclude rules, relative to the working directory.
    pub excludes_file: String,

    /// Whether symlinked directories are followed while walking.
    pub follow_links: bool,

    /// Register watches on directories created after monitoring started.
    ///
    /// Off by default: a directory created under a monitored tree produces a
    /// create event in its parent but is not watched itself.
    pub watch_new_directories: bool,
}

impl WatchConfig {
    /// Returns the include-rule file for a working directory.
    #[must_use]
    pub fn includes_path(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        working_dir.join(&self.includes_file)
    }

    /// Returns the exclude-rule file for a working directory.
    #[must_use]
    pub fn excludes_path(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        working_dir.join(&self.excludes_file)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            includes_file: DEFAULT_INCLUDES_FILE.to_owned(),
            excludes_file: DEFAULT_EXCLUDES_FILE.to_owned(),
            follow_links: true,
            watch_new_directories: false,
        }
    }
}

/// Cadence of the two periodic actions and the restart signal.
///
/// # Examples
///
/// ```
/// use ar_core::ScheduleConfig;
/// use std::time::Duration;
///
/// let config = ScheduleConfig::default();
/// assert_eq!(config.poll_interval(), Duration::from_secs(1));
/// assert_eq!(config.reconcile_interval(), Duration::from_secs(10));
/// assert_eq!(config.kill_signal, 9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval of the change-detection tick in milliseconds.
    pub poll_interval_ms: u64,

    /// Interval of the target reconciliation tick in milliseconds.
    pub reconcile_interval_ms: u64,

    /// Signal sent to a target that needs a restart.
    pub kill_signal: i32,
}

impl ScheduleConfig {
    /// Returns the poll interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the reconcile interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            reconcile_interval_ms: 10_000,
            kill_signal: 9,
        }
    }
}

/// How to reach the supervision system's command channel.
///
/// # Examples
///
/// ```
/// use ar_core::SupervisorConfig;
///
/// let config = SupervisorConfig::default();
/// assert_eq!(config.program, "circusctl");
/// assert!(config.endpoint.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Control program invoked for every command.
    pub program: String,

    /// Endpoint passed to the control program, if not its default.
    pub endpoint: Option<String>,

    /// Upper bound on a single command round-trip in milliseconds.
    pub timeout_ms: u64,
}

impl SupervisorConfig {
    /// Returns the command timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "circusctl".to_owned(),
            endpoint: None,
            timeout_ms: 5_000,
        }
    }
}

/// Root configuration for autorestart.
///
/// # Examples
///
/// ```
/// use ar_core::Config;
///
/// let config = Config::from_json_str(r#"{"schedule": {"poll_interval_ms": 250}}"#)?;
/// assert_eq!(config.schedule.poll_interval_ms, 250);
/// assert_eq!(config.schedule.reconcile_interval_ms, 10_000);
/// # Ok::<(), ar_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watching and rule-file configuration.
    pub watch: WatchConfig,

    /// Tick cadence and restart signal.
    pub schedule: ScheduleConfig,

    /// Supervisor command channel.
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.to_owned()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every option holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "schedule.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.schedule.reconcile_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "schedule.reconcile_interval_ms",
                "must be greater than zero",
            ));
        }
        if !(1..=MAX_SIGNAL).contains(&self.schedule.kill_signal) {
            return Err(ConfigError::invalid_option(
                "schedule.kill_signal",
                format!("must be between 1 and {MAX_SIGNAL}"),
            ));
        }
        validate_rule_file_name("watch.includes_file", &self.watch.includes_file)?;
        validate_rule_file_name("watch.excludes_file", &self.watch.excludes_file)?;
        if self.supervisor.program.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "supervisor.program",
                "must not be empty",
            ));
        }
        if self.supervisor.timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "supervisor.timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Rule files live directly in the working directory.
fn validate_rule_file_name(option: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::invalid_option(option, "must not be empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(ConfigError::invalid_option(
            option,
            "must be a file name, not a path",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.includes_file, ".autorestart_includes");
        assert_eq!(config.excludes_file, ".autorestart_excludes");
        assert!(config.follow_links);
        assert!(!config.watch_new_directories);
    }

    #[test]
    fn test_rule_paths_join_working_dir() {
        let config = WatchConfig::default();
        let dir = Utf8Path::new("/srv/svc1");
        assert_eq!(config.includes_path(dir), "/srv/svc1/.autorestart_includes");
        assert_eq!(config.excludes_path(dir), "/srv/svc1/.autorestart_excludes");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"watch": {"watch_new_directories": true}, "supervisor": {"endpoint": "tcp://127.0.0.1:5555"}}"#;
        let config = Config::from_json_str(json).expect("valid config");
        assert!(config.watch.watch_new_directories);
        assert_eq!(config.watch.includes_file, DEFAULT_INCLUDES_FILE);
        assert_eq!(
            config.supervisor.endpoint.as_deref(),
            Some("tcp://127.0.0.1:5555")
        );
        assert_eq!(config.schedule.kill_signal, 9);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = Config::from_json_str(r#"{"schedule": {"poll_interval_ms": 0}}"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOption { ref option, .. }) if option == "schedule.poll_interval_ms"
        ));
    }

    #[test]
    fn test_signal_out_of_range_rejected() {
        let result = Config::from_json_str(r#"{"schedule": {"kill_signal": 0}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidOption { .. })));
        let result = Config::from_json_str(r#"{"schedule": {"kill_signal": 65}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn test_rule_file_with_separator_rejected() {
        let result = Config::from_json_str(r#"{"watch": {"excludes_file": "conf/excludes"}}"#);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOption { ref option, .. }) if option == "watch.excludes_file"
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Utf8Path::new("/nonexistent/autorestart.json"));
        assert!(matches!(result, Err(ConfigError::MissingFile(_))));
    }

    #[test]
    fn test_from_file_reads_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("autorestart.json");
        std::fs::write(&path, r#"{"schedule": {"reconcile_interval_ms": 2000}}"#).expect("write");
        let path = Utf8PathBuf::try_from(path).expect("utf-8 temp path");

        let config = Config::from_file(&path).expect("load");
        assert_eq!(config.schedule.reconcile_interval(), Duration::from_secs(2));
    }
}
