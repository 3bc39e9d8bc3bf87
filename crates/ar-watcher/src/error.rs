//! Error types for the ar-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while registering watches and loading rule files.

use camino::Utf8PathBuf;

/// Errors that can occur during watch registration.
///
/// None of these stop monitoring as a whole. A failed registration skips
/// the affected directory and the walk continues; a failed backend creation
/// leaves the target unmonitored until the next reconciliation.
///
/// # Examples
///
/// ```
/// use ar_watcher::WatchError;
/// use camino::Utf8PathBuf;
///
/// let err = WatchError::refused("/srv/app/private");
/// assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/app/private"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification facility failed to initialise or to add a watch.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The backend refused to watch a directory.
    #[error("cannot watch {0}")]
    Refused(Utf8PathBuf),

    /// A rule file could not be compiled.
    #[error("invalid rule file {path}: {source}")]
    Rules {
        /// The rule file.
        path: Utf8PathBuf,
        /// The underlying gitignore error.
        #[source]
        source: ignore::Error,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::Refused`] error.
    #[inline]
    pub fn refused(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Refused(path.into())
    }

    /// Creates a new [`WatchError::Rules`] error.
    #[inline]
    pub fn rules(path: impl Into<Utf8PathBuf>, source: ignore::Error) -> Self {
        Self::Rules {
            path: path.into(),
            source,
        }
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Refused(path) | Self::Rules { path, .. } => Some(path),
            Self::Notify(_) | Self::NonUtf8Path(_) | Self::Io(_) => None,
        }
    }
}
