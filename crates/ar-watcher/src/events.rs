//! Raw notification events as delivered by a [`WatchBackend`].
//!
//! Events name the watch handle they were raised on and, when the event
//! concerns an entry inside the watched directory, that entry's name. An
//! empty name means the event concerns the watched directory itself.
//!
//! ```text
//! filesystem change
//!        │
//!        ▼
//!   WatchBackend::read_events  ──►  RawEvent { handle, kinds, name }
//!        │
//!        ▼
//!   DirectoryWatcher resolves handle -> directory, joins name
//! ```
//!
//! [`WatchBackend`]: crate::WatchBackend

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Opaque identifier of a registered directory watch.
///
/// Handles are issued by the backend and are unique for the lifetime of
/// that backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Wraps a raw backend identifier.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw backend identifier.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

/// The kinds of change a watch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file opened for writing was closed.
    WriteClosed,
    /// An entry was created in the watched directory.
    Created,
    /// An entry was removed from the watched directory.
    Deleted,
    /// The watched directory itself was removed.
    SelfDeleted,
    /// Permissions, ownership or timestamps changed.
    AttributeChanged,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::WriteClosed,
        Self::Created,
        Self::Deleted,
        Self::SelfDeleted,
        Self::AttributeChanged,
    ];

    /// Returns a short lowercase label for log output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::WriteClosed => "write_closed",
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::SelfDeleted => "self_deleted",
            Self::AttributeChanged => "attribute_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single notification read from a backend.
///
/// # Examples
///
/// ```
/// use ar_watcher::{EventKind, RawEvent, WatchHandle};
/// use camino::Utf8Path;
///
/// let event = RawEvent::new(WatchHandle::new(3), EventKind::Created, "app.py");
/// assert!(event.has_kind(EventKind::Created));
/// assert_eq!(event.path_in(Utf8Path::new("/srv/app")), "/srv/app/app.py");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// The watch this event was raised on.
    pub handle: WatchHandle,
    /// Change kinds carried by the event. Usually one, occasionally two.
    pub kinds: SmallVec<[EventKind; 2]>,
    /// Entry name relative to the watched directory; empty for the directory itself.
    pub name: String,
}

impl RawEvent {
    /// Creates an event carrying a single kind.
    #[must_use]
    pub fn new(handle: WatchHandle, kind: EventKind, name: impl Into<String>) -> Self {
        let mut kinds = SmallVec::new();
        kinds.push(kind);
        Self {
            handle,
            kinds,
            name: name.into(),
        }
    }

    /// Adds another kind to the event.
    #[must_use]
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    /// Returns `true` if the event carries `kind`.
    #[inline]
    #[must_use]
    pub fn has_kind(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns `true` if the event concerns the watched directory itself.
    #[inline]
    #[must_use]
    pub fn is_self_event(&self) -> bool {
        self.name.is_empty()
    }

    /// Resolves the affected path given the watched directory.
    #[must_use]
    pub fn path_in(&self, dir: &Utf8Path) -> Utf8PathBuf {
        if self.is_self_event() {
            dir.to_owned()
        } else {
            dir.join(&self.name)
        }
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.handle)?;
        for (i, kind) in self.kinds.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(kind.label())?;
        }
        write!(f, "] {}", self.name)
    }
}
