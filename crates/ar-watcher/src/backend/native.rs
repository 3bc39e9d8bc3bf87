use std::sync::mpsc::{self, Receiver, TryRecvError};

use ar_core::FxHashMap;
use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use super::WatchBackend;
use crate::{EventKind, RawEvent, WatchError, WatchHandle};

/// Backend built on the platform notification facility.
///
/// Every registered directory gets its own non-recursive watch. Events are
/// queued by `notify` on its own thread and drained by
/// [`read_events`](WatchBackend::read_events).
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    handles: FxHashMap<Utf8PathBuf, WatchHandle>,
    next_handle: u64,
}

impl NotifyBackend {
    /// Creates a backend with no watches.
    pub fn new() -> Result<Self, WatchError> {
        let (tx, events) = mpsc::channel();
        let watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        Ok(Self {
            watcher,
            events,
            handles: FxHashMap::default(),
            next_handle: 1,
        })
    }

    /// Number of directories currently watched.
    pub fn watch_count(&self) -> usize {
        self.handles.len()
    }

    fn translate(&self, event: Event, out: &mut Vec<RawEvent>) {
        let Some(kind) = event_kind(&event.kind) else {
            trace!(kind = ?event.kind, "Ignoring notification kind");
            return;
        };

        for path in event.paths {
            let path = match Utf8PathBuf::try_from(path) {
                Ok(path) => path,
                Err(err) => {
                    debug!(path = %err.into_path_buf().display(), "Ignoring event on non-UTF-8 path");
                    continue;
                }
            };
            match self.locate(&path, kind) {
                Some(raw) => out.push(raw),
                None => trace!(%path, "Event outside watched directories"),
            }
        }
    }

    /// Attributes an event path to a watch: the entry's parent first, then
    /// the watched directory itself.
    fn locate(&self, path: &Utf8Path, kind: EventKind) -> Option<RawEvent> {
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(&handle) = self.handles.get(parent) {
                return Some(RawEvent::new(handle, kind, name));
            }
        }

        let &handle = self.handles.get(path)?;
        let kind = if kind == EventKind::Deleted {
            EventKind::SelfDeleted
        } else {
            kind
        };
        Some(RawEvent::new(handle, kind, ""))
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("watches", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl WatchBackend for NotifyBackend {
    fn add_watch(&mut self, dir: &Utf8Path) -> Result<WatchHandle, WatchError> {
        self.watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)?;

        if let Some(&handle) = self.handles.get(dir) {
            return Ok(handle);
        }
        let handle = WatchHandle::new(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(dir.to_owned(), handle);
        Ok(handle)
    }

    fn remove_watch(&mut self, dir: &Utf8Path) {
        if self.handles.remove(dir).is_none() {
            return;
        }
        // A deleted directory's watch is usually gone already.
        if let Err(error) = self.watcher.unwatch(dir.as_std_path()) {
            trace!(%dir, %error, "Watch already released");
        }
    }

    fn read_events(&mut self) -> Vec<RawEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => self.translate(event, &mut out),
                Ok(Err(error)) => warn!(%error, "Filesystem notification error"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Notification channel closed");
                    break;
                }
            }
        }
        out
    }
}

/// Maps a notify event kind onto the kinds a watch reports.
fn event_kind(kind: &notify::EventKind) -> Option<EventKind> {
    match kind {
        notify::EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(EventKind::WriteClosed),
        notify::EventKind::Create(_) => Some(EventKind::Created),
        notify::EventKind::Remove(_) => Some(EventKind::Deleted),
        notify::EventKind::Modify(ModifyKind::Metadata(_)) => Some(EventKind::AttributeChanged),
        #[cfg(not(target_os = "linux"))]
        notify::EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Some(EventKind::WriteClosed),
        _ => None,
    }
}
