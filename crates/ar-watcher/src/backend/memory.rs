use std::sync::Arc;

use ar_core::{FxHashMap, FxHashSet};
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;

use super::WatchBackend;
use crate::{EventKind, RawEvent, WatchError, WatchHandle};

/// In-process backend with injectable events.
///
/// Clones share state, so a test can keep one clone to inject events while
/// the [`DirectoryWatcher`](crate::DirectoryWatcher) owns another.
///
/// # Examples
///
/// ```
/// use ar_watcher::{EventKind, MemoryBackend, WatchBackend};
/// use camino::Utf8Path;
///
/// let mut backend = MemoryBackend::new();
/// let handle = backend.add_watch(Utf8Path::new("/srv/app")).unwrap();
///
/// assert!(backend.touch(Utf8Path::new("/srv/app/app.py"), EventKind::WriteClosed));
/// let events = backend.read_events();
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].handle, handle);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_handle: u64,
    watches: FxHashMap<Utf8PathBuf, WatchHandle>,
    refused: FxHashSet<Utf8PathBuf>,
    pending: Vec<RawEvent>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes future [`add_watch`](WatchBackend::add_watch) calls on `dir` fail.
    pub fn refuse(&self, dir: impl Into<Utf8PathBuf>) {
        self.state.lock().refused.insert(dir.into());
    }

    /// Queues a raw event as is.
    pub fn push(&self, event: RawEvent) {
        self.state.lock().pending.push(event);
    }

    /// Queues an event for `path` on the watch of its parent directory.
    ///
    /// Returns `false` when the parent is not watched.
    pub fn touch(&self, path: &Utf8Path, kind: EventKind) -> bool {
        let mut state = self.state.lock();
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        let Some(&handle) = state.watches.get(parent) else {
            return false;
        };
        state.pending.push(RawEvent::new(handle, kind, name));
        true
    }

    /// Returns the handle registered for `dir`.
    pub fn handle_of(&self, dir: &Utf8Path) -> Option<WatchHandle> {
        self.state.lock().watches.get(dir).copied()
    }

    /// All watched directories, sorted.
    pub fn watched_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs: Vec<_> = self.state.lock().watches.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    /// Number of events waiting to be read.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl WatchBackend for MemoryBackend {
    fn add_watch(&mut self, dir: &Utf8Path) -> Result<WatchHandle, WatchError> {
        let mut state = self.state.lock();
        if state.refused.contains(dir) {
            return Err(WatchError::refused(dir));
        }
        if let Some(&handle) = state.watches.get(dir) {
            return Ok(handle);
        }
        state.next_handle += 1;
        let handle = WatchHandle::new(state.next_handle);
        state.watches.insert(dir.to_owned(), handle);
        Ok(handle)
    }

    fn remove_watch(&mut self, dir: &Utf8Path) {
        self.state.lock().watches.remove(dir);
    }

    fn read_events(&mut self) -> Vec<RawEvent> {
        std::mem::take(&mut self.state.lock().pending)
    }
}
