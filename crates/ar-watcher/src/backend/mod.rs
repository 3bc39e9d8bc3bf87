//! Notification backends.
//!
//! A [`WatchBackend`] registers non-recursive watches on single directories
//! and hands back the events collected since the last read. Dropping a
//! backend releases every watch it holds.
//!
//! Two implementations ship with the crate:
//!
//! - [`NotifyBackend`] wraps the platform facility through `notify`;
//! - [`MemoryBackend`] keeps everything in process and lets callers inject
//!   events, which makes it suitable for tests and dry runs.

mod memory;
mod native;

use ar_core::Target;
use camino::Utf8Path;

use crate::{RawEvent, WatchError, WatchHandle};

pub use memory::MemoryBackend;
pub use native::NotifyBackend;

/// A source of directory change notifications.
pub trait WatchBackend: Send {
    /// Starts watching `dir` (non-recursively).
    ///
    /// Fails when the directory cannot be watched.
    fn add_watch(&mut self, dir: &Utf8Path) -> Result<WatchHandle, WatchError>;

    /// Stops watching `dir`. Unknown directories are ignored.
    fn remove_watch(&mut self, dir: &Utf8Path);

    /// Returns every event received since the previous call without blocking.
    fn read_events(&mut self) -> Vec<RawEvent>;
}

impl<B: WatchBackend + ?Sized> WatchBackend for Box<B> {
    fn add_watch(&mut self, dir: &Utf8Path) -> Result<WatchHandle, WatchError> {
        (**self).add_watch(dir)
    }

    fn remove_watch(&mut self, dir: &Utf8Path) {
        (**self).remove_watch(dir);
    }

    fn read_events(&mut self) -> Vec<RawEvent> {
        (**self).read_events()
    }
}

/// Creates one backend per monitored target.
pub trait BackendFactory: Send + Sync {
    /// Creates a fresh backend for `target`.
    fn create(&self, target: &Target) -> Result<Box<dyn WatchBackend>, WatchError>;
}

impl<F> BackendFactory for F
where
    F: Fn(&Target) -> Result<Box<dyn WatchBackend>, WatchError> + Send + Sync,
{
    fn create(&self, target: &Target) -> Result<Box<dyn WatchBackend>, WatchError> {
        self(target)
    }
}

/// Factory producing a [`NotifyBackend`] per target.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackendFactory;

impl BackendFactory for NotifyBackendFactory {
    fn create(&self, _target: &Target) -> Result<Box<dyn WatchBackend>, WatchError> {
        Ok(Box::new(NotifyBackend::new()?))
    }
}
