//! Change detection for a single target's working directory.

use std::sync::Arc;

use ar_core::{Target, TargetName, WatchConfig};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, trace, warn};

use crate::{Decision, EventKind, PatternSet, WatchBackend, WatchHandle, WatchMap, WatchTree};

/// Watches one target's working directory and decides whether the changes
/// seen since the last check warrant a restart.
///
/// Rules are compiled once, at [`start`](Self::start). Watches of deleted
/// directories are forgotten as their deletion is reported. Dropping the
/// watcher drops its backend, which releases every watch.
///
/// # Examples
///
/// ```no_run
/// use ar_core::{Target, WatchConfig};
/// use ar_watcher::{DirectoryWatcher, NotifyBackend};
///
/// # fn main() -> Result<(), ar_watcher::WatchError> {
/// let target = Target::new("web", "/srv/web");
/// let backend = Box::new(NotifyBackend::new()?);
/// let mut watcher = DirectoryWatcher::start(target, &WatchConfig::default(), backend);
///
/// if watcher.has_changed() {
///     // restart "web"
/// }
/// # Ok(())
/// # }
/// ```
pub struct DirectoryWatcher {
    target: Target,
    rules: Arc<PatternSet>,
    watches: WatchMap,
    backend: Box<dyn WatchBackend>,
    follow_links: bool,
    watch_new_directories: bool,
}

impl DirectoryWatcher {
    /// Compiles the target's rules and registers watches over its tree.
    ///
    /// The working directory is canonicalised when possible so event paths
    /// and rule anchors agree.
    pub fn start(target: Target, config: &WatchConfig, mut backend: Box<dyn WatchBackend>) -> Self {
        let working_dir = target
            .working_dir
            .canonicalize_utf8()
            .unwrap_or_else(|_| target.working_dir.clone());
        let target = Target::new(target.name, working_dir);

        let rules = Arc::new(PatternSet::load(&target.working_dir, config));
        let descend = Arc::clone(&rules);
        let watches = WatchTree::new(&target.working_dir)
            .with_follow_links(config.follow_links)
            .register(backend.as_mut(), move |dir| descend.should_descend(dir));

        info!(
            target_name = %target.name,
            dir = %target.working_dir,
            watches = watches.len(),
            "Started monitoring"
        );

        Self {
            target,
            rules,
            watches,
            backend,
            follow_links: config.follow_links,
            watch_new_directories: config.watch_new_directories,
        }
    }

    /// The monitored target's name.
    #[inline]
    pub fn name(&self) -> &TargetName {
        &self.target.name
    }

    /// The monitored target.
    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The (canonical) working directory.
    #[inline]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.target.working_dir
    }

    /// The compiled rules.
    #[inline]
    pub fn rules(&self) -> &PatternSet {
        &self.rules
    }

    /// Number of directories currently watched.
    #[inline]
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Every watched directory, sorted.
    pub fn watched_directories(&self) -> Vec<&Utf8Path> {
        let mut dirs: Vec<&Utf8Path> = self.watches.values().map(Utf8PathBuf::as_path).collect();
        dirs.sort_unstable();
        dirs
    }

    /// Classifies a path without touching the filesystem.
    #[inline]
    pub fn classify(&self, path: &Utf8Path, is_dir: bool) -> Decision {
        self.rules.classify(path, is_dir)
    }

    /// Returns `true` if a change to `path` counts towards a restart.
    #[inline]
    pub fn decide(&self, path: &Utf8Path, is_dir: bool) -> bool {
        self.classify(path, is_dir).is_included()
    }

    /// Drains pending events and reports whether any of them was included.
    ///
    /// All pending events are consumed even after the first inclusion, so a
    /// second call without new activity returns `false`.
    pub fn has_changed(&mut self) -> bool {
        let events = self.backend.read_events();
        let mut changed = false;

        for event in events {
            trace!(target_name = %self.target.name, %event, "Filesystem event");
            let Some(dir) = self.watches.get(&event.handle) else {
                warn!(
                    target_name = %self.target.name,
                    handle = %event.handle,
                    "Event for unknown watch, ignoring"
                );
                continue;
            };
            let path = event.path_in(dir);
            let is_dir = path.is_dir();

            if event.has_kind(EventKind::Deleted) || event.has_kind(EventKind::SelfDeleted) {
                self.forget_directory(&path);
            }
            if self.watch_new_directories && is_dir && event.has_kind(EventKind::Created) {
                self.watch_new_directory(&path);
            }

            if changed {
                continue;
            }
            match self.classify(&path, is_dir) {
                Decision::Included => {
                    info!(target_name = %self.target.name, %path, "Change requires restart");
                    changed = true;
                }
                decision => {
                    debug!(target_name = %self.target.name, %path, %decision, "Ignoring change");
                }
            }
        }

        changed
    }

    fn watch_new_directory(&mut self, dir: &Utf8Path) {
        if !self.rules.should_descend(dir) || self.watches.values().any(|watched| watched == dir) {
            return;
        }
        let rules = Arc::clone(&self.rules);
        let added = WatchTree::new(dir)
            .with_follow_links(self.follow_links)
            .register(self.backend.as_mut(), move |child| rules.should_descend(child));
        debug!(
            target_name = %self.target.name,
            %dir,
            watches = added.len(),
            "Watching new directory"
        );
        self.watches.extend(added);
    }

    /// Drops the watches on `dir` and everything below it.
    ///
    /// A recreated directory gets a new watch, so the old entries must not
    /// shadow it.
    fn forget_directory(&mut self, dir: &Utf8Path) {
        let stale: Vec<WatchHandle> = self
            .watches
            .iter()
            .filter(|(_, watched)| watched.starts_with(dir))
            .map(|(&handle, _)| handle)
            .collect();
        if stale.is_empty() {
            return;
        }
        for handle in &stale {
            if let Some(watched) = self.watches.remove(handle) {
                self.backend.remove_watch(&watched);
            }
        }
        debug!(
            target_name = %self.target.name,
            %dir,
            dropped = stale.len(),
            "Directory deleted, dropped its watches"
        );
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("target", &self.target)
            .field("watches", &self.watches.len())
            .field("watch_new_directories", &self.watch_new_directories)
            .finish_non_exhaustive()
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        debug!(
            target_name = %self.target.name,
            watches = self.watches.len(),
            "Releasing watches"
        );
    }
}
