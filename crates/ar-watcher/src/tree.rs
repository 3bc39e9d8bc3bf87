//! Registration of watches over a directory tree.
//!
//! The walk is driven by `ignore`'s iterative walker with every standard
//! filter disabled. Each visited directory gets one non-recursive watch; the
//! returned [`WatchMap`] maps every issued handle back to its directory.

use std::fs;

use ar_core::FxHashMap;
use camino::{Utf8Path, Utf8PathBuf};
use ignore::{DirEntry, WalkBuilder};
use tracing::{debug, warn};

use crate::{WatchBackend, WatchError, WatchHandle};

/// Maps watch handles to the directory they watch.
pub type WatchMap = FxHashMap<WatchHandle, Utf8PathBuf>;

/// A directory tree to register with a backend.
///
/// # Examples
///
/// ```
/// use ar_watcher::{MemoryBackend, WatchTree};
/// use camino::Utf8Path;
///
/// let mut backend = MemoryBackend::new();
/// let watches = WatchTree::new(Utf8Path::new("/nonexistent/tree"))
///     .register(&mut backend, |_| true);
/// assert!(watches.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct WatchTree {
    root: Utf8PathBuf,
    follow_links: bool,
}

impl WatchTree {
    /// Creates a tree rooted at `root`. Symlinked directories are followed.
    #[must_use]
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            follow_links: true,
        }
    }

    /// Sets whether symlinked directories are entered.
    #[must_use]
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// The tree's root.
    #[inline]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Watches the root and every descendant directory accepted by
    /// `should_descend`.
    ///
    /// A missing or unreadable root yields an empty map. Unreadable
    /// directories are neither watched nor entered. Directories the backend
    /// refuses are skipped, but their children are still visited. A symlink
    /// looping back to one of its ancestors is reported by the walker and
    /// skipped.
    pub fn register<B, F>(&self, backend: &mut B, should_descend: F) -> WatchMap
    where
        B: WatchBackend + ?Sized,
        F: Fn(&Utf8Path) -> bool + Send + Sync + 'static,
    {
        let mut watches = WatchMap::default();
        if !self.root.is_dir() {
            debug!(root = %self.root, "Nothing to watch, not a directory");
            return watches;
        }

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(self.follow_links)
            .threads(1)
            .filter_entry(move |entry| entry.depth() == 0 || descend_into(entry, &should_descend))
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(%error, "Skipping entry the walk could not read");
                    continue;
                }
            };
            if !is_directory(&entry) {
                continue;
            }
            let Some(dir) = Utf8Path::from_path(entry.path()) else {
                continue;
            };

            if let Err(error) = fs::read_dir(dir) {
                debug!(%dir, %error, "Cannot read directory, not watching it");
                continue;
            }
            match backend.add_watch(dir) {
                Ok(handle) => {
                    debug!(%dir, %handle, "Watching directory");
                    watches.insert(handle, dir.to_owned());
                }
                Err(error) => warn!(%dir, %error, "Cannot watch directory, skipping"),
            }
        }

        watches
    }
}

fn is_directory(entry: &DirEntry) -> bool {
    entry.file_type().is_some_and(|file_type| file_type.is_dir())
}

/// Decides whether the walk enters `entry`. Files are never yielded.
fn descend_into<F>(entry: &DirEntry, should_descend: &F) -> bool
where
    F: Fn(&Utf8Path) -> bool,
{
    if !is_directory(entry) {
        return false;
    }
    match Utf8Path::from_path(entry.path()) {
        Some(dir) if should_descend(dir) => true,
        Some(dir) => {
            debug!(%dir, "Directory excluded from watching");
            false
        }
        None => {
            let error = WatchError::NonUtf8Path(entry.path().to_path_buf());
            warn!(%error, "Skipping directory entry");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use tempfile::TempDir;

    fn tree() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        for sub in ["lib/core", "lib/util", "node_modules/pkg", "docs"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(root.join("lib/core/mod.py"), "").unwrap();
        (dir, root)
    }

    fn watched(watches: &WatchMap, root: &Utf8Path) -> Vec<String> {
        let mut dirs: Vec<String> = watches
            .values()
            .map(|dir| dir.strip_prefix(root).unwrap().to_string())
            .collect();
        dirs.sort();
        dirs
    }

    #[test]
    fn test_registers_every_directory() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();

        let watches = WatchTree::new(&root).register(&mut backend, |_| true);

        assert_eq!(
            watched(&watches, &root),
            ["", "docs", "lib", "lib/core", "lib/util", "node_modules", "node_modules/pkg"]
        );
        assert_eq!(backend.watched_dirs().len(), watches.len());
    }

    #[test]
    fn test_excluded_subtree_is_pruned() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();
        let excluded = root.join("node_modules");

        let watches = WatchTree::new(&root).register(&mut backend, move |dir| dir != excluded);

        assert_eq!(
            watched(&watches, &root),
            ["", "docs", "lib", "lib/core", "lib/util"]
        );
    }

    #[test]
    fn test_root_is_watched_even_if_predicate_rejects_it() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();

        let watches = WatchTree::new(&root).register(&mut backend, |_| false);

        assert_eq!(watched(&watches, &root), [""]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let mut backend = MemoryBackend::new();
        let watches = WatchTree::new("/nonexistent/autorestart").register(&mut backend, |_| true);
        assert!(watches.is_empty());
    }

    #[test]
    fn test_file_root_is_empty() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();
        let watches = WatchTree::new(root.join("lib/core/mod.py")).register(&mut backend, |_| true);
        assert!(watches.is_empty());
    }

    #[test]
    fn test_refused_directory_does_not_stop_the_walk() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();
        backend.refuse(root.join("lib"));

        let watches = WatchTree::new(&root).register(&mut backend, |_| true);

        let dirs = watched(&watches, &root);
        assert!(!dirs.contains(&"lib".to_string()));
        assert!(dirs.contains(&"lib/core".to_string()));
        assert!(dirs.contains(&"lib/util".to_string()));
    }

    #[test]
    fn test_every_call_is_fresh() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();
        let tree = WatchTree::new(&root);

        let first = tree.register(&mut backend, |_| true);
        let second = tree.register(&mut backend, |_| true);

        assert_eq!(first.len(), second.len());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let (_guard, root) = tree();
        std::os::unix::fs::symlink(&root, root.join("lib/loop")).unwrap();
        let mut backend = MemoryBackend::new();

        let watches = WatchTree::new(&root).register(&mut backend, |_| true);

        assert_eq!(watches.len(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed_when_disabled() {
        let (_guard, root) = tree();
        let outside = TempDir::new().unwrap();
        fs::create_dir(outside.path().join("extra")).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("linked")).unwrap();
        let mut backend = MemoryBackend::new();

        let followed = WatchTree::new(&root).register(&mut backend, |_| true);
        let plain = WatchTree::new(&root)
            .with_follow_links(false)
            .register(&mut backend, |_| true);

        assert_eq!(followed.len(), 9);
        assert_eq!(plain.len(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_not_watched() {
        use std::os::unix::fs::PermissionsExt;

        let (_guard, root) = tree();
        let locked = root.join("lib/util");
        fs::create_dir(locked.join("inner")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits do not bind this user (root), nothing to check.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        let mut backend = MemoryBackend::new();

        let watches = WatchTree::new(&root).register(&mut backend, |_| true);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            watched(&watches, &root),
            ["", "docs", "lib", "lib/core", "node_modules", "node_modules/pkg"]
        );
        assert!(backend.handle_of(&locked).is_none());
    }

    #[test]
    fn test_files_are_not_watched() {
        let (_guard, root) = tree();
        let mut backend = MemoryBackend::new();

        let watches = WatchTree::new(&root).register(&mut backend, |_| true);

        assert!(backend.handle_of(&root.join("lib/core/mod.py")).is_none());
        assert!(watches.values().all(|dir| dir.is_dir()));
    }
}
