//! Directory watching and restart decisions for supervised targets.
//!
//! This crate answers one question per target: did anything that matters
//! change in its working directory since the last time we asked?
//!
//! # Overview
//!
//! - [`RuleMatcher`] / [`PatternSet`] compile the target's
//!   `.autorestart_includes` and `.autorestart_excludes` files (gitignore
//!   syntax) into predicates.
//! - [`WatchTree`] registers one non-recursive watch per directory,
//!   skipping excluded subtrees.
//! - [`DirectoryWatcher`] owns a backend plus the handle to directory map and
//!   drains events into a single yes/no answer.
//! - [`WatchBackend`] abstracts the notification facility; [`NotifyBackend`]
//!   uses the platform one, [`MemoryBackend`] is driven by hand.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── DirectoryWatcher ─────────────────────────────┐
//! │                                                                            │
//! │  PatternSet ──should_descend──► WatchTree ──add_watch──► WatchBackend      │
//! │      │                              │                         │            │
//! │      │                          WatchMap ◄──── handle ─── read_events      │
//! │      ▼                              │                         │            │
//! │  classify(path, is_dir) ◄──── dir / name ◄──── RawEvent ◄─────┘            │
//! │                                                                            │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! ar-cli ──► ar-registry ──► ar-watcher ──► ar-core
//!                        └─► ar-supervisor ─►
//! ```
//!
//! # Usage
//!
//! ```
//! use ar_core::{Target, WatchConfig};
//! use ar_watcher::{DirectoryWatcher, EventKind, MemoryBackend};
//! use camino::Utf8PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let root = Utf8PathBuf::try_from(dir.path().canonicalize()?)?;
//! std::fs::write(root.join(".autorestart_includes"), "*.py\n")?;
//!
//! let backend = MemoryBackend::new();
//! let mut watcher = DirectoryWatcher::start(
//!     Target::new("web", root.clone()),
//!     &WatchConfig::default(),
//!     Box::new(backend.clone()),
//! );
//!
//! backend.touch(&root.join("app.log"), EventKind::WriteClosed);
//! assert!(!watcher.has_changed());
//!
//! backend.touch(&root.join("app.py"), EventKind::WriteClosed);
//! assert!(watcher.has_changed());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod directory;
pub mod error;
pub mod events;
pub mod rules;
pub mod tree;

pub use backend::{BackendFactory, MemoryBackend, NotifyBackend, NotifyBackendFactory, WatchBackend};
pub use directory::DirectoryWatcher;
pub use error::WatchError;
pub use events::{EventKind, RawEvent, WatchHandle};
pub use rules::{Decision, PatternSet, RuleMatcher};
pub use tree::{WatchMap, WatchTree};
