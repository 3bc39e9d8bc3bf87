//! Target reconciliation and restart loop.
//!
//! [`WatcherRegistry`] owns the set of monitored targets. Every
//! reconciliation tick it asks the [`Supervisor`](ar_supervisor::Supervisor)
//! for the current targets, releases watchers of targets that vanished and
//! starts watchers for new targets that opted in. Every poll tick it asks
//! each watcher whether anything relevant changed and signals the active
//! targets that did.
//!
//! ```text
//!              reconcile (10s)                    poll (1s)
//!                   │                                 │
//!   list / options  ▼                                 ▼   has_changed
//! Supervisor ◄── WatcherRegistry ── BTreeMap<TargetName, DirectoryWatcher>
//!      ▲                                              │
//!      └──────────── status / kill ◄──────────────────┘
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod registry;
pub mod report;

pub use registry::WatcherRegistry;
pub use report::{PollReport, ReconcileReport, SkipReason};
