//! Fast hash map and hash set type aliases.
//!
//! Watch handles and target names are small keys looked up on every poll
//! tick, so the workspace uses the Fx hash algorithm from `rustc-hash`
//! instead of the DoS-resistant std hasher.
//!
//! # Examples
//!
//! ```
//! use ar_core::{FxHashMap, FxHashSet};
//!
//! let mut handles: FxHashMap<u64, &str> = FxHashMap::default();
//! handles.insert(1, "/srv/app");
//!
//! let mut seen: FxHashSet<&str> = FxHashSet::default();
//! seen.insert("/srv/app");
//! assert!(seen.contains("/srv/app"));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;
