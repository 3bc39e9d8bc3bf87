//! Domain types for autorestart.
//!
//! - [`target`] - Supervised targets and their names
//! - [`status`] - Run state of a target as reported by the supervisor
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use ar_core::{Target, TargetName, TargetStatus};
//! ```

mod status;
mod target;

pub use status::TargetStatus;
pub use target::{Target, TargetName};
