//! Core types, configuration, and errors for autorestart.
//!
//! This crate provides the foundational types shared by every crate in the
//! workspace:
//!
//! - [`Config`] and its sections ([`WatchConfig`], [`ScheduleConfig`],
//!   [`SupervisorConfig`])
//! - [`ConfigError`] for configuration loading and validation
//! - Domain types ([`TargetName`], [`Target`], [`TargetStatus`])
//! - Type aliases for `FxHashMap`/`FxHashSet`

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{
    Config, DEFAULT_EXCLUDES_FILE, DEFAULT_INCLUDES_FILE, ScheduleConfig, SupervisorConfig,
    WatchConfig,
};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet};
pub use types::{Target, TargetName, TargetStatus};
