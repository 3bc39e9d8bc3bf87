//! Command channel to the process supervision system.
//!
//! The monitoring loop needs four things from the supervisor: the list of
//! targets, each target's working directory, each target's run state, and a
//! way to signal a target. The [`Supervisor`] trait captures exactly that.
//!
//! - [`CircusctlSupervisor`] drives a circus daemon through `circusctl`.
//! - [`MemorySupervisor`] keeps targets in memory for tests and embedding.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod circusctl;
pub mod client;
pub mod error;
pub mod memory;

pub use circusctl::CircusctlSupervisor;
pub use client::{Supervisor, TargetOptions};
pub use error::SupervisorError;
pub use memory::MemorySupervisor;
