//! Action application and needs decay for the Holdfast simulation core.
//!
//! Everything here is deterministic and synchronous: given the same world
//! and the same decisions, the same changes come out. Nothing in this
//! crate talks to a decision provider.
//!
//! # Modules
//!
//! - [`actions`] -- Precondition checks, change computation, and commit.
//! - [`needs`] -- Hunger, energy, and health decay with death detection.
//! - [`config`] -- Needs decay parameters and item effects.
//! - [`error`] -- Faults that stop a tick.

pub mod actions;
pub mod config;
pub mod error;
pub mod needs;

pub use actions::{ActionPlan, AppliedAction, apply, commit};
pub use config::NeedsConfig;
pub use error::ActionError;
pub use needs::{DeathCause, NeedsOutcome, decay};
