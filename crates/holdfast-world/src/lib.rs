//! World state mutation, geography, and resource regeneration for the
//! Holdfast simulation core.
//!
//! # Modules
//!
//! - [`apply`] -- Atomic application of [`StateChange`] batches with rollback
//! - [`error`] -- [`WorldError`]
//! - [`geometry`] -- Grid neighbours and deterministic exploration targets
//! - [`resource`] -- Spawn regeneration as state changes
//!
//! [`StateChange`]: holdfast_types::StateChange

pub mod apply;
pub mod error;
pub mod geometry;
pub mod resource;

pub use apply::{apply_change, apply_changes};
pub use error::WorldError;
pub use geometry::{explore_target, neighbours};
pub use resource::{regeneration_amount, regeneration_changes};
