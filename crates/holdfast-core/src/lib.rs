//! Tick scheduling and orchestration for the Holdfast simulation.
//!
//! This crate turns the pure building blocks of the other crates into a
//! running world: it renders observations, resolves decisions through the
//! cache and providers, runs the tick pipeline against the event store,
//! and exposes the operator controls.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with environment overrides and a
//!   hot-reloadable [`ConfigHandle`].
//! - [`observation`] -- Bounded per-agent views of the world.
//! - [`cache`] -- Fingerprint-keyed decision cache with single-flight
//!   resolution.
//! - [`decision`] -- [`DecisionOrchestrator`]: timeouts, retries, fallback,
//!   and bounded concurrent fan-out.
//! - [`tick`] -- The per-tick pipeline, [`run_tick`].
//! - [`operator`] -- Shared pause, resume, stop, and halt flags.
//! - [`scheduler`] -- [`TickScheduler`], the loop that owns the world.

pub mod cache;
pub mod config;
pub mod decision;
pub mod observation;
pub mod operator;
pub mod scheduler;
pub mod tick;

pub use cache::{CacheStats, CacheStatus, DecisionCache, Fingerprint, fingerprint};
pub use config::{ConfigError, ConfigHandle, MIN_TICK_INTERVAL_MS, SimulationConfig};
pub use decision::{DecisionOrchestrator, DecisionOutcome, DecisionPolicy};
pub use observation::{ObservationBuilder, ObservationError};
pub use operator::{OperatorState, SchedulerStatus, SimulationEndReason};
pub use scheduler::{SchedulerError, TickScheduler};
pub use tick::{Simulation, TickError, run_tick};
