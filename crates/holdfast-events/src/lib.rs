//! Append-only, hash-chained event store for the Holdfast simulation.
//!
//! Every committed event carries the SHA-256 of its predecessor, so any
//! edit to stored history is detected on verification or replay. World
//! state for a past tick is rebuilt by folding recorded [`StateChange`]s
//! forward from the nearest snapshot.
//!
//! # Modules
//!
//! - [`chain`] -- Canonical encoding, sealing, and incremental verification
//! - [`error`] -- [`EventStoreError`] and [`PersistenceError`]
//! - [`persistence`] -- [`EventLog`] and [`SnapshotStore`] backends
//! - [`snapshot`] -- [`Snapshot`]
//! - [`store`] -- [`EventStore`]
//!
//! [`StateChange`]: holdfast_types::StateChange

pub mod chain;
pub mod error;
pub mod persistence;
pub mod snapshot;
pub mod store;

pub use chain::{BreakReason, ChainStatus, ChainVerifier, GENESIS_PREV_HASH, hash_json, sha256_hex};
pub use error::{EventStoreError, PersistenceError};
pub use persistence::{
    DirectorySnapshotStore, EventLog, JsonlEventLog, MemoryEventLog, MemorySnapshotStore,
    SnapshotStore,
};
pub use snapshot::Snapshot;
pub use store::EventStore;
