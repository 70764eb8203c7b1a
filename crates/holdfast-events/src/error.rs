//! Error types for the event store and its persistence backends.

use holdfast_world::WorldError;

/// Errors raised by an [`EventLog`](crate::EventLog) or
/// [`SnapshotStore`](crate::SnapshotStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem I/O failed.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error.
        #[from]
        source: std::io::Error,
    },

    /// A record could not be encoded.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying error.
        #[from]
        source: serde_json::Error,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record at position {position}: {detail}")]
    Corrupt {
        /// Zero-based record position (event sequence or snapshot tick).
        position: u64,
        /// Decoder message.
        detail: String,
    },
}

/// Errors raised by the [`EventStore`](crate::EventStore).
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// The backend failed.
    #[error("persistence error: {source}")]
    Persistence {
        /// Underlying error.
        #[from]
        source: PersistenceError,
    },

    /// An event or snapshot could not be canonicalized.
    #[error("canonicalization failed: {source}")]
    Canonical {
        /// Underlying error.
        #[from]
        source: serde_json::Error,
    },

    /// The chain is broken; no further appends are accepted.
    #[error("event store halted: {reason}")]
    Halted {
        /// Why the store halted.
        reason: String,
    },

    /// Genesis was requested on a non-empty stream.
    #[error("stream already has {events} events")]
    AlreadyInitialized {
        /// Events already present.
        events: u64,
    },

    /// Replay needs a genesis event or a snapshot and found neither.
    #[error("no genesis event or snapshot to replay from")]
    NoBaseState,

    /// Replay range is empty or reversed.
    #[error("invalid replay range {from}..={to}")]
    InvalidRange {
        /// Requested start tick.
        from: u64,
        /// Requested end tick.
        to: u64,
    },

    /// An event's hash did not verify during replay.
    #[error("integrity failure at sequence {sequence}: {reason}")]
    Integrity {
        /// First event that failed.
        sequence: u64,
        /// What failed.
        reason: String,
    },

    /// Folding recorded changes failed.
    #[error("replay failed at sequence {sequence}: {source}")]
    Replay {
        /// Event whose changes failed to apply.
        sequence: u64,
        /// Underlying error.
        source: Box<WorldError>,
    },

    /// The sequence counter overflowed.
    #[error("event sequence space exhausted")]
    SequenceOverflow,

    /// The internal lock was poisoned by a panicking writer.
    #[error("event store lock poisoned")]
    Poisoned,
}

impl EventStoreError {
    /// Whether the error means the stream can no longer be trusted.
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Halted { .. } | Self::Integrity { .. })
    }
}
