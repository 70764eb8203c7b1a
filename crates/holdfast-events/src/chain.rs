//! Canonical encoding and SHA-256 chaining.
//!
//! An event's hash is `sha256(prev_hash || canonical)`, hex-encoded, where
//! `canonical` is the `serde_json` encoding of its sequence, tick, actor,
//! category, payload, changes, and `prev_hash`. All maps in the data model
//! are `BTreeMap`s and `serde_json::Map` is sorted, so the encoding is
//! byte-stable.

use holdfast_types::{Actor, Event, EventCategory, EventDraft, StateChange};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// `prev_hash` of the genesis event.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Serialize)]
struct Canonical<'a> {
    sequence: u64,
    tick: u64,
    actor: &'a Actor,
    category: &'a EventCategory,
    payload: &'a serde_json::Value,
    changes: &'a [StateChange],
    prev_hash: &'a str,
}

impl<'a> Canonical<'a> {
    fn of(event: &'a Event) -> Self {
        Self {
            sequence: event.sequence,
            tick: event.tick,
            actor: &event.actor,
            category: &event.category,
            payload: &event.payload,
            changes: &event.changes,
            prev_hash: &event.prev_hash,
        }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of the JSON encoding of `value`.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}

fn chain_hash(canonical: &Canonical<'_>) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.prev_hash.as_bytes());
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Assign `sequence` and `prev_hash` to `draft` and compute its hash.
pub fn seal(draft: EventDraft, sequence: u64, prev_hash: &str) -> Result<Event, serde_json::Error> {
    let mut event = Event {
        sequence,
        tick: draft.tick,
        actor: draft.actor,
        category: draft.category,
        payload: draft.payload,
        changes: draft.changes,
        prev_hash: prev_hash.to_owned(),
        hash: String::new(),
    };
    event.hash = chain_hash(&Canonical::of(&event))?;
    Ok(event)
}

/// Recompute the hash `event` should carry.
pub fn recompute(event: &Event) -> Result<String, serde_json::Error> {
    chain_hash(&Canonical::of(event))
}

/// Why a link in the chain failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakReason {
    /// Sequence numbers are not contiguous.
    SequenceGap {
        /// Sequence the fold expected.
        expected: u64,
        /// Sequence found.
        found: u64,
    },
    /// `prev_hash` does not match the preceding event's hash.
    PrevHashMismatch {
        /// Hash of the preceding event.
        expected: String,
        /// Value recorded on this event.
        found: String,
    },
    /// The recorded hash does not match the recomputed one.
    HashMismatch {
        /// Recomputed hash.
        expected: String,
        /// Value recorded on this event.
        found: String,
    },
    /// The stored record could not be decoded or re-encoded.
    Unreadable {
        /// Decoder message.
        detail: String,
    },
}

impl core::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SequenceGap { expected, found } => {
                write!(f, "expected sequence {expected}, found {found}")
            }
            Self::PrevHashMismatch { expected, found } => {
                write!(f, "prev_hash {found} does not match preceding hash {expected}")
            }
            Self::HashMismatch { expected, found } => {
                write!(f, "recorded hash {found} does not match recomputed {expected}")
            }
            Self::Unreadable { detail } => write!(f, "unreadable record: {detail}"),
        }
    }
}

/// Result of verifying a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    /// Every link verified.
    Intact {
        /// Number of events checked.
        events: u64,
    },
    /// The first link that failed.
    Broken {
        /// Sequence of the first bad event.
        sequence: u64,
        /// What failed.
        reason: BreakReason,
    },
}

impl ChainStatus {
    /// Whether every link verified.
    pub const fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Incremental chain verifier.
///
/// Feed events in order. The first failure is returned and the verifier
/// should not be fed further.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    next_sequence: u64,
    prev_hash: String,
}

impl ChainVerifier {
    /// A verifier starting at genesis.
    pub fn from_genesis() -> Self {
        Self::resume(0, GENESIS_PREV_HASH.to_owned())
    }

    /// A verifier resuming after a known-good event.
    pub const fn resume(next_sequence: u64, prev_hash: String) -> Self {
        Self {
            next_sequence,
            prev_hash,
        }
    }

    /// Number of events verified so far, counting from the start point.
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Hash of the last verified event.
    pub fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    /// Check the next event in the stream.
    pub fn check(&mut self, event: &Event) -> Result<(), BreakReason> {
        if event.sequence != self.next_sequence {
            return Err(BreakReason::SequenceGap {
                expected: self.next_sequence,
                found: event.sequence,
            });
        }
        if event.prev_hash != self.prev_hash {
            return Err(BreakReason::PrevHashMismatch {
                expected: self.prev_hash.clone(),
                found: event.prev_hash.clone(),
            });
        }
        let expected = recompute(event).map_err(|e| BreakReason::Unreadable {
            detail: e.to_string(),
        })?;
        if expected != event.hash {
            return Err(BreakReason::HashMismatch {
                expected,
                found: event.hash.clone(),
            });
        }
        self.prev_hash.clone_from(&event.hash);
        self.next_sequence = self.next_sequence.saturating_add(1);
        Ok(())
    }
}
