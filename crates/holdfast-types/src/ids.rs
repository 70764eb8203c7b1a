//! Type-safe identifier wrappers.
//!
//! Entity identifiers are sequential `u64` values assigned by the world
//! generator. Ascending numeric order is the processing order used
//! whenever agents contend for the same resource, so identifiers must
//! never be derived from wall-clock time or randomness.
//!
//! The one exception is [`RunId`], a UUID v7 tagging a single process run
//! in logs and tick summaries. It never enters hashed event content.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
        )]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw numeric identifier.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner numeric value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent in the simulation.
    AgentId
}

define_id! {
    /// Unique identifier for a depletable resource spawn.
    SpawnId
}

define_id! {
    /// Unique identifier for a shelter.
    ShelterId
}

define_id! {
    /// Unique identifier for a vendor.
    VendorId
}

define_id! {
    /// Unique identifier for an employment contract.
    ContractId
}

define_id! {
    /// Identifier shared by the debit and credit rows of one ledger transaction.
    TransactionId
}

define_id! {
    /// Unique identifier for a single ledger row.
    LedgerEntryId
}

/// Identifier for one process run of the simulation.
///
/// Used to correlate logs and tick summaries; excluded from all hashed
/// content so that replays stay byte-identical across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new run identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![AgentId::new(10), AgentId::new(2), AgentId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![AgentId::new(2), AgentId::new(7), AgentId::new(10)]);
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&SpawnId::new(42)).unwrap_or_default();
        assert_eq!(json, "42");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
