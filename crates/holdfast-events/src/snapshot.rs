//! Point-in-time copies of the world used to bound replay cost.

use holdfast_types::WorldState;
use serde::{Deserialize, Serialize};

use crate::chain::hash_json;

/// World state as of the end of a tick, tied to a position in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick the world was captured at.
    pub tick: u64,
    /// Sequence of the last event folded into `world`.
    pub sequence: u64,
    /// Hash of that event; replay resumes chain verification from it.
    pub event_hash: String,
    /// The captured world.
    pub world: WorldState,
    /// Hex SHA-256 of `world`'s JSON encoding.
    pub world_hash: String,
}

impl Snapshot {
    /// Capture `world` after the event at `sequence`.
    pub fn capture(
        world: &WorldState,
        sequence: u64,
        event_hash: String,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            tick: world.tick,
            sequence,
            event_hash,
            world: world.clone(),
            world_hash: hash_json(world)?,
        })
    }

    /// Whether `world_hash` still matches `world`.
    pub fn is_consistent(&self) -> bool {
        hash_json(&self.world).is_ok_and(|hash| hash == self.world_hash)
    }
}
