//! Per-agent, per-tick perceptual snapshot.
//!
//! An [`Observation`] is built fresh every tick and never mutated. Two
//! observations built from the same world, agent, and tick serialize to
//! identical bytes, which is what lets the decision cache key on them.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActivityStatus, Item};
use crate::ids::{AgentId, ContractId, ShelterId, SpawnId, VendorId};
use crate::structs::{GridSize, MemoryNote, Position};

/// The observing agent's own state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SelfView {
    /// Current cell.
    pub position: Position,
    /// Satiety gauge.
    pub hunger: u32,
    /// Energy gauge.
    pub energy: u32,
    /// Health gauge.
    pub health: u32,
    /// Currency balance.
    #[ts(as = "String")]
    pub balance: Decimal,
    /// Held items.
    pub inventory: BTreeMap<Item, u32>,
    /// Most recent activity.
    pub status: ActivityStatus,
}

impl SelfView {
    /// Quantity of `item` held.
    pub fn holding(&self, item: Item) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }
}

/// Another agent within the visibility radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NearbyAgent {
    /// Identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Cell.
    pub position: Position,
    /// Manhattan distance from the observer.
    pub distance: u32,
    /// Most recent activity.
    pub status: ActivityStatus,
}

/// A resource spawn within the visibility radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NearbySpawn {
    /// Identifier.
    pub id: SpawnId,
    /// Item yielded.
    pub item: Item,
    /// Cell.
    pub position: Position,
    /// Manhattan distance from the observer.
    pub distance: u32,
    /// Units available.
    pub quantity: u32,
}

/// A vendor within the visibility radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NearbyVendor {
    /// Identifier.
    pub id: VendorId,
    /// Display name.
    pub name: String,
    /// Cell.
    pub position: Position,
    /// Manhattan distance from the observer.
    pub distance: u32,
    /// Unit prices.
    #[ts(type = "Record<Item, string>")]
    pub prices: BTreeMap<Item, Decimal>,
    /// Units in stock.
    pub stock: BTreeMap<Item, u32>,
}

impl NearbyVendor {
    /// Whether the vendor sells at least `quantity` of `item`, and its unit price.
    pub fn offer(&self, item: Item, quantity: u32) -> Option<Decimal> {
        let in_stock = self.stock.get(&item).copied().unwrap_or(0);
        if in_stock < quantity {
            return None;
        }
        self.prices.get(&item).copied()
    }
}

/// A shelter within the visibility radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NearbyShelter {
    /// Identifier.
    pub id: ShelterId,
    /// Cell.
    pub position: Position,
    /// Manhattan distance from the observer.
    pub distance: u32,
}

/// Which side of a contract the observer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ContractRole {
    /// The observer pays.
    Employer,
    /// The observer works.
    Worker,
}

/// An open contract involving the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ContractView {
    /// Identifier.
    pub id: ContractId,
    /// Observer's side.
    pub role: ContractRole,
    /// The other party.
    pub counterpart: AgentId,
    /// Wage per shift.
    #[ts(as = "String")]
    pub wage: Decimal,
    /// Shifts left before completion.
    pub shifts_remaining: u32,
}

/// Something an agent within sight did recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventSummary {
    /// Tick it happened.
    pub tick: u64,
    /// Who did it.
    pub agent_id: AgentId,
    /// Manhattan distance from the observer.
    pub distance: u32,
    /// What happened.
    pub summary: String,
}

/// Everything one agent perceives in one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Observation {
    /// Tick being decided.
    pub tick: u64,
    /// Observer.
    pub agent_id: AgentId,
    /// Grid dimensions.
    pub grid: GridSize,
    /// Observer's own state.
    pub self_state: SelfView,
    /// Other live agents in range, nearest first.
    pub nearby_agents: Vec<NearbyAgent>,
    /// Spawns in range, nearest first.
    pub nearby_spawns: Vec<NearbySpawn>,
    /// Vendors in range, nearest first.
    pub nearby_vendors: Vec<NearbyVendor>,
    /// Shelters in range, nearest first.
    pub nearby_shelters: Vec<NearbyShelter>,
    /// Open contracts involving the observer, by id.
    pub contracts: Vec<ContractView>,
    /// Recent activity of the observer and agents in range, nearest first.
    pub recent_events: Vec<EventSummary>,
    /// The observer's own notes, newest first.
    pub memories: Vec<MemoryNote>,
}

/// The parts of an [`Observation`] that influence which action is chosen.
///
/// Excludes the observer id, the tick, and narrative history, so that two
/// agents in physically identical situations share a cache fingerprint.
#[derive(Debug, Serialize)]
pub struct DecisionView<'a> {
    /// Grid dimensions.
    pub grid: &'a GridSize,
    /// Observer's own state.
    pub self_state: &'a SelfView,
    /// Other agents in range.
    pub nearby_agents: &'a [NearbyAgent],
    /// Spawns in range.
    pub nearby_spawns: &'a [NearbySpawn],
    /// Vendors in range.
    pub nearby_vendors: &'a [NearbyVendor],
    /// Shelters in range.
    pub nearby_shelters: &'a [NearbyShelter],
    /// Open contracts.
    pub contracts: &'a [ContractView],
}

impl Observation {
    /// Borrow the decision-relevant fields.
    pub fn decision_view(&self) -> DecisionView<'_> {
        DecisionView {
            grid: &self.grid,
            self_state: &self.self_state,
            nearby_agents: &self.nearby_agents,
            nearby_spawns: &self.nearby_spawns,
            nearby_vendors: &self.nearby_vendors,
            nearby_shelters: &self.nearby_shelters,
            contracts: &self.contracts,
        }
    }

    /// Render the observation as the text handed to a reasoning provider.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Vendors on the observer's own cell.
    pub fn vendors_here(&self) -> impl Iterator<Item = &NearbyVendor> {
        self.nearby_vendors.iter().filter(|v| v.distance == 0)
    }

    /// Spawns on the observer's own cell.
    pub fn spawns_here(&self) -> impl Iterator<Item = &NearbySpawn> {
        self.nearby_spawns.iter().filter(|s| s.distance == 0)
    }
}
