//! World entities and the authoritative [`WorldState`] snapshot.
//!
//! These are plain data. All mutation goes through
//! [`StateChange`](crate::changes::StateChange) batches applied by the
//! `holdfast-world` crate, so the structs here expose read helpers only.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActivityStatus, Item};
use crate::ids::{AgentId, ContractId, ShelterId, SpawnId, VendorId};

/// Upper bound of every need gauge.
pub const GAUGE_MAX: u32 = 100;

/// Number of memory notes retained per agent.
pub const MEMORY_CAPACITY: usize = 10;

/// Largest item quantity accepted in a single consume, buy, or trade.
pub const MAX_QUANTITY: u32 = 100;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A cell on the world grid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Column, `0..width`.
    pub x: u32,
    /// Row, `0..height`.
    pub y: u32,
}

impl Position {
    /// Construct a position.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to `other`.
    pub const fn distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    /// Whether `other` is exactly one orthogonal step away.
    pub const fn is_adjacent(self, other: Self) -> bool {
        self.distance(other) == 1
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Grid dimensions. Fixed for the life of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GridSize {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl GridSize {
    /// Whether `position` lies on the grid.
    pub const fn contains(self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A short note an agent keeps about something that happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MemoryNote {
    /// Tick the note was written.
    pub tick: u64,
    /// Human-readable summary.
    pub summary: String,
}

/// Mutable state of one agent.
///
/// Gauges are satiety-style: 100 is best, 0 is worst. An agent with
/// `hunger` below the configured threshold is hungry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentState {
    /// Identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Current cell.
    pub position: Position,
    /// Satiety gauge, `0..=100`.
    pub hunger: u32,
    /// Energy gauge, `0..=100`.
    pub energy: u32,
    /// Health gauge, `0..=100`. Zero means dead.
    pub health: u32,
    /// Currency balance. Never negative.
    #[ts(as = "String")]
    pub balance: Decimal,
    /// Held items. Absent keys mean zero.
    pub inventory: BTreeMap<Item, u32>,
    /// Most recent activity.
    pub status: ActivityStatus,
    /// Recent notes, oldest first, at most [`MEMORY_CAPACITY`].
    pub memories: Vec<MemoryNote>,
}

impl AgentState {
    /// A fresh, idle agent with full gauges and an empty inventory.
    pub fn new(id: AgentId, name: impl Into<String>, position: Position, balance: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            hunger: GAUGE_MAX,
            energy: GAUGE_MAX,
            health: GAUGE_MAX,
            balance,
            inventory: BTreeMap::new(),
            status: ActivityStatus::Idle,
            memories: Vec::new(),
        }
    }

    /// Quantity of `item` held.
    pub fn holding(&self, item: Item) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }

    /// Whether the agent is still taking part in ticks.
    pub const fn is_alive(&self) -> bool {
        !self.status.is_dead()
    }
}

// ---------------------------------------------------------------------------
// Static-ish entities
// ---------------------------------------------------------------------------

/// A depletable, regenerating source of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceSpawn {
    /// Identifier.
    pub id: SpawnId,
    /// What the spawn yields.
    pub item: Item,
    /// Cell the spawn occupies.
    pub position: Position,
    /// Units currently available.
    pub quantity: u32,
    /// Regeneration ceiling.
    pub max_quantity: u32,
    /// Units restored per tick, up to `max_quantity`.
    pub regen_per_tick: u32,
}

/// A cell where sleeping restores extra energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Shelter {
    /// Identifier.
    pub id: ShelterId,
    /// Cell the shelter occupies.
    pub position: Position,
    /// Number of live agents on the cell that still receive the bonus.
    pub capacity: u32,
}

/// A trader that sells items for currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Vendor {
    /// Identifier.
    pub id: VendorId,
    /// Display name.
    pub name: String,
    /// Cell the vendor occupies.
    pub position: Position,
    /// Unit price per item the vendor sells.
    #[ts(type = "Record<Item, string>")]
    pub prices: BTreeMap<Item, Decimal>,
    /// Units in stock per item.
    pub stock: BTreeMap<Item, u32>,
    /// Currency collected from sales.
    #[ts(as = "String")]
    pub balance: Decimal,
}

impl Vendor {
    /// Units of `item` in stock.
    pub fn stock_of(&self, item: Item) -> u32 {
        self.stock.get(&item).copied().unwrap_or(0)
    }
}

/// An employment agreement between two agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Contract {
    /// Identifier.
    pub id: ContractId,
    /// Agent paying wages.
    pub employer: AgentId,
    /// Agent receiving wages.
    pub worker: AgentId,
    /// Paid once per completed shift.
    #[ts(as = "String")]
    pub wage: Decimal,
    /// Shifts required to complete the contract.
    pub shifts_total: u32,
    /// Shifts worked so far.
    pub shifts_completed: u32,
    /// Set once `shifts_completed == shifts_total`.
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

/// The authoritative snapshot of the simulated world.
///
/// Owned exclusively by the tick pipeline. Every collection is a
/// `BTreeMap`, so serialising the same state always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldState {
    /// Last completed (or in-progress) tick. Zero before the first tick.
    pub tick: u64,
    /// Grid dimensions.
    pub grid: GridSize,
    /// All agents ever created, dead ones included.
    pub agents: BTreeMap<AgentId, AgentState>,
    /// Resource spawns.
    pub spawns: BTreeMap<SpawnId, ResourceSpawn>,
    /// Shelters.
    pub shelters: BTreeMap<ShelterId, Shelter>,
    /// Vendors.
    pub vendors: BTreeMap<VendorId, Vendor>,
    /// Contracts.
    pub contracts: BTreeMap<ContractId, Contract>,
}

impl WorldState {
    /// An empty world with the given grid.
    pub const fn empty(grid: GridSize) -> Self {
        Self {
            tick: 0,
            grid,
            agents: BTreeMap::new(),
            spawns: BTreeMap::new(),
            shelters: BTreeMap::new(),
            vendors: BTreeMap::new(),
            contracts: BTreeMap::new(),
        }
    }

    /// Ids of agents that are not dead, ascending.
    pub fn live_agent_ids(&self) -> Vec<AgentId> {
        self.agents
            .values()
            .filter(|agent| agent.is_alive())
            .map(|agent| agent.id)
            .collect()
    }

    /// Sum of every agent and vendor balance.
    ///
    /// Returns `None` on overflow.
    pub fn total_currency(&self) -> Option<Decimal> {
        let agents = self.agents.values().map(|a| a.balance);
        let vendors = self.vendors.values().map(|v| v.balance);
        agents
            .chain(vendors)
            .try_fold(Decimal::ZERO, Decimal::checked_add)
    }

    /// Live agents standing on `position`.
    pub fn live_agents_at(&self, position: Position) -> usize {
        self.agents
            .values()
            .filter(|a| a.is_alive() && a.position == position)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn make_agent(id: u64, position: Position) -> AgentState {
        AgentState {
            id: AgentId::new(id),
            name: format!("agent-{id}"),
            position,
            hunger: 80,
            energy: 80,
            health: 100,
            balance: dec!(10),
            inventory: BTreeMap::new(),
            status: ActivityStatus::Idle,
            memories: Vec::new(),
        }
    }

    #[test]
    fn manhattan_distance_and_adjacency() {
        let a = Position::new(2, 3);
        assert_eq!(a.distance(Position::new(5, 1)), 5);
        assert!(a.is_adjacent(Position::new(2, 4)));
        assert!(!a.is_adjacent(Position::new(3, 4)));
        assert!(!a.is_adjacent(a));
    }

    #[test]
    fn grid_bounds() {
        let grid = GridSize { width: 4, height: 2 };
        assert!(grid.contains(Position::new(3, 1)));
        assert!(!grid.contains(Position::new(4, 0)));
        assert!(!grid.contains(Position::new(0, 2)));
    }

    #[test]
    fn live_agents_skip_the_dead() {
        let mut world = WorldState::empty(GridSize { width: 8, height: 8 });
        let mut dead = make_agent(1, Position::new(0, 0));
        dead.status = ActivityStatus::Dead;
        world.agents.insert(dead.id, dead);
        let alive = make_agent(2, Position::new(0, 0));
        world.agents.insert(alive.id, alive);

        assert_eq!(world.live_agent_ids(), vec![AgentId::new(2)]);
        assert_eq!(world.live_agents_at(Position::new(0, 0)), 1);
        assert_eq!(world.total_currency().unwrap(), dec!(20));
    }

    #[test]
    fn serialization_is_stable() {
        let mut world = WorldState::empty(GridSize { width: 8, height: 8 });
        for id in [3, 1, 2] {
            let agent = make_agent(id, Position::new(1, 1));
            world.agents.insert(agent.id, agent);
        }
        let first = serde_json::to_vec(&world).unwrap();
        let second = serde_json::to_vec(&world.clone()).unwrap();
        assert_eq!(first, second);
    }
}
