//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A stackable item that can sit in an inventory, a spawn, or a vendor's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Item {
    /// Edible. Restores the hunger gauge when consumed.
    Food,
    /// Building material.
    Wood,
    /// Building material.
    Stone,
}

impl Item {
    /// All item variants in canonical order.
    pub const ALL: [Self; 3] = [Self::Food, Self::Wood, Self::Stone];

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Wood => "wood",
            Self::Stone => "stone",
        }
    }

    /// Case-insensitive lookup by wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|item| item.as_str() == lower)
    }
}

impl core::fmt::Display for Item {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Activity status
// ---------------------------------------------------------------------------

/// What an agent did most recently. `Dead` is terminal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActivityStatus {
    /// No action this tick.
    #[default]
    Idle,
    /// Moved one cell.
    Moving,
    /// Took from a resource spawn.
    Gathering,
    /// Consumed an item.
    Eating,
    /// Bought from a vendor or traded with another agent.
    Trading,
    /// Worked a contract shift.
    Working,
    /// Recovered energy.
    Sleeping,
    /// Wandered to a neighbouring cell.
    Exploring,
    /// Health reached zero. Excluded from all future ticks.
    Dead,
}

impl ActivityStatus {
    /// Whether the status is the terminal `Dead` state.
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

// ---------------------------------------------------------------------------
// Action types
// ---------------------------------------------------------------------------

/// Discriminant of an [`crate::actions::Action`], used for telemetry and parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionType {
    /// Step to an adjacent cell.
    Move,
    /// Take one unit from a spawn at the current cell.
    Gather,
    /// Eat or use items from the inventory.
    Consume,
    /// Purchase items from a vendor at the current cell.
    Buy,
    /// Swap items with a nearby agent.
    Trade,
    /// Recover energy.
    Sleep,
    /// Work one shift of a contract.
    Work,
    /// Step to a deterministic neighbouring cell.
    Explore,
    /// Do nothing.
    Idle,
}

impl ActionType {
    /// All action types in canonical order.
    pub const ALL: [Self; 9] = [
        Self::Move,
        Self::Gather,
        Self::Consume,
        Self::Buy,
        Self::Trade,
        Self::Sleep,
        Self::Work,
        Self::Explore,
        Self::Idle,
    ];

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Gather => "gather",
            Self::Consume => "consume",
            Self::Buy => "buy",
            Self::Trade => "trade",
            Self::Sleep => "sleep",
            Self::Work => "work",
            Self::Explore => "explore",
            Self::Idle => "idle",
        }
    }
}

impl core::fmt::Display for ActionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure reasons
// ---------------------------------------------------------------------------

/// Why an action failed its preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FailureReason {
    /// Target cell lies outside the grid.
    OutOfBounds,
    /// Target cell is not exactly one step away.
    NotAdjacent,
    /// Not enough energy for the action.
    InsufficientEnergy,
    /// The resource spawn has nothing left this tick.
    ResourceExhausted,
    /// The agent is not standing where the action requires.
    NotAtLocation,
    /// The agent (or trade partner) lacks the items.
    InsufficientInventory,
    /// The payer cannot cover the price.
    InsufficientFunds,
    /// The vendor does not stock enough of the item.
    OutOfStock,
    /// The referenced entity does not exist.
    InvalidTarget,
    /// The trade partner is dead or too far away.
    PartnerUnavailable,
    /// The contract is completed or does not name this agent as worker.
    ContractClosed,
    /// The acting agent is dead.
    AgentDead,
    /// A quantity was zero or overflowed.
    InvalidQuantity,
}

// ---------------------------------------------------------------------------
// Event categories
// ---------------------------------------------------------------------------

/// Category of an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventCategory {
    /// First event of a stream. Payload is the initial world state.
    Genesis,
    /// Beginning of a tick; carries the world tick counter change.
    TickStarted,
    /// An agent's action passed validation and was applied.
    ActionSucceeded,
    /// An agent's action failed validation. Carries no state changes.
    ActionFailed,
    /// Per-tick attrition of need gauges.
    NeedsDecayed,
    /// An agent's health reached zero.
    AgentDied,
    /// Resource spawns regenerated.
    ResourcesRegenerated,
    /// The tick pipeline failed; the simulation moved on.
    TickFailed,
    /// Currency conservation was violated.
    LedgerAnomaly,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Side of a double-entry ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntrySide {
    /// Funds leaving the account.
    Debit,
    /// Funds arriving in the account.
    Credit,
}

/// Why currency moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TransferKind {
    /// Agent paid a vendor.
    Purchase,
    /// Employer paid a worker for a shift.
    Wage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_parse_is_case_insensitive() {
        assert_eq!(Item::parse("Food"), Some(Item::Food));
        assert_eq!(Item::parse(" STONE "), Some(Item::Stone));
        assert_eq!(Item::parse("gold"), None);
    }

    #[test]
    fn snake_case_wire_names() {
        let json = serde_json::to_string(&FailureReason::ResourceExhausted).unwrap_or_default();
        assert_eq!(json, "\"resource_exhausted\"");
        let json = serde_json::to_string(&EventCategory::TickFailed).unwrap_or_default();
        assert_eq!(json, "\"tick_failed\"");
    }

    #[test]
    fn action_type_names_round_trip() {
        for action in ActionType::ALL {
            let json = serde_json::to_string(&action).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }
}
