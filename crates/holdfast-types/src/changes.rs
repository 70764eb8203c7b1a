//! Atomic `(entity, field, old, new)` deltas.
//!
//! A [`StateChange`] is the only unit in which world state is ever
//! mutated. Replay folds recorded changes over a snapshot, so every field
//! an action or the needs model can touch has a [`Field`] variant here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActivityStatus, Item};
use crate::ids::{AgentId, ContractId, SpawnId, VendorId};
use crate::structs::{MemoryNote, Position};

/// The entity a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntityRef {
    /// World-level scalars.
    World,
    /// An agent.
    Agent(AgentId),
    /// A resource spawn.
    Spawn(SpawnId),
    /// A vendor.
    Vendor(VendorId),
    /// A contract.
    Contract(ContractId),
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::World => f.write_str("world"),
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::Spawn(id) => write!(f, "spawn:{id}"),
            Self::Vendor(id) => write!(f, "vendor:{id}"),
            Self::Contract(id) => write!(f, "contract:{id}"),
        }
    }
}

/// The field a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "field", content = "item", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Field {
    /// `World.tick`.
    Tick,
    /// `Agent.position`.
    Position,
    /// `Agent.hunger`.
    Hunger,
    /// `Agent.energy`.
    Energy,
    /// `Agent.health`.
    Health,
    /// `Agent.balance` or `Vendor.balance`.
    Balance,
    /// `Agent.inventory[item]`.
    Inventory(Item),
    /// `Vendor.stock[item]`.
    Stock(Item),
    /// `Agent.status`.
    Status,
    /// `Agent.memories`.
    Memories,
    /// `Spawn.quantity`.
    SpawnQuantity,
    /// `Contract.shifts_completed`.
    ShiftsCompleted,
    /// `Contract.completed`.
    Completed,
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FieldValue {
    /// Tick counter.
    Tick(u64),
    /// Gauge, quantity, or counter.
    Count(u32),
    /// Currency amount.
    Amount(#[ts(type = "string")] Decimal),
    /// Grid cell.
    Position(Position),
    /// Activity status.
    Status(ActivityStatus),
    /// Boolean flag.
    Flag(bool),
    /// Full memory list.
    Memories(Vec<MemoryNote>),
}

/// One atomic delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateChange {
    /// Target entity.
    pub entity: EntityRef,
    /// Target field.
    pub field: Field,
    /// Value before the change. Must match the live value when applied.
    pub old: FieldValue,
    /// Value after the change.
    pub new: FieldValue,
}

impl StateChange {
    /// Build a change.
    pub const fn new(entity: EntityRef, field: Field, old: FieldValue, new: FieldValue) -> Self {
        Self {
            entity,
            field,
            old,
            new,
        }
    }

    /// The same change with `old` and `new` swapped.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            entity: self.entity,
            field: self.field,
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inversion_swaps_values() {
        let change = StateChange::new(
            EntityRef::Agent(AgentId::new(1)),
            Field::Hunger,
            FieldValue::Count(40),
            FieldValue::Count(35),
        );
        let inverse = change.inverted();
        assert_eq!(inverse.old, FieldValue::Count(35));
        assert_eq!(inverse.new, FieldValue::Count(40));
        assert_eq!(inverse.inverted(), change);
    }

    #[test]
    fn wire_shape_is_tagged() {
        let change = StateChange::new(
            EntityRef::Spawn(SpawnId::new(9)),
            Field::Inventory(Item::Wood),
            FieldValue::Count(0),
            FieldValue::Count(1),
        );
        let json = serde_json::to_value(&change).unwrap_or_default();
        assert_eq!(json["entity"]["kind"], "spawn");
        assert_eq!(json["entity"]["id"], 9);
        assert_eq!(json["field"]["field"], "inventory");
        assert_eq!(json["field"]["item"], "wood");
        assert_eq!(json["new"]["type"], "count");
    }
}
