//! Applying [`StateChange`] batches to a [`WorldState`].
//!
//! Every change names the value it expects to overwrite. A mismatch means
//! the change was computed against a different world than the one it is
//! being applied to, which for replay is a corrupted history. Batches are
//! all-or-nothing: if any change in a batch fails, the ones already
//! applied are reverted before the error is returned.

use std::collections::BTreeMap;

use holdfast_types::{
    ActivityStatus, AgentState, EntityRef, Field, FieldValue, GAUGE_MAX, GridSize, Item,
    MEMORY_CAPACITY, MemoryNote, Position, StateChange, WorldState,
};
use rust_decimal::Decimal;
use tracing::error;

use crate::error::WorldError;

/// Apply a batch of changes atomically.
///
/// # Errors
///
/// Returns the first failing change's error. The world is left exactly as
/// it was before the call.
pub fn apply_changes(world: &mut WorldState, changes: &[StateChange]) -> Result<(), WorldError> {
    for (index, change) in changes.iter().enumerate() {
        if let Err(err) = apply_change(world, change) {
            roll_back(world, changes.get(..index).unwrap_or(&[]));
            return Err(err);
        }
    }
    Ok(())
}

/// Revert already-applied changes, newest first.
fn roll_back(world: &mut WorldState, applied: &[StateChange]) {
    for change in applied.iter().rev() {
        if let Err(err) = apply_change(world, &change.inverted()) {
            error!(
                entity = %change.entity,
                field = ?change.field,
                error = %err,
                "rollback of applied change failed"
            );
        }
    }
}

/// Apply a single change.
///
/// # Errors
///
/// See [`WorldError`].
pub fn apply_change(world: &mut WorldState, change: &StateChange) -> Result<(), WorldError> {
    let entity = change.entity;
    match entity {
        EntityRef::World => match change.field {
            Field::Tick => {
                let (old, new) = ticks(change)?;
                if new < old {
                    return Err(invariant(change, "tick counter cannot move backwards"));
                }
                swap(&mut world.tick, old, new, change, FieldValue::Tick)
            }
            _ => Err(unsupported(change)),
        },
        EntityRef::Agent(id) => {
            let grid = world.grid;
            let agent = world
                .agents
                .get_mut(&id)
                .ok_or(WorldError::UnknownEntity { entity })?;
            apply_agent(agent, grid, change)
        }
        EntityRef::Spawn(id) => {
            let spawn = world
                .spawns
                .get_mut(&id)
                .ok_or(WorldError::UnknownEntity { entity })?;
            match change.field {
                Field::SpawnQuantity => {
                    let (old, new) = counts(change)?;
                    if new > spawn.max_quantity {
                        return Err(invariant(change, "spawn quantity above its maximum"));
                    }
                    swap(&mut spawn.quantity, old, new, change, FieldValue::Count)
                }
                _ => Err(unsupported(change)),
            }
        }
        EntityRef::Vendor(id) => {
            let vendor = world
                .vendors
                .get_mut(&id)
                .ok_or(WorldError::UnknownEntity { entity })?;
            match change.field {
                Field::Balance => {
                    let (old, new) = amounts(change)?;
                    swap(&mut vendor.balance, old, new, change, FieldValue::Amount)
                }
                Field::Stock(item) => set_quantity(&mut vendor.stock, item, change),
                _ => Err(unsupported(change)),
            }
        }
        EntityRef::Contract(id) => {
            let contract = world
                .contracts
                .get_mut(&id)
                .ok_or(WorldError::UnknownEntity { entity })?;
            match change.field {
                Field::ShiftsCompleted => {
                    let (old, new) = counts(change)?;
                    if new > contract.shifts_total {
                        return Err(invariant(change, "more shifts than the contract allows"));
                    }
                    swap(&mut contract.shifts_completed, old, new, change, FieldValue::Count)
                }
                Field::Completed => {
                    let (old, new) = flags(change)?;
                    swap(&mut contract.completed, old, new, change, FieldValue::Flag)
                }
                _ => Err(unsupported(change)),
            }
        }
    }
}

fn apply_agent(
    agent: &mut AgentState,
    grid: GridSize,
    change: &StateChange,
) -> Result<(), WorldError> {
    match change.field {
        Field::Position => {
            let (old, new) = positions(change)?;
            if !grid.contains(new) {
                return Err(invariant(change, "position outside the grid"));
            }
            swap(&mut agent.position, old, new, change, FieldValue::Position)
        }
        Field::Hunger => {
            let (old, new) = gauges(change)?;
            swap(&mut agent.hunger, old, new, change, FieldValue::Count)
        }
        Field::Energy => {
            let (old, new) = gauges(change)?;
            swap(&mut agent.energy, old, new, change, FieldValue::Count)
        }
        Field::Health => {
            let (old, new) = gauges(change)?;
            swap(&mut agent.health, old, new, change, FieldValue::Count)
        }
        Field::Balance => {
            let (old, new) = amounts(change)?;
            swap(&mut agent.balance, old, new, change, FieldValue::Amount)
        }
        Field::Inventory(item) => set_quantity(&mut agent.inventory, item, change),
        Field::Status => {
            let (old, new) = statuses(change)?;
            swap(&mut agent.status, old, new, change, FieldValue::Status)
        }
        Field::Memories => {
            let (old, new) = memories(change)?;
            if new.len() > MEMORY_CAPACITY {
                return Err(invariant(change, "memory list over capacity"));
            }
            swap(&mut agent.memories, old, new, change, FieldValue::Memories)
        }
        Field::Tick
        | Field::Stock(_)
        | Field::SpawnQuantity
        | Field::ShiftsCompleted
        | Field::Completed => Err(unsupported(change)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Overwrite `slot` with `new` if it currently holds `old`.
fn swap<T: PartialEq + Clone>(
    slot: &mut T,
    old: T,
    new: T,
    change: &StateChange,
    wrap: fn(T) -> FieldValue,
) -> Result<(), WorldError> {
    if *slot != old {
        return Err(WorldError::StaleValue {
            entity: change.entity,
            field: change.field,
            expected: change.old.clone(),
            actual: wrap(slot.clone()),
        });
    }
    *slot = new;
    Ok(())
}

/// Quantity maps never store zero entries, so equal worlds serialize equally.
fn set_quantity(
    map: &mut BTreeMap<Item, u32>,
    item: Item,
    change: &StateChange,
) -> Result<(), WorldError> {
    let (old, new) = counts(change)?;
    let current = map.get(&item).copied().unwrap_or(0);
    if current != old {
        return Err(WorldError::StaleValue {
            entity: change.entity,
            field: change.field,
            expected: change.old.clone(),
            actual: FieldValue::Count(current),
        });
    }
    if new == 0 {
        map.remove(&item);
    } else {
        map.insert(item, new);
    }
    Ok(())
}

fn unsupported(change: &StateChange) -> WorldError {
    WorldError::UnsupportedField {
        entity: change.entity,
        field: change.field,
    }
}

fn mismatch(change: &StateChange) -> WorldError {
    WorldError::TypeMismatch {
        entity: change.entity,
        field: change.field,
        value: change.new.clone(),
    }
}

fn invariant(change: &StateChange, detail: &str) -> WorldError {
    WorldError::InvariantViolation {
        entity: change.entity,
        field: change.field,
        detail: detail.to_owned(),
    }
}

fn ticks(change: &StateChange) -> Result<(u64, u64), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Tick(old), FieldValue::Tick(new)) => Ok((*old, *new)),
        _ => Err(mismatch(change)),
    }
}

fn counts(change: &StateChange) -> Result<(u32, u32), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Count(old), FieldValue::Count(new)) => Ok((*old, *new)),
        _ => Err(mismatch(change)),
    }
}

fn gauges(change: &StateChange) -> Result<(u32, u32), WorldError> {
    let (old, new) = counts(change)?;
    if new > GAUGE_MAX {
        return Err(invariant(change, "gauge above 100"));
    }
    Ok((old, new))
}

fn amounts(change: &StateChange) -> Result<(Decimal, Decimal), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Amount(old), FieldValue::Amount(new)) => {
            if new.is_sign_negative() && !new.is_zero() {
                return Err(invariant(change, "balance would go negative"));
            }
            Ok((*old, *new))
        }
        _ => Err(mismatch(change)),
    }
}

fn positions(change: &StateChange) -> Result<(Position, Position), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Position(old), FieldValue::Position(new)) => Ok((*old, *new)),
        _ => Err(mismatch(change)),
    }
}

fn statuses(change: &StateChange) -> Result<(ActivityStatus, ActivityStatus), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Status(old), FieldValue::Status(new)) => Ok((*old, *new)),
        _ => Err(mismatch(change)),
    }
}

fn flags(change: &StateChange) -> Result<(bool, bool), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Flag(old), FieldValue::Flag(new)) => Ok((*old, *new)),
        _ => Err(mismatch(change)),
    }
}

fn memories(change: &StateChange) -> Result<(Vec<MemoryNote>, Vec<MemoryNote>), WorldError> {
    match (&change.old, &change.new) {
        (FieldValue::Memories(old), FieldValue::Memories(new)) => Ok((old.clone(), new.clone())),
        _ => Err(mismatch(change)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use holdfast_types::{AgentId, ResourceSpawn, SpawnId};
    use rust_decimal_macros::dec;

    use super::*;

    fn make_world() -> WorldState {
        let mut world = WorldState::empty(GridSize {
            width: 10,
            height: 10,
        });
        world.agents.insert(
            AgentId::new(1),
            AgentState {
                id: AgentId::new(1),
                name: "Ada".to_owned(),
                position: Position::new(2, 2),
                hunger: 50,
                energy: 50,
                health: 100,
                balance: dec!(20),
                inventory: BTreeMap::new(),
                status: ActivityStatus::Idle,
                memories: Vec::new(),
            },
        );
        world.spawns.insert(
            SpawnId::new(1),
            ResourceSpawn {
                id: SpawnId::new(1),
                item: Item::Food,
                position: Position::new(2, 2),
                quantity: 3,
                max_quantity: 5,
                regen_per_tick: 1,
            },
        );
        world
    }

    fn agent_change(field: Field, old: FieldValue, new: FieldValue) -> StateChange {
        StateChange::new(EntityRef::Agent(AgentId::new(1)), field, old, new)
    }

    #[test]
    fn applies_matching_change() {
        let mut world = make_world();
        let change = agent_change(Field::Hunger, FieldValue::Count(50), FieldValue::Count(45));
        apply_change(&mut world, &change).unwrap();
        assert_eq!(world.agents[&AgentId::new(1)].hunger, 45);
    }

    #[test]
    fn rejects_stale_old_value() {
        let mut world = make_world();
        let change = agent_change(Field::Hunger, FieldValue::Count(49), FieldValue::Count(45));
        let err = apply_change(&mut world, &change).unwrap_err();
        assert!(matches!(err, WorldError::StaleValue { .. }));
        assert!(err.is_integrity());
    }

    #[test]
    fn rejects_negative_balance() {
        let mut world = make_world();
        let change = agent_change(
            Field::Balance,
            FieldValue::Amount(dec!(20)),
            FieldValue::Amount(dec!(-1)),
        );
        let err = apply_change(&mut world, &change).unwrap_err();
        assert!(matches!(err, WorldError::InvariantViolation { .. }));
        assert_eq!(world.agents[&AgentId::new(1)].balance, dec!(20));
    }

    #[test]
    fn zero_inventory_entries_are_removed() {
        let mut world = make_world();
        let add = agent_change(
            Field::Inventory(Item::Food),
            FieldValue::Count(0),
            FieldValue::Count(2),
        );
        apply_change(&mut world, &add).unwrap();
        assert_eq!(world.agents[&AgentId::new(1)].holding(Item::Food), 2);

        let remove = agent_change(
            Field::Inventory(Item::Food),
            FieldValue::Count(2),
            FieldValue::Count(0),
        );
        apply_change(&mut world, &remove).unwrap();
        assert!(world.agents[&AgentId::new(1)].inventory.is_empty());
    }

    #[test]
    fn failed_batch_leaves_world_untouched() {
        let mut world = make_world();
        let before = world.clone();
        let batch = vec![
            agent_change(Field::Energy, FieldValue::Count(50), FieldValue::Count(40)),
            StateChange::new(
                EntityRef::Spawn(SpawnId::new(1)),
                Field::SpawnQuantity,
                FieldValue::Count(3),
                FieldValue::Count(2),
            ),
            agent_change(Field::Health, FieldValue::Count(100), FieldValue::Count(101)),
        ];
        assert!(apply_changes(&mut world, &batch).is_err());
        assert_eq!(world, before);
    }

    #[test]
    fn unknown_entity_is_reported() {
        let mut world = make_world();
        let change = StateChange::new(
            EntityRef::Agent(AgentId::new(99)),
            Field::Energy,
            FieldValue::Count(1),
            FieldValue::Count(2),
        );
        let err = apply_change(&mut world, &change).unwrap_err();
        assert!(matches!(err, WorldError::UnknownEntity { .. }));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let mut world = make_world();
        let change = agent_change(Field::Position, FieldValue::Count(1), FieldValue::Count(2));
        let err = apply_change(&mut world, &change).unwrap_err();
        assert!(matches!(err, WorldError::TypeMismatch { .. }));
    }

    #[test]
    fn spawn_quantity_capped_at_max() {
        let mut world = make_world();
        let change = StateChange::new(
            EntityRef::Spawn(SpawnId::new(1)),
            Field::SpawnQuantity,
            FieldValue::Count(3),
            FieldValue::Count(6),
        );
        assert!(apply_change(&mut world, &change).is_err());
    }
}
