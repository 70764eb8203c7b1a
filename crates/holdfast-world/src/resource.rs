//! Resource spawn regeneration.
//!
//! Each [`ResourceSpawn`] regains `regen_per_tick` units per tick, capped
//! at `max_quantity`. Regeneration is expressed as state changes so that it
//! replays like any other mutation.

use holdfast_types::{EntityRef, Field, FieldValue, ResourceSpawn, StateChange, WorldState};

use crate::error::WorldError;

/// Units a spawn would regain this tick.
///
/// # Errors
///
/// Returns [`WorldError::ArithmeticOverflow`] if checked arithmetic fails.
pub fn regeneration_amount(spawn: &ResourceSpawn) -> Result<u32, WorldError> {
    if spawn.quantity >= spawn.max_quantity {
        return Ok(0);
    }
    let headroom = spawn
        .max_quantity
        .checked_sub(spawn.quantity)
        .ok_or_else(|| WorldError::ArithmeticOverflow {
            context: format!("headroom of spawn {}", spawn.id),
        })?;
    Ok(spawn.regen_per_tick.min(headroom))
}

/// Regeneration changes for every spawn below its maximum, by ascending id.
///
/// # Errors
///
/// Returns [`WorldError::ArithmeticOverflow`] if checked arithmetic fails.
pub fn regeneration_changes(world: &WorldState) -> Result<Vec<StateChange>, WorldError> {
    let mut changes = Vec::new();
    for spawn in world.spawns.values() {
        let added = regeneration_amount(spawn)?;
        if added == 0 {
            continue;
        }
        let new = spawn
            .quantity
            .checked_add(added)
            .ok_or_else(|| WorldError::ArithmeticOverflow {
                context: format!("regenerating spawn {}", spawn.id),
            })?;
        changes.push(StateChange::new(
            EntityRef::Spawn(spawn.id),
            Field::SpawnQuantity,
            FieldValue::Count(spawn.quantity),
            FieldValue::Count(new),
        ));
    }
    Ok(changes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use holdfast_types::{GridSize, Item, Position, SpawnId};

    use super::*;
    use crate::apply::apply_changes;

    fn make_spawn(id: u64, quantity: u32, regen: u32, max: u32) -> ResourceSpawn {
        ResourceSpawn {
            id: SpawnId::new(id),
            item: Item::Wood,
            position: Position::new(0, 0),
            quantity,
            max_quantity: max,
            regen_per_tick: regen,
        }
    }

    #[test]
    fn regen_normal() {
        assert_eq!(regeneration_amount(&make_spawn(1, 4, 2, 10)).unwrap(), 2);
    }

    #[test]
    fn regen_capped_at_max() {
        assert_eq!(regeneration_amount(&make_spawn(1, 9, 3, 10)).unwrap(), 1);
    }

    #[test]
    fn regen_already_full() {
        assert_eq!(regeneration_amount(&make_spawn(1, 10, 3, 10)).unwrap(), 0);
    }

    #[test]
    fn changes_skip_full_spawns_and_apply_cleanly() {
        let mut world = WorldState::empty(GridSize {
            width: 4,
            height: 4,
        });
        for spawn in [make_spawn(2, 0, 1, 3), make_spawn(1, 5, 1, 5)] {
            world.spawns.insert(spawn.id, spawn);
        }
        let changes = regeneration_changes(&world).unwrap();
        assert_eq!(changes.len(), 1);
        apply_changes(&mut world, &changes).unwrap();
        assert_eq!(world.spawns[&SpawnId::new(2)].quantity, 1);
    }
}
