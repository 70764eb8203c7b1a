//! Seeded world generation.
//!
//! The same `world.seed` and config always produce the same genesis world,
//! so two engines started with the same configuration and the same
//! provider responses produce identical event logs.

use std::collections::BTreeSet;

use holdfast_core::config::{EconomyConfig, WorldConfig};
use holdfast_types::{
    AgentId, AgentState, Contract, ContractId, GridSize, Item, Position, ResourceSpawn, Shelter,
    ShelterId, SpawnId, Vendor, VendorId, WorldState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::EngineError;

/// Items a spawn can yield, assigned round-robin.
const SPAWN_ITEMS: [Item; 3] = [Item::Food, Item::Wood, Item::Stone];

/// Largest stock a generated spawn can hold.
const SPAWN_MAX_QUANTITY: u32 = 8;

/// Agent names, drawn without replacement.
const NAME_POOL: &[&str] = &[
    "Alder", "Birch", "Cedar", "Dusk", "Ember", "Fern", "Grove", "Haze", "Iris", "Juniper",
    "Kestrel", "Lark", "Moss", "Nettle", "Oak", "Pine", "Quill", "Reed", "Sage", "Thorn",
    "Umber", "Vale", "Wren", "Yarrow", "Zephyr", "Ash", "Brook", "Clay", "Dawn", "Elm",
];

/// Build the genesis world described by `world` and `economy`.
///
/// # Errors
///
/// Returns [`EngineError::Generation`] if the grid is empty or contracts
/// are requested with fewer than two agents.
pub fn generate(world: &WorldConfig, economy: &EconomyConfig) -> Result<WorldState, EngineError> {
    let grid = GridSize {
        width: world.width,
        height: world.height,
    };
    if grid.width == 0 || grid.height == 0 {
        return Err(EngineError::Generation {
            message: String::from("grid must have at least one cell"),
        });
    }
    if world.contracts > 0 && world.agents < 2 {
        return Err(EngineError::Generation {
            message: format!("{} contracts need at least two agents", world.contracts),
        });
    }

    let mut rng = StdRng::seed_from_u64(world.seed);
    let mut state = WorldState::empty(grid);

    let mut names = NamePicker::default();
    for raw in 1..=u64::from(world.agents) {
        let id = AgentId::new(raw);
        let position = random_position(&mut rng, grid);
        let agent = AgentState::new(id, names.pick(&mut rng), position, world.starting_balance);
        state.agents.insert(id, agent);
    }

    for (raw, item) in (1..=u64::from(world.spawns)).zip(SPAWN_ITEMS.iter().cycle()) {
        let spawn = ResourceSpawn {
            id: SpawnId::new(raw),
            item: *item,
            position: random_position(&mut rng, grid),
            quantity: rng.random_range(1..=SPAWN_MAX_QUANTITY),
            max_quantity: SPAWN_MAX_QUANTITY,
            regen_per_tick: rng.random_range(1..=2),
        };
        state.spawns.insert(spawn.id, spawn);
    }

    for raw in 1..=u64::from(world.vendors) {
        let vendor = Vendor {
            id: VendorId::new(raw),
            name: format!("Market {raw}"),
            position: random_position(&mut rng, grid),
            prices: [
                (Item::Food, economy.food_price),
                (Item::Wood, economy.wood_price),
                (Item::Stone, economy.stone_price),
            ]
            .into_iter()
            .collect(),
            stock: SPAWN_ITEMS
                .iter()
                .map(|item| (*item, economy.vendor_stock))
                .collect(),
            balance: rust_decimal::Decimal::ZERO,
        };
        state.vendors.insert(vendor.id, vendor);
    }

    for raw in 1..=u64::from(world.shelters) {
        let shelter = Shelter {
            id: ShelterId::new(raw),
            position: random_position(&mut rng, grid),
            capacity: rng.random_range(2..=4),
        };
        state.shelters.insert(shelter.id, shelter);
    }

    let agent_count = u64::from(world.agents);
    for raw in 1..=u64::from(world.contracts) {
        let employer = rng.random_range(1..=agent_count);
        let offset = rng.random_range(1..agent_count);
        let worker = employer
            .checked_add(offset)
            .and_then(|sum| sum.checked_sub(1))
            .and_then(|zero_based| zero_based.checked_rem(agent_count))
            .and_then(|index| index.checked_add(1))
            .ok_or_else(|| EngineError::Generation {
                message: String::from("contract worker id overflow"),
            })?;
        let contract = Contract {
            id: ContractId::new(raw),
            employer: AgentId::new(employer),
            worker: AgentId::new(worker),
            wage: economy.wage,
            shifts_total: economy.contract_shifts,
            shifts_completed: 0,
            completed: false,
        };
        state.contracts.insert(contract.id, contract);
    }

    info!(
        seed = world.seed,
        width = grid.width,
        height = grid.height,
        agents = state.agents.len(),
        spawns = state.spawns.len(),
        vendors = state.vendors.len(),
        shelters = state.shelters.len(),
        contracts = state.contracts.len(),
        "World generated"
    );
    Ok(state)
}

fn random_position(rng: &mut impl Rng, grid: GridSize) -> Position {
    Position::new(rng.random_range(0..grid.width), rng.random_range(0..grid.height))
}

/// Hands out unique names, numbering them once the pool runs dry.
#[derive(Debug, Default)]
struct NamePicker {
    used: BTreeSet<&'static str>,
    round: u32,
}

impl NamePicker {
    fn pick(&mut self, rng: &mut impl Rng) -> String {
        let mut available: Vec<&'static str> = NAME_POOL
            .iter()
            .copied()
            .filter(|name| !self.used.contains(name))
            .collect();
        if available.is_empty() {
            self.used.clear();
            self.round = self.round.saturating_add(1);
            available = NAME_POOL.to_vec();
        }
        let index = rng.random_range(0..available.len());
        let name = available.get(index).copied().unwrap_or("Nameless");
        self.used.insert(name);
        if self.round == 0 {
            name.to_owned()
        } else {
            format!("{name}-{}", self.round)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn make_config(agents: u32, contracts: u32) -> WorldConfig {
        WorldConfig {
            width: 12,
            height: 9,
            seed: 7,
            agents,
            spawns: 6,
            vendors: 2,
            shelters: 2,
            contracts,
            starting_balance: dec!(40),
        }
    }

    #[test]
    fn same_seed_same_world() {
        let config = make_config(5, 2);
        let economy = EconomyConfig::default();
        let first = generate(&config, &economy).unwrap();
        let second = generate(&config, &economy).unwrap();
        assert_eq!(first, second);

        let reseeded = WorldConfig { seed: 8, ..config };
        assert_ne!(first, generate(&reseeded, &economy).unwrap());
    }

    #[test]
    fn entities_stay_on_the_grid() {
        let world = generate(&make_config(10, 0), &EconomyConfig::default()).unwrap();
        let inside = |p: Position| p.x < 12 && p.y < 9;
        assert!(world.agents.values().all(|a| inside(a.position)));
        assert!(world.spawns.values().all(|s| inside(s.position)));
        assert!(world.vendors.values().all(|v| inside(v.position)));
        assert!(world.shelters.values().all(|s| inside(s.position)));
        assert!(world.agents.values().all(|a| a.balance == dec!(40)));
    }

    #[test]
    fn names_stay_unique_past_the_pool() {
        let world = generate(&make_config(45, 0), &EconomyConfig::default()).unwrap();
        let names: BTreeSet<&String> = world.agents.values().map(|a| &a.name).collect();
        assert_eq!(names.len(), 45);
    }

    #[test]
    fn contracts_pair_distinct_agents() {
        let world = generate(&make_config(3, 20), &EconomyConfig::default()).unwrap();
        assert_eq!(world.contracts.len(), 20);
        for contract in world.contracts.values() {
            assert_ne!(contract.employer, contract.worker);
            assert!(world.agents.contains_key(&contract.worker));
        }
    }

    #[test]
    fn contracts_without_a_second_agent_are_rejected() {
        let result = generate(&make_config(1, 1), &EconomyConfig::default());
        assert!(matches!(result, Err(EngineError::Generation { .. })));
    }
}
