//! Observation assembly.
//!
//! [`ObservationBuilder::build`] projects the world onto one agent's field
//! of view. It is a pure function of the world, the agent id, the tick, and
//! the configured limits: no clock, no randomness, no I/O. Lists are sorted
//! by distance with ties broken by entity id, then capped, so the same
//! inputs always serialize to the same bytes.
//!
//! References that point at missing entities (a contract naming a deleted
//! agent, a map entry whose key disagrees with its id) are logged and
//! skipped rather than failing the observation.

use holdfast_types::{
    AgentId, AgentState, ContractRole, ContractView, EventSummary, NearbyAgent, NearbyShelter,
    NearbySpawn, NearbyVendor, Observation, Position, SelfView, WorldState,
};

use crate::config::ObservationConfig;

/// Errors that prevent an observation from being built at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    /// The observer does not exist.
    #[error("agent {agent_id} not found")]
    UnknownAgent {
        /// Requested observer.
        agent_id: AgentId,
    },

    /// The observer is dead.
    #[error("agent {agent_id} is dead")]
    DeadAgent {
        /// Requested observer.
        agent_id: AgentId,
    },
}

/// Builds observations under fixed visibility limits.
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    config: ObservationConfig,
}

impl ObservationBuilder {
    /// A builder with the given limits.
    pub const fn new(config: ObservationConfig) -> Self {
        Self { config }
    }

    /// Limits in force.
    pub const fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Build `agent_id`'s observation of `world` for `tick`.
    pub fn build(
        &self,
        agent_id: AgentId,
        world: &WorldState,
        tick: u64,
    ) -> Result<Observation, ObservationError> {
        let me = world
            .agents
            .get(&agent_id)
            .ok_or(ObservationError::UnknownAgent { agent_id })?;
        if !me.is_alive() {
            return Err(ObservationError::DeadAgent { agent_id });
        }
        let origin = me.position;
        let radius = self.config.visibility_radius;
        let in_range = |position: Position| origin.distance(position) <= radius;

        let mut nearby_agents: Vec<NearbyAgent> = world
            .agents
            .iter()
            .filter(|(key, other)| consistent("agent", agent_id, **key, other.id))
            .map(|(_, other)| other)
            .filter(|other| other.id != agent_id && other.is_alive() && in_range(other.position))
            .map(|other| NearbyAgent {
                id: other.id,
                name: other.name.clone(),
                position: other.position,
                distance: origin.distance(other.position),
                status: other.status,
            })
            .collect();
        nearby_agents.sort_by_key(|a| (a.distance, a.id));
        nearby_agents.truncate(self.config.max_nearby_agents);

        let mut nearby_spawns: Vec<NearbySpawn> = world
            .spawns
            .iter()
            .filter(|(key, spawn)| consistent("spawn", agent_id, **key, spawn.id))
            .map(|(_, spawn)| spawn)
            .filter(|spawn| in_range(spawn.position))
            .map(|spawn| NearbySpawn {
                id: spawn.id,
                item: spawn.item,
                position: spawn.position,
                distance: origin.distance(spawn.position),
                quantity: spawn.quantity,
            })
            .collect();
        nearby_spawns.sort_by_key(|s| (s.distance, s.id));
        nearby_spawns.truncate(self.config.max_nearby_entities);

        let mut nearby_vendors: Vec<NearbyVendor> = world
            .vendors
            .iter()
            .filter(|(key, vendor)| consistent("vendor", agent_id, **key, vendor.id))
            .map(|(_, vendor)| vendor)
            .filter(|vendor| in_range(vendor.position))
            .map(|vendor| NearbyVendor {
                id: vendor.id,
                name: vendor.name.clone(),
                position: vendor.position,
                distance: origin.distance(vendor.position),
                prices: vendor.prices.clone(),
                stock: vendor.stock.clone(),
            })
            .collect();
        nearby_vendors.sort_by_key(|v| (v.distance, v.id));
        nearby_vendors.truncate(self.config.max_nearby_entities);

        let mut nearby_shelters: Vec<NearbyShelter> = world
            .shelters
            .iter()
            .filter(|(key, shelter)| consistent("shelter", agent_id, **key, shelter.id))
            .map(|(_, shelter)| shelter)
            .filter(|shelter| in_range(shelter.position))
            .map(|shelter| NearbyShelter {
                id: shelter.id,
                position: shelter.position,
                distance: origin.distance(shelter.position),
            })
            .collect();
        nearby_shelters.sort_by_key(|s| (s.distance, s.id));
        nearby_shelters.truncate(self.config.max_nearby_entities);

        Ok(Observation {
            tick,
            agent_id,
            grid: world.grid,
            self_state: self_view(me),
            nearby_agents,
            nearby_spawns,
            nearby_vendors,
            nearby_shelters,
            contracts: contracts(world, agent_id),
            recent_events: self.recent_events(world, me, tick),
            memories: me
                .memories
                .iter()
                .rev()
                .take(self.config.max_memories)
                .cloned()
                .collect(),
        })
    }

    /// Notes written within the recent window by the observer and by live
    /// agents in range, nearest first, newest first within one agent.
    fn recent_events(&self, world: &WorldState, me: &AgentState, tick: u64) -> Vec<EventSummary> {
        let since = tick.saturating_sub(self.config.recent_event_window);
        let radius = self.config.visibility_radius;
        let mut events: Vec<EventSummary> = world
            .agents
            .values()
            .filter(|other| {
                let near = me.position.distance(other.position) <= radius;
                other.id == me.id || (other.is_alive() && near)
            })
            .flat_map(|other| {
                let distance = me.position.distance(other.position);
                other
                    .memories
                    .iter()
                    .filter(move |note| note.tick >= since && note.tick <= tick)
                    .map(move |note| EventSummary {
                        tick: note.tick,
                        agent_id: other.id,
                        distance,
                        summary: note.summary.clone(),
                    })
            })
            .collect();
        events.sort_by(|a, b| {
            (a.distance, a.agent_id, core::cmp::Reverse(a.tick))
                .cmp(&(b.distance, b.agent_id, core::cmp::Reverse(b.tick)))
        });
        events.truncate(self.config.max_recent_events);
        events
    }
}

fn consistent<K: PartialEq + core::fmt::Display>(
    kind: &'static str,
    observer: AgentId,
    key: K,
    id: K,
) -> bool {
    if key == id {
        return true;
    }
    tracing::warn!(
        agent_id = %observer,
        kind,
        key = %key,
        id = %id,
        "skipping entity whose map key disagrees with its id"
    );
    false
}

fn self_view(agent: &AgentState) -> SelfView {
    SelfView {
        position: agent.position,
        hunger: agent.hunger,
        energy: agent.energy,
        health: agent.health,
        balance: agent.balance,
        inventory: agent.inventory.clone(),
        status: agent.status,
    }
}

/// Open contracts naming the observer, by id. Contracts whose counterpart
/// does not exist are skipped.
fn contracts(world: &WorldState, agent_id: AgentId) -> Vec<ContractView> {
    world
        .contracts
        .values()
        .filter(|contract| !contract.completed)
        .filter_map(|contract| {
            let (role, counterpart) = if contract.worker == agent_id {
                (ContractRole::Worker, contract.employer)
            } else if contract.employer == agent_id {
                (ContractRole::Employer, contract.worker)
            } else {
                return None;
            };
            if !world.agents.contains_key(&counterpart) {
                tracing::warn!(
                    agent_id = %agent_id,
                    contract_id = %contract.id,
                    counterpart = %counterpart,
                    "skipping contract with unknown counterpart"
                );
                return None;
            }
            Some(ContractView {
                id: contract.id,
                role,
                counterpart,
                wage: contract.wage,
                shifts_remaining: contract.shifts_total.saturating_sub(contract.shifts_completed),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use holdfast_types::{
        Contract, ContractId, GridSize, Item, MemoryNote, ResourceSpawn, Shelter, ShelterId,
        SpawnId, Vendor, VendorId,
    };
    use rust_decimal_macros::dec;

    use super::*;

    fn make_agent(id: u64, x: u32, y: u32) -> AgentState {
        AgentState::new(AgentId::new(id), format!("agent-{id}"), Position::new(x, y), dec!(50))
    }

    fn make_world() -> WorldState {
        let mut world = WorldState::empty(GridSize {
            width: 20,
            height: 20,
        });
        for agent in [
            make_agent(1, 5, 5),
            make_agent(2, 6, 5),
            make_agent(3, 4, 5),
            make_agent(4, 5, 7),
            make_agent(5, 15, 15),
        ] {
            world.agents.insert(agent.id, agent);
        }
        world
    }

    fn builder(radius: u32) -> ObservationBuilder {
        ObservationBuilder::new(ObservationConfig {
            visibility_radius: radius,
            ..ObservationConfig::default()
        })
    }

    #[test]
    fn includes_only_entities_within_radius() {
        let mut world = make_world();
        world.spawns.insert(
            SpawnId::new(1),
            ResourceSpawn {
                id: SpawnId::new(1),
                item: Item::Food,
                position: Position::new(5, 8),
                quantity: 3,
                max_quantity: 5,
                regen_per_tick: 1,
            },
        );
        world.spawns.insert(
            SpawnId::new(2),
            ResourceSpawn {
                id: SpawnId::new(2),
                item: Item::Wood,
                position: Position::new(0, 0),
                quantity: 3,
                max_quantity: 5,
                regen_per_tick: 1,
            },
        );

        let observation = builder(3).build(AgentId::new(1), &world, 7).unwrap();
        let ids: Vec<u64> = observation.nearby_agents.iter().map(|a| a.id.into_inner()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(observation.nearby_spawns.len(), 1);
        assert_eq!(observation.nearby_spawns.first().unwrap().distance, 3);
        assert_eq!(observation.tick, 7);
    }

    #[test]
    fn orders_by_distance_then_id_and_caps() {
        let world = make_world();
        let capped = ObservationBuilder::new(ObservationConfig {
            visibility_radius: 5,
            max_nearby_agents: 2,
            ..ObservationConfig::default()
        });
        let observation = capped.build(AgentId::new(1), &world, 1).unwrap();
        let ids: Vec<u64> = observation.nearby_agents.iter().map(|a| a.id.into_inner()).collect();
        // Agents 2 and 3 are both at distance 1; 4 at distance 2 is cut.
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn identical_inputs_serialize_identically() {
        let mut world = make_world();
        world.vendors.insert(
            VendorId::new(1),
            Vendor {
                id: VendorId::new(1),
                name: "Market".to_owned(),
                position: Position::new(5, 5),
                prices: BTreeMap::from([(Item::Food, dec!(5)), (Item::Wood, dec!(3))]),
                stock: BTreeMap::from([(Item::Food, 4)]),
                balance: dec!(0),
            },
        );
        let b = builder(5);
        let first = serde_json::to_vec(&b.build(AgentId::new(1), &world, 3).unwrap()).unwrap();
        let copy = world.clone();
        let second = serde_json::to_vec(&b.build(AgentId::new(1), &copy, 3).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dead_and_unknown_observers_are_errors() {
        let mut world = make_world();
        if let Some(agent) = world.agents.get_mut(&AgentId::new(2)) {
            agent.status = holdfast_types::ActivityStatus::Dead;
        }
        assert_eq!(
            builder(5).build(AgentId::new(2), &world, 1),
            Err(ObservationError::DeadAgent {
                agent_id: AgentId::new(2)
            })
        );
        assert!(matches!(
            builder(5).build(AgentId::new(99), &world, 1),
            Err(ObservationError::UnknownAgent { .. })
        ));

        let observation = builder(5).build(AgentId::new(1), &world, 1).unwrap();
        assert!(observation.nearby_agents.iter().all(|a| a.id != AgentId::new(2)));
    }

    #[test]
    fn dangling_references_are_skipped() {
        let mut world = make_world();
        world.contracts.insert(
            ContractId::new(1),
            Contract {
                id: ContractId::new(1),
                employer: AgentId::new(77),
                worker: AgentId::new(1),
                wage: dec!(10),
                shifts_total: 3,
                shifts_completed: 0,
                completed: false,
            },
        );
        world.contracts.insert(
            ContractId::new(2),
            Contract {
                id: ContractId::new(2),
                employer: AgentId::new(2),
                worker: AgentId::new(1),
                wage: dec!(10),
                shifts_total: 3,
                shifts_completed: 1,
                completed: false,
            },
        );
        world.shelters.insert(
            ShelterId::new(9),
            Shelter {
                id: ShelterId::new(8),
                position: Position::new(5, 5),
                capacity: 2,
            },
        );

        let observation = builder(5).build(AgentId::new(1), &world, 1).unwrap();
        assert_eq!(observation.contracts.len(), 1);
        let contract = observation.contracts.first().unwrap();
        assert_eq!(contract.counterpart, AgentId::new(2));
        assert_eq!(contract.role, ContractRole::Worker);
        assert_eq!(contract.shifts_remaining, 2);
        assert!(observation.nearby_shelters.is_empty());
    }

    #[test]
    fn recent_events_respect_window_and_order() {
        let mut world = make_world();
        let note = |tick: u64, summary: &str| MemoryNote {
            tick,
            summary: summary.to_owned(),
        };
        if let Some(me) = world.agents.get_mut(&AgentId::new(1)) {
            me.memories = vec![note(1, "old"), note(8, "ate food"), note(9, "slept")];
        }
        if let Some(other) = world.agents.get_mut(&AgentId::new(3)) {
            other.memories = vec![note(9, "gathered wood")];
        }
        if let Some(far) = world.agents.get_mut(&AgentId::new(5)) {
            far.memories = vec![note(9, "unseen")];
        }

        let observation = builder(5).build(AgentId::new(1), &world, 10).unwrap();
        let summaries: Vec<&str> = observation
            .recent_events
            .iter()
            .map(|e| e.summary.as_str())
            .collect();
        assert_eq!(summaries, vec!["slept", "ate food", "gathered wood"]);

        let memories: Vec<u64> = observation.memories.iter().map(|m| m.tick).collect();
        assert_eq!(memories, vec![9, 8, 1]);
    }
}
