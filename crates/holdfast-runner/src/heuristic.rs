//! Deterministic survival heuristic.
//!
//! Used two ways: as the fallback whenever a provider call fails, and as
//! the [`Heuristic`](crate::ReasoningProvider::Heuristic) provider itself.
//! Rules are tried in priority order and the first that applies wins:
//!
//! 1. Hungry and holding food: eat one food.
//! 2. Hungry, no food, standing at a vendor that sells food the agent can
//!    afford: buy one food.
//! 3. Hungry and standing on a food spawn with units left: gather.
//! 4. Exhausted: sleep.
//! 5. Otherwise: explore.

use holdfast_types::{Action, Decision, Item, Observation};

/// Hunger and energy levels below which the heuristic reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurvivalThresholds {
    /// Hunger strictly below this is hungry.
    pub hungry_below: u32,
    /// Energy strictly below this is exhausted.
    pub exhausted_below: u32,
}

impl Default for SurvivalThresholds {
    fn default() -> Self {
        Self {
            hungry_below: 30,
            exhausted_below: 20,
        }
    }
}

/// Which heuristic rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurvivalRule {
    /// Ate held food.
    Eat,
    /// Bought food from a vendor here.
    BuyFood,
    /// Gathered from a food spawn here.
    GatherFood,
    /// Slept.
    Sleep,
    /// Explored.
    Explore,
}

impl SurvivalRule {
    /// Label for logging and rationales.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eat => "eat",
            Self::BuyFood => "buy_food",
            Self::GatherFood => "gather_food",
            Self::Sleep => "sleep",
            Self::Explore => "explore",
        }
    }
}

/// Pick an action for `observation`.
pub fn survival_decision(observation: &Observation, thresholds: SurvivalThresholds) -> Decision {
    let (rule, action) = choose(observation, thresholds);
    Decision::new(action, format!("survival heuristic: {}", rule.as_str()))
}

/// The rule that fires and the action it selects.
pub fn choose(observation: &Observation, thresholds: SurvivalThresholds) -> (SurvivalRule, Action) {
    let me = &observation.self_state;
    let hungry = me.hunger < thresholds.hungry_below;

    if hungry {
        if me.holding(Item::Food) > 0 {
            return (
                SurvivalRule::Eat,
                Action::Consume {
                    item: Item::Food,
                    quantity: 1,
                },
            );
        }

        let affordable = observation
            .vendors_here()
            .filter(|vendor| {
                vendor
                    .offer(Item::Food, 1)
                    .is_some_and(|price| price <= me.balance)
            })
            .min_by_key(|vendor| vendor.id);
        if let Some(vendor) = affordable {
            return (
                SurvivalRule::BuyFood,
                Action::Buy {
                    vendor: vendor.id,
                    item: Item::Food,
                    quantity: 1,
                },
            );
        }

        let spawn = observation
            .spawns_here()
            .filter(|spawn| spawn.item == Item::Food && spawn.quantity > 0)
            .min_by_key(|spawn| spawn.id);
        if let Some(spawn) = spawn {
            return (SurvivalRule::GatherFood, Action::Gather { spawn: spawn.id });
        }
    }

    if me.energy < thresholds.exhausted_below {
        return (SurvivalRule::Sleep, Action::Sleep);
    }

    (SurvivalRule::Explore, Action::Explore)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use holdfast_types::{
        ActivityStatus, AgentId, GridSize, NearbySpawn, NearbyVendor, Position, SelfView, SpawnId,
        VendorId,
    };
    use rust_decimal_macros::dec;

    use super::*;

    fn observation(hunger: u32, energy: u32) -> Observation {
        Observation {
            tick: 3,
            agent_id: AgentId::new(1),
            grid: GridSize {
                width: 10,
                height: 10,
            },
            self_state: SelfView {
                position: Position::new(4, 4),
                hunger,
                energy,
                health: 100,
                balance: dec!(100),
                inventory: BTreeMap::new(),
                status: ActivityStatus::Idle,
            },
            nearby_agents: Vec::new(),
            nearby_spawns: Vec::new(),
            nearby_vendors: Vec::new(),
            nearby_shelters: Vec::new(),
            contracts: Vec::new(),
            recent_events: Vec::new(),
            memories: Vec::new(),
        }
    }

    fn vendor(distance: u32, price: rust_decimal::Decimal) -> NearbyVendor {
        NearbyVendor {
            id: VendorId::new(7),
            name: "market".to_owned(),
            position: Position::new(4, 4),
            distance,
            prices: BTreeMap::from([(Item::Food, price)]),
            stock: BTreeMap::from([(Item::Food, 5)]),
        }
    }

    #[test]
    fn hungry_with_food_eats() {
        let mut obs = observation(15, 80);
        obs.self_state.inventory.insert(Item::Food, 2);
        obs.nearby_vendors.push(vendor(0, dec!(5)));
        assert_eq!(choose(&obs, SurvivalThresholds::default()).0, SurvivalRule::Eat);
    }

    #[test]
    fn hungry_at_vendor_buys_one_food() {
        let mut obs = observation(15, 80);
        obs.nearby_vendors.push(vendor(0, dec!(5)));
        let decision = survival_decision(&obs, SurvivalThresholds::default());
        assert_eq!(
            decision.action,
            Action::Buy {
                vendor: VendorId::new(7),
                item: Item::Food,
                quantity: 1,
            }
        );
    }

    #[test]
    fn unaffordable_or_distant_vendor_is_skipped() {
        let mut obs = observation(15, 80);
        obs.nearby_vendors.push(vendor(0, dec!(150)));
        obs.nearby_vendors.push(vendor(2, dec!(1)));
        assert_eq!(choose(&obs, SurvivalThresholds::default()).0, SurvivalRule::Explore);
    }

    #[test]
    fn hungry_on_food_spawn_gathers() {
        let mut obs = observation(15, 80);
        obs.nearby_spawns.push(NearbySpawn {
            id: SpawnId::new(3),
            item: Item::Food,
            position: Position::new(4, 4),
            distance: 0,
            quantity: 2,
        });
        let (rule, action) = choose(&obs, SurvivalThresholds::default());
        assert_eq!(rule, SurvivalRule::GatherFood);
        assert_eq!(
            action,
            Action::Gather {
                spawn: SpawnId::new(3)
            }
        );
    }

    #[test]
    fn exhausted_sleeps() {
        let obs = observation(80, 10);
        assert_eq!(
            choose(&obs, SurvivalThresholds::default()),
            (SurvivalRule::Sleep, Action::Sleep)
        );
    }

    #[test]
    fn content_agent_explores() {
        let obs = observation(80, 80);
        assert_eq!(choose(&obs, SurvivalThresholds::default()).1, Action::Explore);
    }
}
