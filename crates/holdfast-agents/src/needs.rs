//! Per-tick needs decay: hunger, energy, and health.
//!
//! Runs once per live agent after actions are applied. The order is fixed:
//!
//! 1. Hunger falls by `hunger_decay`.
//! 2. Energy falls by `energy_decay`.
//! 3. Health takes starvation and exhaustion damage for every gauge at or
//!    below its critical level.
//! 4. An undamaged agent with hunger and energy both at or above
//!    `heal_threshold` regains `natural_heal` health.
//! 5. Health at zero marks the agent dead.
//!
//! Like action handlers, [`decay`] only computes changes. The caller
//! applies them.

use holdfast_types::{ActivityStatus, AgentId, AgentState, EntityRef, Field, GAUGE_MAX, StateChange};

use crate::actions::changeset::ChangeSet;
use crate::actions::remember;
use crate::config::NeedsConfig;

/// Why an agent died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    /// Hunger sat at or below its critical level.
    Starvation,
    /// Energy sat at or below its critical level.
    Exhaustion,
}

impl DeathCause {
    /// Lowercase label used in event payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starvation => "starvation",
            Self::Exhaustion => "exhaustion",
        }
    }
}

impl core::fmt::Display for DeathCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one agent's decay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedsOutcome {
    /// Agent decayed.
    pub agent_id: AgentId,
    /// Hunger after decay.
    pub hunger: u32,
    /// Energy after decay.
    pub energy: u32,
    /// Health after damage or healing.
    pub health: u32,
    /// Changes to apply, including the death transition if any.
    pub changes: Vec<StateChange>,
    /// Set when health reached zero this tick.
    pub death: Option<DeathCause>,
}

impl NeedsOutcome {
    /// Whether this step killed the agent.
    pub const fn died(&self) -> bool {
        self.death.is_some()
    }
}

/// Compute one tick of decay for `agent`.
///
/// Dead agents produce an empty outcome.
pub fn decay(agent: &AgentState, config: &NeedsConfig, tick: u64) -> NeedsOutcome {
    if !agent.is_alive() {
        return NeedsOutcome {
            agent_id: agent.id,
            hunger: agent.hunger,
            energy: agent.energy,
            health: agent.health,
            changes: Vec::new(),
            death: None,
        };
    }

    let hunger = agent.hunger.saturating_sub(config.hunger_decay);
    let energy = agent.energy.saturating_sub(config.energy_decay);

    let starving = hunger <= config.hunger_critical;
    let exhausted = energy <= config.energy_critical;
    let mut damage: u32 = 0;
    if starving {
        damage = damage.saturating_add(config.starvation_damage);
    }
    if exhausted {
        damage = damage.saturating_add(config.exhaustion_damage);
    }

    let health = if damage > 0 {
        agent.health.saturating_sub(damage)
    } else if hunger >= config.heal_threshold && energy >= config.heal_threshold {
        agent.health.saturating_add(config.natural_heal).min(GAUGE_MAX)
    } else {
        agent.health
    };

    let death = (health == 0).then_some(if starving {
        DeathCause::Starvation
    } else {
        DeathCause::Exhaustion
    });

    let entity = EntityRef::Agent(agent.id);
    let mut changes = ChangeSet::new();
    changes.count(entity, Field::Hunger, agent.hunger, hunger);
    changes.count(entity, Field::Energy, agent.energy, energy);
    changes.count(entity, Field::Health, agent.health, health);
    if let Some(cause) = death {
        tracing::info!(agent_id = %agent.id, cause = %cause, "Agent died");
        changes.status(entity, agent.status, ActivityStatus::Dead);
        changes.memories(
            entity,
            &agent.memories,
            remember(&agent.memories, tick, &format!("died of {cause}")),
        );
    }

    NeedsOutcome {
        agent_id: agent.id,
        hunger,
        energy,
        health,
        changes: changes.into_inner(),
        death,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use holdfast_types::{FieldValue, Position};
    use rust_decimal::Decimal;

    use super::*;

    fn agent(hunger: u32, energy: u32, health: u32) -> AgentState {
        AgentState {
            id: AgentId::new(1),
            name: "tess".to_owned(),
            position: Position::new(0, 0),
            hunger,
            energy,
            health,
            balance: Decimal::ZERO,
            inventory: BTreeMap::new(),
            status: ActivityStatus::Idle,
            memories: Vec::new(),
        }
    }

    #[test]
    fn gauges_fall_each_tick() {
        let outcome = decay(&agent(50, 50, 100), &NeedsConfig::default(), 1);
        assert_eq!(outcome.hunger, 48);
        assert_eq!(outcome.energy, 49);
        assert_eq!(outcome.health, 100);
        assert_eq!(outcome.changes.len(), 2);
        assert!(!outcome.died());
    }

    #[test]
    fn gauges_floor_at_zero() {
        let outcome = decay(&agent(1, 0, 100), &NeedsConfig::default(), 1);
        assert_eq!(outcome.hunger, 0);
        assert_eq!(outcome.energy, 0);
    }

    #[test]
    fn starvation_damages_health() {
        let cfg = NeedsConfig::default();
        let outcome = decay(&agent(5, 50, 100), &cfg, 1);
        assert_eq!(outcome.health, 100_u32.saturating_sub(cfg.starvation_damage));
    }

    #[test]
    fn both_critical_stack_damage() {
        let cfg = NeedsConfig::default();
        let outcome = decay(&agent(5, 5, 100), &cfg, 1);
        let expected = 100_u32
            .saturating_sub(cfg.starvation_damage)
            .saturating_sub(cfg.exhaustion_damage);
        assert_eq!(outcome.health, expected);
    }

    #[test]
    fn well_fed_agents_heal() {
        let cfg = NeedsConfig::default();
        let outcome = decay(&agent(90, 90, 50), &cfg, 1);
        assert_eq!(outcome.health, 50_u32.saturating_add(cfg.natural_heal));
    }

    #[test]
    fn health_at_zero_kills() {
        let outcome = decay(&agent(2, 50, 5), &NeedsConfig::default(), 7);
        assert_eq!(outcome.health, 0);
        assert_eq!(outcome.death, Some(DeathCause::Starvation));
        assert!(outcome.changes.iter().any(|c| c.field == Field::Status
            && c.new == FieldValue::Status(ActivityStatus::Dead)));
    }

    #[test]
    fn dead_agents_do_not_decay() {
        let mut corpse = agent(0, 0, 0);
        corpse.status = ActivityStatus::Dead;
        let outcome = decay(&corpse, &NeedsConfig::default(), 1);
        assert!(outcome.changes.is_empty());
        assert!(!outcome.died());
    }
}
