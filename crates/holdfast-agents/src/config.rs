//! Tunable parameters for needs decay and item effects.
//!
//! [`NeedsConfig`] is deserialized as the `needs` section of the
//! simulation YAML and can be swapped at runtime between ticks.

use serde::{Deserialize, Serialize};

/// Per-tick attrition parameters, plus what food, sleep, and gathering
/// give back.
///
/// Gauges are satiety-style: they fall toward 0 every tick and an agent
/// takes health damage once a gauge sits at or below its critical level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsConfig {
    /// Hunger lost per tick (default: 2).
    pub hunger_decay: u32,
    /// Energy lost per tick (default: 1).
    pub energy_decay: u32,
    /// Hunger at or below which starvation damage applies (default: 10).
    pub hunger_critical: u32,
    /// Energy at or below which exhaustion damage applies (default: 5).
    pub energy_critical: u32,
    /// Health lost per tick while starving (default: 10).
    pub starvation_damage: u32,
    /// Health lost per tick while exhausted (default: 5).
    pub exhaustion_damage: u32,
    /// Hunger and energy at or above which health regenerates (default: 60).
    pub heal_threshold: u32,
    /// Health regained per tick when well fed and rested (default: 2).
    pub natural_heal: u32,
    /// Hunger below which an agent counts as hungry (default: 30).
    pub hungry_threshold: u32,
    /// Energy below which an agent counts as exhausted (default: 20).
    pub exhausted_threshold: u32,
    /// Hunger restored per unit of food consumed (default: 30).
    pub food_nutrition: u32,
    /// Energy restored by one `sleep` (default: 25).
    pub sleep_recovery: u32,
    /// Extra energy restored when sleeping in a shelter with room (default: 15).
    pub shelter_bonus: u32,
    /// Units taken from a spawn by one `gather` (default: 1).
    pub gather_yield: u32,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            hunger_decay: 2,
            energy_decay: 1,
            hunger_critical: 10,
            energy_critical: 5,
            starvation_damage: 10,
            exhaustion_damage: 5,
            heal_threshold: 60,
            natural_heal: 2,
            hungry_threshold: 30,
            exhausted_threshold: 20,
            food_nutrition: 30,
            sleep_recovery: 25,
            shelter_bonus: 15,
            gather_yield: 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = NeedsConfig::default();
        assert_eq!(cfg.hunger_decay, 2);
        assert_eq!(cfg.starvation_damage, 10);
        assert_eq!(cfg.hungry_threshold, 30);
        assert_eq!(cfg.exhausted_threshold, 20);
        assert_eq!(cfg.food_nutrition, 30);
        assert_eq!(cfg.gather_yield, 1);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: NeedsConfig =
            serde_json::from_str(r#"{"hunger_decay": 7, "food_nutrition": 12}"#).unwrap();
        assert_eq!(cfg.hunger_decay, 7);
        assert_eq!(cfg.food_nutrition, 12);
        assert_eq!(cfg.energy_decay, 1);
        assert_eq!(cfg.sleep_recovery, 25);
    }
}
