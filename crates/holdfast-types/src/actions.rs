//! Decisions and action results exchanged between the decision and
//! application phases of a tick.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActionType, FailureReason, Item};
use crate::ids::{AgentId, ContractId, SpawnId, VendorId};
use crate::structs::Position;

/// An action with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Action {
    /// Step to an adjacent cell.
    Move {
        /// Destination cell.
        to: Position,
    },
    /// Take one unit from a spawn on the current cell.
    Gather {
        /// Spawn to take from.
        spawn: SpawnId,
    },
    /// Use items from the inventory.
    Consume {
        /// Item to consume.
        item: Item,
        /// Units to consume.
        quantity: u32,
    },
    /// Purchase from a vendor on the current cell.
    Buy {
        /// Vendor to buy from.
        vendor: VendorId,
        /// Item to buy.
        item: Item,
        /// Units to buy.
        quantity: u32,
    },
    /// Swap items with a nearby agent.
    Trade {
        /// Counterparty.
        partner: AgentId,
        /// Item handed over.
        give: Item,
        /// Units handed over.
        give_quantity: u32,
        /// Item received.
        receive: Item,
        /// Units received.
        receive_quantity: u32,
    },
    /// Recover energy.
    Sleep,
    /// Work one shift of a contract.
    Work {
        /// Contract to work.
        contract: ContractId,
    },
    /// Step to a deterministic neighbouring cell.
    Explore,
    /// Do nothing.
    Idle,
}

impl Action {
    /// The parameterless discriminant.
    pub const fn action_type(&self) -> ActionType {
        match self {
            Self::Move { .. } => ActionType::Move,
            Self::Gather { .. } => ActionType::Gather,
            Self::Consume { .. } => ActionType::Consume,
            Self::Buy { .. } => ActionType::Buy,
            Self::Trade { .. } => ActionType::Trade,
            Self::Sleep => ActionType::Sleep,
            Self::Work { .. } => ActionType::Work,
            Self::Explore => ActionType::Explore,
            Self::Idle => ActionType::Idle,
        }
    }
}

/// One agent's chosen action for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Decision {
    /// What to do.
    pub action: Action,
    /// Free-text explanation from the provider or heuristic.
    pub rationale: String,
}

impl Decision {
    /// Build a decision.
    pub fn new(action: Action, rationale: impl Into<String>) -> Self {
        Self {
            action,
            rationale: rationale.into(),
        }
    }

    /// A no-op decision.
    pub fn idle(rationale: impl Into<String>) -> Self {
        Self::new(Action::Idle, rationale)
    }
}

/// Outcome of applying one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionResult {
    /// Acting agent.
    pub agent_id: AgentId,
    /// Action attempted.
    pub action_type: ActionType,
    /// Whether the action was applied.
    pub success: bool,
    /// Failure reason when `success` is false.
    pub reason: Option<FailureReason>,
    /// Human-readable summary.
    pub summary: String,
}

impl ActionResult {
    /// A successful result.
    pub fn succeeded(
        agent_id: AgentId,
        action_type: ActionType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            action_type,
            success: true,
            reason: None,
            summary: summary.into(),
        }
    }

    /// A failed result.
    pub fn failed(
        agent_id: AgentId,
        action_type: ActionType,
        reason: FailureReason,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            action_type,
            success: false,
            reason: Some(reason),
            summary: summary.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_with_tag() {
        let action = Action::Buy {
            vendor: VendorId::new(3),
            item: Item::Food,
            quantity: 1,
        };
        let json = serde_json::to_value(&action).unwrap_or_default();
        assert_eq!(json["action"], "buy");
        assert_eq!(json["vendor"], 3);
        assert_eq!(json["item"], "food");
    }

    #[test]
    fn unit_actions_serialize_as_tag_only() {
        let json = serde_json::to_string(&Action::Sleep).unwrap_or_default();
        assert_eq!(json, r#"{"action":"sleep"}"#);
    }

    #[test]
    fn action_type_matches_variant() {
        assert_eq!(Action::Explore.action_type(), ActionType::Explore);
        assert_eq!(
            Action::Gather { spawn: SpawnId::new(1) }.action_type(),
            ActionType::Gather
        );
    }
}
