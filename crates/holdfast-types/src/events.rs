//! Event log records and their typed payloads.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::actions::{ActionResult, Decision};
use crate::changes::StateChange;
use crate::enums::EventCategory;
use crate::ids::AgentId;
use crate::ledger::LedgerEntry;

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Actor {
    /// The simulation itself.
    System,
    /// A specific agent.
    Agent(AgentId),
}

/// An event before it has been sequenced and hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Tick the event belongs to.
    pub tick: u64,
    /// Who caused it.
    pub actor: Actor,
    /// Category.
    pub category: EventCategory,
    /// Category-specific payload.
    pub payload: serde_json::Value,
    /// Ordered deltas to fold during replay.
    pub changes: Vec<StateChange>,
}

impl EventDraft {
    /// A draft with no state changes.
    pub const fn new(
        tick: u64,
        actor: Actor,
        category: EventCategory,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tick,
            actor,
            category,
            payload,
            changes: Vec::new(),
        }
    }

    /// Attach state changes.
    #[must_use]
    pub fn with_changes(mut self, changes: Vec<StateChange>) -> Self {
        self.changes = changes;
        self
    }
}

/// A committed, immutable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Position in the stream, starting at 0 for genesis.
    pub sequence: u64,
    /// Tick the event belongs to.
    pub tick: u64,
    /// Who caused it.
    pub actor: Actor,
    /// Category.
    pub category: EventCategory,
    /// Category-specific payload.
    pub payload: serde_json::Value,
    /// Ordered deltas.
    pub changes: Vec<StateChange>,
    /// Hex SHA-256 of the preceding event.
    pub prev_hash: String,
    /// Hex SHA-256 of `prev_hash` followed by this event's canonical bytes.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload of `action_succeeded` and `action_failed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionPayload {
    /// The decision that was applied.
    pub decision: Decision,
    /// Whether the decision came from the survival heuristic after a provider failure.
    pub used_fallback: bool,
    /// Why the fallback was used.
    pub fallback_reason: Option<String>,
    /// Provider the agent is bound to.
    pub provider_id: String,
    /// Outcome of the action.
    pub result: ActionResult,
    /// Ledger rows written by the action.
    pub ledger: Vec<LedgerEntry>,
}

/// Payload of `needs_decayed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NeedsPayload {
    /// Hunger after decay.
    pub hunger: u32,
    /// Energy after decay.
    pub energy: u32,
    /// Health after decay.
    pub health: u32,
}

/// Payload of `agent_died` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DeathPayload {
    /// The agent's name.
    pub name: String,
    /// What drained the agent's health.
    pub cause: String,
}

/// Payload of `tick_failed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickFailedPayload {
    /// Rendered error.
    pub error: String,
}

/// Payload of `ledger_anomaly` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerAnomalyPayload {
    /// Description of the violation.
    pub detail: String,
}
