//! Shared type definitions for the Holdfast simulation core.
//!
//! Everything that crosses a crate boundary lives here: identifiers, the
//! world model, decisions, state changes, events, ledger rows, and the
//! per-tick summary. Types flow to `TypeScript` via `ts-rs` for
//! presentation consumers.
//!
//! # Modules
//!
//! - [`ids`] -- Sequential numeric identifiers plus the per-run [`RunId`]
//! - [`enums`] -- Items, statuses, action types, failure reasons, event categories
//! - [`structs`] -- World entities and [`WorldState`]
//! - [`actions`] -- [`Action`], [`Decision`], [`ActionResult`]
//! - [`changes`] -- [`StateChange`] deltas
//! - [`observation`] -- Per-agent [`Observation`]
//! - [`events`] -- [`Event`] records and payloads
//! - [`ledger`] -- [`LedgerEntry`] rows
//! - [`summary`] -- [`TickSummary`]

pub mod actions;
pub mod changes;
pub mod enums;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod observation;
pub mod structs;
pub mod summary;

pub use actions::{Action, ActionResult, Decision};
pub use changes::{EntityRef, Field, FieldValue, StateChange};
pub use enums::{
    ActionType, ActivityStatus, EntrySide, EventCategory, FailureReason, Item, TransferKind,
};
pub use events::{
    ActionPayload, Actor, DeathPayload, Event, EventDraft, LedgerAnomalyPayload, NeedsPayload,
    TickFailedPayload,
};
pub use ids::{
    AgentId, ContractId, LedgerEntryId, RunId, ShelterId, SpawnId, TransactionId, VendorId,
};
pub use ledger::{Account, LedgerEntry};
pub use observation::{
    ContractRole, ContractView, DecisionView, EventSummary, NearbyAgent, NearbyShelter,
    NearbySpawn, NearbyVendor, Observation, SelfView,
};
pub use structs::{
    AgentState, Contract, GAUGE_MAX, GridSize, MAX_QUANTITY, MEMORY_CAPACITY, MemoryNote, Position,
    ResourceSpawn, Shelter, Vendor, WorldState,
};
pub use summary::{AgentTickReport, TickSummary};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::RunId::export_all();
        let _ = crate::enums::Item::export_all();
        let _ = crate::enums::FailureReason::export_all();
        let _ = crate::enums::EventCategory::export_all();
        let _ = crate::structs::WorldState::export_all();
        let _ = crate::actions::Decision::export_all();
        let _ = crate::changes::StateChange::export_all();
        let _ = crate::observation::Observation::export_all();
        let _ = crate::events::Event::export_all();
        let _ = crate::events::ActionPayload::export_all();
        let _ = crate::ledger::LedgerEntry::export_all();
        let _ = crate::summary::TickSummary::export_all();
    }
}
