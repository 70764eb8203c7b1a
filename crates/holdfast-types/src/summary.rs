//! Per-tick summary pushed to presentation consumers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::actions::ActionResult;
use crate::ids::{AgentId, RunId};

/// One agent's line in a [`TickSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentTickReport {
    /// What happened.
    pub result: ActionResult,
    /// Whether the heuristic stood in for the provider.
    pub used_fallback: bool,
    /// Whether the decision was served from the cache.
    pub cache_hit: bool,
    /// Decision latency in milliseconds.
    pub latency_ms: u64,
}

/// Aggregate view of one processed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickSummary {
    /// Process run.
    pub run_id: RunId,
    /// Tick number.
    pub tick: u64,
    /// Per-agent outcomes.
    pub results: BTreeMap<AgentId, AgentTickReport>,
    /// Actions applied.
    pub successes: u32,
    /// Actions that failed validation.
    pub failures: u32,
    /// Decisions that came from the fallback heuristic.
    pub fallbacks: u32,
    /// Agents that died this tick.
    pub deaths: u32,
    /// Decisions served from the cache.
    pub cache_hits: u32,
    /// Live agents after the tick.
    pub agents_alive: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// When processing began.
    pub started_at: DateTime<Utc>,
    /// When processing finished.
    pub completed_at: DateTime<Utc>,
}
