//! The tick pipeline: everything that happens between two clock edges.
//!
//! [`run_tick`] advances a [`Simulation`] by one tick:
//!
//! 1. **Start** -- `tick_started` moves `World.tick` forward.
//! 2. **Decide** -- every live agent's decision is resolved concurrently
//!    through the [`DecisionOrchestrator`].
//! 3. **Apply** -- after the barrier, decisions are applied one agent at a
//!    time in ascending id order. Each outcome is recorded as
//!    `action_succeeded` or `action_failed`.
//! 4. **Decay** -- needs decay per live agent (`needs_decayed`, plus
//!    `agent_died` on a health-zero transition).
//! 5. **Regenerate** -- resource spawns refill (`resources_regenerated`).
//! 6. **Audit** -- total currency must be unchanged and every ledger flow
//!    must match a balance change. A violation is recorded as
//!    `ledger_anomaly`, halts the ledger, and fails the tick as an
//!    integrity error.
//! 7. **Snapshot** -- every `snapshot_interval_ticks`.
//!
//! Every event's changes are applied to the world before the event is
//! appended, and reverted if the append fails, so the live world always
//! equals a replay of the log.

use std::collections::BTreeMap;

use chrono::Utc;
use holdfast_agents::{ActionError, apply, commit, decay};
use holdfast_events::{EventStore, EventStoreError};
use holdfast_ledger::{ConservationResult, Ledger, LedgerAnomaly, conservation};
use holdfast_types::{
    Account, ActionPayload, Actor, AgentId, AgentTickReport, DeathPayload, EntityRef, Event,
    EventCategory, EventDraft, Field, FieldValue, LedgerAnomalyPayload, NeedsPayload, RunId,
    StateChange, TickSummary, WorldState,
};
use holdfast_world::{WorldError, apply_changes, regeneration_changes};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::decision::DecisionOrchestrator;

/// Errors that stop a tick part-way.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Appending to or reading from the event store failed.
    #[error("event store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: EventStoreError,
    },

    /// Applying an agent's action faulted.
    #[error("action error for {agent_id}: {source}")]
    Action {
        /// The acting agent.
        agent_id: AgentId,
        /// The underlying action error.
        source: ActionError,
    },

    /// A world update was refused.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// An event payload could not be serialized.
    #[error("payload serialization failed: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// Money appeared, vanished, or moved without a ledger record.
    #[error("integrity violation at tick {tick}: {detail}")]
    Integrity {
        /// The tick being processed.
        tick: u64,
        /// What was violated.
        detail: String,
    },

    /// The tick counter is exhausted.
    #[error("tick counter overflow")]
    TickOverflow,
}

impl TickError {
    /// Whether the simulation must stop accepting ticks.
    pub const fn is_integrity(&self) -> bool {
        match self {
            Self::Integrity { .. } => true,
            Self::Store { source } => source.is_integrity(),
            Self::Action { source, .. } => source.is_integrity(),
            Self::World { source } => source.is_integrity(),
            Self::Serialization { .. } | Self::TickOverflow => false,
        }
    }
}

/// The authoritative mutable state the pipeline threads through each tick.
#[derive(Debug)]
pub struct Simulation {
    /// Process run tag for summaries and logs.
    pub run_id: RunId,
    /// Live world.
    pub world: WorldState,
    /// Currency movements for this stream.
    pub ledger: Ledger,
}

impl Simulation {
    /// A simulation starting from `world` with an empty ledger.
    pub fn new(world: WorldState) -> Self {
        Self {
            run_id: RunId::new(),
            world,
            ledger: Ledger::new(),
        }
    }

    /// The tick the next [`run_tick`] call will process.
    pub fn next_tick(&self) -> Result<u64, TickError> {
        self.world.tick.checked_add(1).ok_or(TickError::TickOverflow)
    }
}

#[derive(Debug, Default)]
struct Tally {
    successes: u32,
    failures: u32,
    fallbacks: u32,
    deaths: u32,
    cache_hits: u32,
}

/// Run one tick.
///
/// # Errors
///
/// Returns the first [`TickError`]. Events appended before the failure
/// stay in the log and their changes stay in the world.
pub async fn run_tick(
    sim: &mut Simulation,
    store: &EventStore,
    orchestrator: &DecisionOrchestrator,
    config: &SimulationConfig,
) -> Result<TickSummary, TickError> {
    let started_at = Utc::now();
    let clock = std::time::Instant::now();
    let tick = sim.next_tick()?;
    let balances_before = conservation::balances(&sim.world);
    let currency_before = sim.world.total_currency();

    // --- Start ---
    let advance = StateChange::new(
        EntityRef::World,
        Field::Tick,
        FieldValue::Tick(sim.world.tick),
        FieldValue::Tick(tick),
    );
    let started = EventDraft::new(
        tick,
        Actor::System,
        EventCategory::TickStarted,
        serde_json::json!({ "tick": tick }),
    );
    record(&mut sim.world, store, started.with_changes(vec![advance]))?;
    let agents = sim.world.live_agent_ids();
    info!(tick, agents = agents.len(), run_id = %sim.run_id, "Tick started");

    // --- Decide ---
    let decisions = orchestrator.decide_all(&agents, &sim.world, tick).await;

    // --- Apply ---
    let mut tally = Tally::default();
    let mut results = BTreeMap::new();
    for (agent_id, outcome) in decisions {
        let plan = apply(&sim.world, agent_id, &outcome.decision, &config.needs)
            .map_err(|source| TickError::Action { agent_id, source })?;
        let applied = commit(&mut sim.world, &mut sim.ledger, plan)
            .map_err(|source| TickError::Action { agent_id, source })?;

        let category = if applied.result.success {
            tally.successes = tally.successes.saturating_add(1);
            EventCategory::ActionSucceeded
        } else {
            tally.failures = tally.failures.saturating_add(1);
            EventCategory::ActionFailed
        };
        if outcome.used_fallback {
            tally.fallbacks = tally.fallbacks.saturating_add(1);
        }
        if outcome.cache_hit() {
            tally.cache_hits = tally.cache_hits.saturating_add(1);
        }
        debug!(
            tick,
            agent_id = %agent_id,
            action = %applied.result.action_type,
            success = applied.result.success,
            "Action applied"
        );

        let payload = ActionPayload {
            decision: outcome.decision,
            used_fallback: outcome.used_fallback,
            fallback_reason: outcome.fallback_reason,
            provider_id: outcome.provider_id,
            result: applied.result.clone(),
            ledger: applied.ledger,
        };
        let draft = EventDraft::new(
            tick,
            Actor::Agent(agent_id),
            category,
            serde_json::to_value(&payload)?,
        );
        append_applied(&mut sim.world, store, draft.with_changes(applied.changes))?;

        results.insert(
            agent_id,
            AgentTickReport {
                result: applied.result,
                used_fallback: outcome.used_fallback,
                cache_hit: outcome.cache_status.is_hit(),
                latency_ms: outcome.latency_ms,
            },
        );
    }

    // --- Decay ---
    for agent_id in sim.world.live_agent_ids() {
        let Some(agent) = sim.world.agents.get(&agent_id) else {
            continue;
        };
        let name = agent.name.clone();
        let needs = decay(agent, &config.needs, tick);
        let payload = NeedsPayload {
            hunger: needs.hunger,
            energy: needs.energy,
            health: needs.health,
        };
        let draft = EventDraft::new(
            tick,
            Actor::Agent(agent_id),
            EventCategory::NeedsDecayed,
            serde_json::to_value(&payload)?,
        );
        record(&mut sim.world, store, draft.with_changes(needs.changes))?;

        if let Some(cause) = needs.death {
            tally.deaths = tally.deaths.saturating_add(1);
            warn!(tick, agent_id = %agent_id, name = %name, cause = %cause, "Agent died");
            let payload = DeathPayload {
                name,
                cause: cause.as_str().to_owned(),
            };
            store.append(EventDraft::new(
                tick,
                Actor::Agent(agent_id),
                EventCategory::AgentDied,
                serde_json::to_value(&payload)?,
            ))?;
        }
    }

    // --- Regenerate ---
    let regrowth = regeneration_changes(&sim.world)?;
    if !regrowth.is_empty() {
        let spawns = regrowth.len();
        record(
            &mut sim.world,
            store,
            EventDraft::new(
                tick,
                Actor::System,
                EventCategory::ResourcesRegenerated,
                serde_json::json!({ "spawns": spawns }),
            )
            .with_changes(regrowth),
        )?;
    }

    // --- Audit ---
    if let Some(anomaly) = audit(sim, tick, &balances_before, currency_before) {
        error!(tick, detail = %anomaly.message, "Ledger anomaly, halting");
        sim.ledger.halt(&anomaly);
        let payload = LedgerAnomalyPayload {
            detail: anomaly.message.clone(),
        };
        store.append(EventDraft::new(
            tick,
            Actor::System,
            EventCategory::LedgerAnomaly,
            serde_json::to_value(&payload)?,
        ))?;
        return Err(TickError::Integrity {
            tick,
            detail: anomaly.message,
        });
    }

    // --- Snapshot ---
    let interval = config.tick.snapshot_interval_ticks;
    if interval > 0 && tick.checked_rem(interval) == Some(0) {
        match store.snapshot(&sim.world) {
            Ok(snapshot) => debug!(tick, sequence = snapshot.sequence, "Snapshot written"),
            Err(err) if err.is_integrity() => return Err(err.into()),
            Err(err) => warn!(tick, error = %err, "Snapshot failed, continuing"),
        }
    }

    let completed_at = Utc::now();
    let summary = TickSummary {
        run_id: sim.run_id,
        tick,
        results,
        successes: tally.successes,
        failures: tally.failures,
        fallbacks: tally.fallbacks,
        deaths: tally.deaths,
        cache_hits: tally.cache_hits,
        agents_alive: u32::try_from(sim.world.live_agent_ids().len()).unwrap_or(u32::MAX),
        duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        started_at,
        completed_at,
    };
    info!(
        tick,
        successes = summary.successes,
        failures = summary.failures,
        fallbacks = summary.fallbacks,
        deaths = summary.deaths,
        cache_hits = summary.cache_hits,
        agents_alive = summary.agents_alive,
        duration_ms = summary.duration_ms,
        "Tick completed"
    );
    Ok(summary)
}

/// Apply `draft`'s changes to `world`, then append it.
pub(crate) fn record(
    world: &mut WorldState,
    store: &EventStore,
    draft: EventDraft,
) -> Result<Event, TickError> {
    apply_changes(world, &draft.changes)?;
    append_applied(world, store, draft)
}

/// Append a draft whose changes are already in `world`, reverting them if
/// the append fails.
fn append_applied(
    world: &mut WorldState,
    store: &EventStore,
    draft: EventDraft,
) -> Result<Event, TickError> {
    let inverse: Vec<StateChange> = draft
        .changes
        .iter()
        .rev()
        .map(StateChange::inverted)
        .collect();
    match store.append(draft) {
        Ok(event) => Ok(event),
        Err(err) => {
            if let Err(revert) = apply_changes(world, &inverse) {
                error!(error = %revert, "Failed to revert changes of an unrecorded event");
            }
            Err(err.into())
        }
    }
}

/// Check that currency was conserved over the tick.
fn audit(
    sim: &Simulation,
    tick: u64,
    balances_before: &BTreeMap<Account, Decimal>,
    currency_before: Option<Decimal>,
) -> Option<LedgerAnomaly> {
    let currency_after = sim.world.total_currency();
    if currency_before != currency_after {
        return Some(LedgerAnomaly {
            tick: Some(tick),
            transactions: Vec::new(),
            accounts: Vec::new(),
            message: format!(
                "LEDGER_ANOMALY at tick {tick}: total currency changed from {} to {}",
                render_total(currency_before),
                render_total(currency_after)
            ),
        });
    }

    let balances_after = conservation::balances(&sim.world);
    let Some(deltas) = conservation::balance_deltas(balances_before, &balances_after) else {
        return Some(LedgerAnomaly {
            tick: Some(tick),
            transactions: Vec::new(),
            accounts: Vec::new(),
            message: format!("LEDGER_ANOMALY at tick {tick}: balance delta overflow"),
        });
    };
    match sim.ledger.verify_tick(tick, &deltas) {
        ConservationResult::Balanced => None,
        ConservationResult::Anomaly(anomaly) => Some(anomaly),
    }
}

fn render_total(total: Option<Decimal>) -> String {
    total.map_or_else(|| String::from("overflow"), |value| value.to_string())
}
