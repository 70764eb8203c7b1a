//! The top-level tick loop and its operator surface.
//!
//! A [`TickScheduler`] owns the live [`Simulation`] and is the only writer
//! of world state. [`start`](TickScheduler::start) drives
//! [`advance`](TickScheduler::advance) on the configured interval until an
//! end condition is met. Ticks never overlap: the next tick starts only
//! after the previous one's events are appended.
//!
//! Failure policy:
//!
//! - A tick that fails with an ordinary error is recorded as one
//!   `tick_failed` event and the loop carries on with the following tick.
//! - A tick that fails with an integrity error halts the scheduler and the
//!   event store. No further ticks are accepted until a reset.
//!
//! Pause, resume, stop, and status go through the shared
//! [`OperatorState`], so they can be driven from other tasks while
//! [`start`](TickScheduler::start) is running.

use std::sync::Arc;

use holdfast_events::{EventStore, EventStoreError};
use holdfast_ledger::Ledger;
use holdfast_types::{
    Actor, EntityRef, EventCategory, EventDraft, Field, FieldValue, RunId, StateChange,
    TickFailedPayload, TickSummary, WorldState,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::{ConfigError, ConfigHandle, MIN_TICK_INTERVAL_MS};
use crate::decision::DecisionOrchestrator;
use crate::operator::{OperatorState, SchedulerStatus, SimulationEndReason};
use crate::tick::{self, Simulation, TickError};

/// Capacity of the tick summary broadcast channel.
pub const SUMMARY_CHANNEL_CAPACITY: usize = 64;

/// Errors returned by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// An integrity error stopped the simulation.
    #[error("simulation halted: {reason}")]
    Halted {
        /// What was violated.
        reason: String,
    },

    /// A tick failed and was recorded as `tick_failed`.
    #[error("tick {tick} failed: {source}")]
    TickFailed {
        /// The tick that failed.
        tick: u64,
        /// The pipeline error.
        source: Box<TickError>,
    },

    /// The event store refused an operation outside a tick.
    #[error("event store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: EventStoreError,
    },

    /// A control or configuration change was rejected.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },
}

/// Drives the simulation one tick at a time.
#[derive(Debug)]
pub struct TickScheduler {
    sim: Simulation,
    store: Arc<EventStore>,
    orchestrator: DecisionOrchestrator,
    config: ConfigHandle,
    operator: Arc<OperatorState>,
    summaries: broadcast::Sender<TickSummary>,
    /// The last run ended on `max_ticks` or extinction rather than an
    /// operator stop.
    ended_by_condition: bool,
}

impl TickScheduler {
    /// Start a new event stream from `world`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if `store` already holds events
    /// or the genesis event cannot be written.
    pub fn new(
        world: WorldState,
        store: Arc<EventStore>,
        orchestrator: DecisionOrchestrator,
        config: ConfigHandle,
    ) -> Result<Self, SchedulerError> {
        store.genesis(&world)?;
        Ok(Self::assemble(Simulation::new(world), store, orchestrator, config))
    }

    /// Continue an existing event stream.
    ///
    /// The world is rebuilt by replaying the stream up to its last event.
    /// The ledger starts empty; conservation checks only look at the
    /// current tick's postings.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the stream is empty or cannot
    /// be replayed.
    pub fn resume(
        store: Arc<EventStore>,
        orchestrator: DecisionOrchestrator,
        config: ConfigHandle,
    ) -> Result<Self, SchedulerError> {
        let last = store.last_event()?.ok_or(EventStoreError::NoBaseState)?;
        let world = store.world_at(last.tick)?;
        info!(tick = world.tick, events = last.sequence, "Resuming event stream");
        Ok(Self::assemble(Simulation::new(world), store, orchestrator, config))
    }

    fn assemble(
        sim: Simulation,
        store: Arc<EventStore>,
        orchestrator: DecisionOrchestrator,
        config: ConfigHandle,
    ) -> Self {
        let (summaries, _) = broadcast::channel(SUMMARY_CHANNEL_CAPACITY);
        Self {
            sim,
            store,
            orchestrator,
            config,
            operator: Arc::new(OperatorState::new()),
            summaries,
            ended_by_condition: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Live world.
    pub const fn world(&self) -> &WorldState {
        &self.sim.world
    }

    /// Ledger for the current stream.
    pub const fn ledger(&self) -> &Ledger {
        &self.sim.ledger
    }

    /// Current event store.
    pub const fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Decision orchestrator.
    pub const fn orchestrator(&self) -> &DecisionOrchestrator {
        &self.orchestrator
    }

    /// Decision orchestrator, for rebinding providers between ticks.
    pub const fn orchestrator_mut(&mut self) -> &mut DecisionOrchestrator {
        &mut self.orchestrator
    }

    /// Live configuration handle.
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Process run id.
    pub const fn run_id(&self) -> RunId {
        self.sim.run_id
    }

    /// Shared control flags, for driving pause, resume, and stop from
    /// other tasks.
    pub fn controls(&self) -> Arc<OperatorState> {
        Arc::clone(&self.operator)
    }

    /// Receive every completed tick's summary.
    pub fn subscribe(&self) -> broadcast::Receiver<TickSummary> {
        self.summaries.subscribe()
    }

    /// Lifecycle status.
    pub fn status(&self) -> SchedulerStatus {
        self.operator.status()
    }

    // -----------------------------------------------------------------------
    // Operator controls
    // -----------------------------------------------------------------------

    /// Suspend ticking after the current tick.
    pub fn pause(&self) {
        info!(tick = self.sim.world.tick, "Simulation paused");
        self.operator.pause();
    }

    /// Resume ticking.
    pub fn resume(&self) {
        info!(tick = self.sim.world.tick, "Simulation resumed");
        self.operator.resume();
    }

    /// Stop the loop after the current tick.
    pub fn stop(&self) {
        info!(tick = self.sim.world.tick, "Simulation stop requested");
        self.operator.request_stop();
    }

    /// Change the tick interval, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] below [`MIN_TICK_INTERVAL_MS`].
    pub fn set_tick_interval(&self, interval_ms: u64) -> Result<u64, SchedulerError> {
        if interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(ConfigError::Invalid {
                field: "tick.interval_ms",
                reason: format!("must be at least {MIN_TICK_INTERVAL_MS}"),
            }
            .into());
        }
        let previous = self.config.current().tick.interval_ms;
        self.config.set_tick_interval_ms(interval_ms);
        self.operator.nudge();
        info!(previous, interval_ms, "Tick interval changed");
        Ok(previous)
    }

    /// Replace the world and start a new event stream in `store`.
    ///
    /// Taking `&mut self` means the loop is not running. The decision
    /// cache is cleared and the operator flags return to idle. The old
    /// stream is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if `store` already holds events.
    pub fn reset(
        &mut self,
        world: WorldState,
        store: Arc<EventStore>,
    ) -> Result<(), SchedulerError> {
        store.genesis(&world)?;
        let current = self.config.current();
        if current.grid() != world.grid {
            let mut next = current.as_ref().clone();
            next.world.width = world.grid.width;
            next.world.height = world.grid.height;
            self.config.replace(next);
        }
        self.sim = Simulation {
            run_id: self.sim.run_id,
            world,
            ledger: Ledger::new(),
        };
        self.store = store;
        self.orchestrator.cache().clear();
        self.operator.clear();
        self.ended_by_condition = false;
        info!(tick = self.sim.world.tick, "Simulation reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Process one tick now.
    ///
    /// Returns `Ok(None)` without doing anything while paused.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Halted`] if this or an earlier tick hit an
    ///   integrity error.
    /// - [`SchedulerError::TickFailed`] if the tick failed and was
    ///   recorded. The next call processes the following tick.
    pub async fn advance(&mut self) -> Result<Option<TickSummary>, SchedulerError> {
        if self.operator.is_halted() {
            return Err(self.halted_error());
        }
        if self.operator.is_paused() {
            return Ok(None);
        }

        let config = self.config.current();
        self.orchestrator.configure(&config);
        let attempted = match self.sim.next_tick() {
            Ok(tick) => tick,
            Err(err) => {
                return Err(SchedulerError::TickFailed {
                    tick: self.sim.world.tick,
                    source: Box::new(err),
                });
            }
        };

        match tick::run_tick(&mut self.sim, &self.store, &self.orchestrator, &config).await {
            Ok(summary) => {
                if self.summaries.send(summary.clone()).is_err() {
                    tracing::trace!(tick = summary.tick, "No summary subscribers");
                }
                Ok(Some(summary))
            }
            Err(err) if err.is_integrity() => Err(self.halt(attempted, &err)),
            Err(err) => {
                warn!(tick = attempted, error = %err, "Tick failed, continuing");
                if let Err(record) = self.record_failure(attempted, &err) {
                    if record.is_integrity() {
                        return Err(self.halt(attempted, &record));
                    }
                    error!(tick = attempted, error = %record, "Could not record tick failure");
                }
                Err(SchedulerError::TickFailed {
                    tick: attempted,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Run ticks on the configured interval until an end condition.
    ///
    /// Ends on operator stop, `max_ticks`, extinction, or halt. Failed
    /// ticks are logged and skipped over.
    ///
    /// A run that ended on `max_ticks` or extinction can be started again,
    /// for example after raising `max_ticks`. An operator stop stays in
    /// force until [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] or [`SchedulerError::Config`] for
    /// faults outside the tick pipeline.
    pub async fn start(&mut self) -> Result<SimulationEndReason, SchedulerError> {
        let config = self.config.current();
        info!(
            tick = self.sim.world.tick,
            max_ticks = config.tick.max_ticks,
            tick_interval_ms = config.tick.interval_ms,
            run_id = %self.sim.run_id,
            "Simulation starting"
        );
        if std::mem::take(&mut self.ended_by_condition) {
            self.operator.clear_stop();
        }
        self.operator.set_running(true);
        let outcome = self.run_loop().await;
        self.operator.set_running(false);

        let reason = outcome?;
        if matches!(
            reason,
            SimulationEndReason::MaxTicksReached | SimulationEndReason::Extinction
        ) {
            self.operator.request_stop();
            self.ended_by_condition = true;
        }
        info!(
            reason = ?reason,
            tick = self.sim.world.tick,
            agents_alive = self.sim.world.live_agent_ids().len(),
            "Simulation ended"
        );
        Ok(reason)
    }

    async fn run_loop(&mut self) -> Result<SimulationEndReason, SchedulerError> {
        loop {
            if self.operator.is_halted() {
                return Ok(SimulationEndReason::Halted);
            }
            if self.operator.is_paused() {
                info!(tick = self.sim.world.tick, "Waiting for resume");
                self.operator.wait_if_paused().await;
            }
            if self.operator.is_stop_requested() {
                return Ok(SimulationEndReason::OperatorStop);
            }
            if self.tick_limit_reached() {
                return Ok(SimulationEndReason::MaxTicksReached);
            }

            match self.advance().await {
                Ok(Some(summary)) if summary.agents_alive == 0 => {
                    info!(tick = summary.tick, "All agents dead");
                    return Ok(SimulationEndReason::Extinction);
                }
                Ok(_) | Err(SchedulerError::TickFailed { .. }) => {}
                Err(SchedulerError::Halted { .. }) => return Ok(SimulationEndReason::Halted),
                Err(err) => return Err(err),
            }

            if self.tick_limit_reached() {
                return Ok(SimulationEndReason::MaxTicksReached);
            }
            if self.operator.is_stop_requested() || self.operator.is_halted() {
                continue;
            }
            let interval = self.config.current().tick.interval();
            self.operator.sleep(interval).await;
        }
    }

    fn tick_limit_reached(&self) -> bool {
        let max_ticks = self.config.current().tick.max_ticks;
        max_ticks > 0 && self.sim.world.tick >= max_ticks
    }

    /// Append one `tick_failed` event, advancing the clock past the failed
    /// tick if it never got started.
    fn record_failure(&mut self, tick: u64, err: &TickError) -> Result<(), TickError> {
        let mut changes = Vec::new();
        if self.sim.world.tick < tick {
            changes.push(StateChange::new(
                EntityRef::World,
                Field::Tick,
                FieldValue::Tick(self.sim.world.tick),
                FieldValue::Tick(tick),
            ));
        }
        let payload = TickFailedPayload {
            error: err.to_string(),
        };
        let draft = EventDraft::new(
            tick,
            Actor::System,
            EventCategory::TickFailed,
            serde_json::to_value(&payload)?,
        );
        tick::record(&mut self.sim.world, &self.store, draft.with_changes(changes))?;
        Ok(())
    }

    fn halt(&self, tick: u64, err: &TickError) -> SchedulerError {
        let reason = err.to_string();
        error!(tick, error = %reason, "Integrity error, halting simulation");
        self.operator.halt();
        if let Err(store_err) = self.store.halt(reason.clone()) {
            error!(error = %store_err, "Could not halt event store");
        }
        SchedulerError::Halted { reason }
    }

    fn halted_error(&self) -> SchedulerError {
        let reason = self
            .store
            .halted_reason()
            .ok()
            .flatten()
            .unwrap_or_else(|| String::from("integrity error"));
        SchedulerError::Halted { reason }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use holdfast_runner::{
        HeuristicProvider, ProviderRegistry, ReasoningProvider, SurvivalThresholds,
    };
    use holdfast_types::{AgentId, AgentState, GridSize, Position};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::SimulationConfig;

    fn make_world() -> WorldState {
        let mut world = WorldState::empty(GridSize {
            width: 5,
            height: 5,
        });
        for id in 1..=2_u64 {
            let x = u32::try_from(id).unwrap();
            let position = Position::new(x, 1);
            let agent = AgentState::new(AgentId::new(id), format!("a{id}"), position, dec!(20));
            world.agents.insert(agent.id, agent);
        }
        world
    }

    fn make_scheduler(config: SimulationConfig) -> TickScheduler {
        let provider = Arc::new(ReasoningProvider::Heuristic(HeuristicProvider::new(
            SurvivalThresholds::default(),
        )));
        let orchestrator = DecisionOrchestrator::new(ProviderRegistry::new(provider), &config);
        TickScheduler::new(
            make_world(),
            Arc::new(EventStore::in_memory()),
            orchestrator,
            ConfigHandle::new(config),
        )
        .unwrap()
    }

    fn fast_config(max_ticks: u64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.tick.interval_ms = MIN_TICK_INTERVAL_MS;
        config.tick.max_ticks = max_ticks;
        config
    }

    #[tokio::test]
    async fn advance_increments_the_tick_by_one() {
        let mut scheduler = make_scheduler(fast_config(0));
        let mut summaries = scheduler.subscribe();
        let first = scheduler.advance().await.unwrap().unwrap();
        let second = scheduler.advance().await.unwrap().unwrap();
        assert_eq!((first.tick, second.tick), (1, 2));
        assert_eq!(scheduler.world().tick, 2);
        assert_eq!(summaries.recv().await.unwrap().tick, 1);
        assert_eq!(summaries.recv().await.unwrap().tick, 2);
    }

    #[tokio::test]
    async fn advance_while_paused_is_a_no_op() {
        let mut scheduler = make_scheduler(fast_config(0));
        scheduler.pause();
        assert_eq!(scheduler.status(), SchedulerStatus::Paused);
        assert!(scheduler.advance().await.unwrap().is_none());
        assert_eq!(scheduler.world().tick, 0);
        scheduler.resume();
        assert!(scheduler.advance().await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_until_max_ticks() {
        let mut scheduler = make_scheduler(fast_config(3));
        let reason = scheduler.start().await.unwrap();
        assert_eq!(reason, SimulationEndReason::MaxTicksReached);
        assert_eq!(scheduler.world().tick, 3);
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn raising_max_ticks_lets_a_finished_run_continue() {
        let mut scheduler = make_scheduler(fast_config(2));
        assert_eq!(scheduler.start().await.unwrap(), SimulationEndReason::MaxTicksReached);
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);

        scheduler.config().reload(fast_config(4)).unwrap();
        assert_eq!(scheduler.start().await.unwrap(), SimulationEndReason::MaxTicksReached);
        assert_eq!(scheduler.world().tick, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_stop_outlasts_the_run() {
        let mut scheduler = make_scheduler(fast_config(0));
        scheduler.stop();
        assert_eq!(scheduler.start().await.unwrap(), SimulationEndReason::OperatorStop);
        assert_eq!(scheduler.start().await.unwrap(), SimulationEndReason::OperatorStop);
        assert_eq!(scheduler.world().tick, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_another_task_ends_the_loop() {
        let mut scheduler = make_scheduler(fast_config(0));
        let controls = scheduler.controls();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            controls.request_stop();
        });
        let reason = scheduler.start().await.unwrap();
        stopper.await.unwrap();
        assert_eq!(reason, SimulationEndReason::OperatorStop);
        assert!(scheduler.world().tick >= 1);
    }

    #[test]
    fn tick_interval_has_a_floor() {
        let scheduler = make_scheduler(fast_config(0));
        assert!(matches!(
            scheduler.set_tick_interval(50),
            Err(SchedulerError::Config { .. })
        ));
        assert_eq!(scheduler.set_tick_interval(500).unwrap(), MIN_TICK_INTERVAL_MS);
        assert_eq!(scheduler.config().current().tick.interval_ms, 500);
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_stream_and_clears_the_cache() {
        let mut scheduler = make_scheduler(fast_config(0));
        scheduler.advance().await.unwrap();
        let old_store = Arc::clone(scheduler.store());

        let fresh = Arc::new(EventStore::in_memory());
        scheduler.reset(make_world(), Arc::clone(&fresh)).unwrap();
        assert_eq!(scheduler.world().tick, 0);
        assert_eq!(fresh.len().unwrap(), 1);
        assert!(old_store.len().unwrap() > 1);
        assert!(scheduler.orchestrator().cache().is_empty());
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);

        // A store that already has history is refused.
        assert!(scheduler.reset(make_world(), old_store).is_err());
    }
}
