//! The hash-chained, append-only event store.
//!
//! One [`EventStore`] owns one stream. Sequence assignment, hashing, and the
//! backend write happen under a single lock, so concurrent callers see a
//! strictly ordered chain. Once a break is detected the store halts and
//! refuses every further append or snapshot.

use std::sync::{Mutex, MutexGuard};

use holdfast_types::{Actor, Event, EventCategory, EventDraft, WorldState};
use holdfast_world::apply_changes;

use crate::chain::{BreakReason, ChainStatus, ChainVerifier, GENESIS_PREV_HASH, seal};
use crate::error::{EventStoreError, PersistenceError};
use crate::persistence::{EventLog, MemoryEventLog, MemorySnapshotStore, SnapshotStore};
use crate::snapshot::Snapshot;

/// Events read from the backend per batch during scans.
const READ_BATCH: u64 = 512;

struct Inner {
    log: Box<dyn EventLog>,
    snapshots: Box<dyn SnapshotStore>,
    next_sequence: u64,
    last_hash: String,
    halted: Option<String>,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), EventStoreError> {
        match &self.halted {
            Some(reason) => Err(EventStoreError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn halt(&mut self, reason: String) {
        if self.halted.is_none() {
            tracing::error!(reason = %reason, "event store halted");
            self.halted = Some(reason);
        }
    }

    fn write(&mut self, draft: EventDraft) -> Result<Event, EventStoreError> {
        self.ensure_open()?;
        let sequence = self.next_sequence;
        let next = sequence
            .checked_add(1)
            .ok_or(EventStoreError::SequenceOverflow)?;
        let event = seal(draft, sequence, &self.last_hash)?;
        self.log.append(&event)?;
        self.next_sequence = next;
        self.last_hash.clone_from(&event.hash);
        tracing::debug!(
            sequence,
            tick = event.tick,
            category = ?event.category,
            "event appended"
        );
        Ok(event)
    }

    /// Visit events from `start` to the end of the log in batches.
    ///
    /// Stops early when `visit` returns `false`. An undecodable record is
    /// reported as [`PersistenceError::Corrupt`] after every readable event
    /// before it has been visited.
    fn scan<F>(&self, start: u64, mut visit: F) -> Result<(), EventStoreError>
    where
        F: FnMut(&Event) -> Result<bool, EventStoreError>,
    {
        let len = self.log.len()?;
        let mut from = start;
        while from < len {
            let to = from.saturating_add(READ_BATCH).saturating_sub(1).min(len.saturating_sub(1));
            let (batch, corrupt) = match self.log.read_range(from, to) {
                Ok(batch) => (batch, None),
                Err(PersistenceError::Corrupt { position, detail }) => {
                    let readable = match position.checked_sub(1) {
                        Some(last) if position > from => self.log.read_range(from, last)?,
                        _ => Vec::new(),
                    };
                    (readable, Some(PersistenceError::Corrupt { position, detail }))
                }
                Err(other) => return Err(other.into()),
            };
            for event in &batch {
                if !visit(event)? {
                    return Ok(());
                }
            }
            if let Some(err) = corrupt {
                return Err(err.into());
            }
            if batch.is_empty() {
                break;
            }
            from = to.saturating_add(1);
        }
        Ok(())
    }
}

/// Append-only, hash-chained event stream with snapshots and replay.
pub struct EventStore {
    inner: Mutex<Inner>,
}

impl core::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventStore").finish_non_exhaustive()
    }
}

impl EventStore {
    /// Open a store over existing backends.
    ///
    /// The sequence counter and head hash are recovered from the last
    /// record. The chain itself is not verified; call
    /// [`verify_chain`](Self::verify_chain) for that.
    pub fn open(
        log: Box<dyn EventLog>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> Result<Self, EventStoreError> {
        let (next_sequence, last_hash) = match log.last()? {
            Some(event) => (
                event
                    .sequence
                    .checked_add(1)
                    .ok_or(EventStoreError::SequenceOverflow)?,
                event.hash,
            ),
            None => (0, GENESIS_PREV_HASH.to_owned()),
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                log,
                snapshots,
                next_sequence,
                last_hash,
                halted: None,
            }),
        })
    }

    /// A fresh store backed by memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                log: Box::new(MemoryEventLog::new()),
                snapshots: Box::new(MemorySnapshotStore::new()),
                next_sequence: 0,
                last_hash: GENESIS_PREV_HASH.to_owned(),
                halted: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, EventStoreError> {
        let Ok(inner) = self.inner.lock() else {
            return Err(EventStoreError::Poisoned);
        };
        Ok(inner)
    }

    /// Append the genesis event carrying the initial world.
    pub fn genesis(&self, world: &WorldState) -> Result<Event, EventStoreError> {
        let mut inner = self.lock()?;
        if inner.next_sequence != 0 {
            return Err(EventStoreError::AlreadyInitialized {
                events: inner.next_sequence,
            });
        }
        let payload = serde_json::to_value(world)?;
        let draft = EventDraft::new(world.tick, Actor::System, EventCategory::Genesis, payload);
        let event = inner.write(draft)?;
        tracing::info!(tick = world.tick, hash = %event.hash, "event stream started");
        Ok(event)
    }

    /// Assign the next sequence, chain, and persist `draft`.
    pub fn append(&self, draft: EventDraft) -> Result<Event, EventStoreError> {
        let mut inner = self.lock()?;
        if inner.next_sequence == 0 {
            return Err(EventStoreError::NoBaseState);
        }
        inner.write(draft)
    }

    /// Recompute every hash and link from genesis.
    ///
    /// Returns the first broken link. A break halts the store.
    pub fn verify_chain(&self) -> Result<ChainStatus, EventStoreError> {
        let mut inner = self.lock()?;
        let mut verifier = ChainVerifier::from_genesis();
        let mut broken: Option<(u64, BreakReason)> = None;
        let scanned = inner.scan(0, |event| match verifier.check(event) {
            Ok(()) => Ok(true),
            Err(reason) => {
                broken = Some((event.sequence, reason));
                Ok(false)
            }
        });
        match scanned {
            Ok(()) => {}
            Err(EventStoreError::Persistence {
                source: PersistenceError::Corrupt { position, detail },
            }) => {
                if broken.is_none() {
                    broken = Some((position, BreakReason::Unreadable { detail }));
                }
            }
            Err(other) => return Err(other),
        }

        if broken.is_none() && verifier.next_sequence() != inner.next_sequence {
            broken = Some((
                verifier.next_sequence(),
                BreakReason::SequenceGap {
                    expected: inner.next_sequence,
                    found: verifier.next_sequence(),
                },
            ));
        }

        match broken {
            Some((sequence, reason)) => {
                inner.halt(format!("chain broken at sequence {sequence}: {reason}"));
                Ok(ChainStatus::Broken { sequence, reason })
            }
            None => Ok(ChainStatus::Intact {
                events: verifier.next_sequence(),
            }),
        }
    }

    /// Persist a snapshot of `world` at the current head of the chain.
    ///
    /// `world` must reflect every event appended so far.
    pub fn snapshot(&self, world: &WorldState) -> Result<Snapshot, EventStoreError> {
        let mut inner = self.lock()?;
        inner.ensure_open()?;
        let sequence = inner
            .next_sequence
            .checked_sub(1)
            .ok_or(EventStoreError::NoBaseState)?;
        let snapshot = Snapshot::capture(world, sequence, inner.last_hash.clone())?;
        inner.snapshots.save(&snapshot)?;
        tracing::info!(tick = snapshot.tick, sequence, "snapshot saved");
        Ok(snapshot)
    }

    /// Reconstruct the world as of the end of tick `to`.
    ///
    /// Folding starts from the latest snapshot at or before `from`, or
    /// from genesis when there is none. Every folded event is verified
    /// against the chain; a mismatch halts the store.
    pub fn replay_range(&self, from: u64, to: u64) -> Result<WorldState, EventStoreError> {
        if from > to {
            return Err(EventStoreError::InvalidRange { from, to });
        }
        let mut inner = self.lock()?;
        let (mut world, mut verifier) = match inner.snapshots.latest_at_or_before(from)? {
            Some(snapshot) => {
                if !snapshot.is_consistent() {
                    let reason = format!("snapshot at tick {} fails its world hash", snapshot.tick);
                    inner.halt(reason.clone());
                    return Err(EventStoreError::Integrity {
                        sequence: snapshot.sequence,
                        reason,
                    });
                }
                tracing::debug!(
                    tick = snapshot.tick,
                    sequence = snapshot.sequence,
                    "replay from snapshot"
                );
                let resume = snapshot
                    .sequence
                    .checked_add(1)
                    .ok_or(EventStoreError::SequenceOverflow)?;
                (snapshot.world, ChainVerifier::resume(resume, snapshot.event_hash))
            }
            None => {
                let genesis = inner
                    .log
                    .read_range(0, 0)?
                    .pop()
                    .ok_or(EventStoreError::NoBaseState)?;
                if genesis.category != EventCategory::Genesis {
                    return Err(EventStoreError::NoBaseState);
                }
                let mut verifier = ChainVerifier::from_genesis();
                if let Err(reason) = verifier.check(&genesis) {
                    let message = reason.to_string();
                    inner.halt(format!("chain broken at sequence 0: {message}"));
                    return Err(EventStoreError::Integrity {
                        sequence: 0,
                        reason: message,
                    });
                }
                let world: WorldState = serde_json::from_value(genesis.payload)?;
                tracing::debug!(tick = world.tick, "replay from genesis");
                (world, verifier)
            }
        };

        let mut failure: Option<EventStoreError> = None;
        inner.scan(verifier.next_sequence(), |event| {
            if event.tick > to {
                return Ok(false);
            }
            if let Err(reason) = verifier.check(event) {
                failure = Some(EventStoreError::Integrity {
                    sequence: event.sequence,
                    reason: reason.to_string(),
                });
                return Ok(false);
            }
            apply_changes(&mut world, &event.changes).map_err(|source| {
                EventStoreError::Replay {
                    sequence: event.sequence,
                    source: Box::new(source),
                }
            })?;
            Ok(true)
        })?;

        if let Some(err) = failure {
            inner.halt(err.to_string());
            return Err(err);
        }
        Ok(world)
    }

    /// Reconstruct the world as of the end of `tick`.
    pub fn world_at(&self, tick: u64) -> Result<WorldState, EventStoreError> {
        self.replay_range(tick, tick)
    }

    /// All events recorded for `tick`, in sequence order.
    pub fn events_for_tick(&self, tick: u64) -> Result<Vec<Event>, EventStoreError> {
        let inner = self.lock()?;
        let mut found = Vec::new();
        inner.scan(0, |event| {
            if event.tick > tick {
                return Ok(false);
            }
            if event.tick == tick {
                found.push(event.clone());
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// Events with sequence in `from..=to`.
    pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<Event>, EventStoreError> {
        Ok(self.lock()?.log.read_range(from, to)?)
    }

    /// The most recent event.
    pub fn last_event(&self) -> Result<Option<Event>, EventStoreError> {
        Ok(self.lock()?.log.last()?)
    }

    /// Hash of the most recent event, or the genesis sentinel when empty.
    pub fn latest_hash(&self) -> Result<String, EventStoreError> {
        Ok(self.lock()?.last_hash.clone())
    }

    /// Number of events appended.
    pub fn len(&self) -> Result<u64, EventStoreError> {
        Ok(self.lock()?.next_sequence)
    }

    /// Whether no event has been appended.
    pub fn is_empty(&self) -> Result<bool, EventStoreError> {
        Ok(self.len()? == 0)
    }

    /// Why the store halted, if it has.
    pub fn halted_reason(&self) -> Result<Option<String>, EventStoreError> {
        Ok(self.lock()?.halted.clone())
    }

    /// Whether the store refuses appends.
    pub fn is_halted(&self) -> bool {
        self.inner
            .lock()
            .map_or(true, |inner| inner.halted.is_some())
    }

    /// Stop accepting appends. The first reason wins.
    pub fn halt(&self, reason: impl Into<String>) -> Result<(), EventStoreError> {
        self.lock()?.halt(reason.into());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use holdfast_types::{EntityRef, Field, FieldValue, GridSize, StateChange};

    use super::*;

    fn world() -> WorldState {
        WorldState::empty(GridSize {
            width: 8,
            height: 8,
        })
    }

    fn tick_draft(from: u64, to: u64) -> EventDraft {
        EventDraft::new(
            to,
            Actor::System,
            EventCategory::TickStarted,
            serde_json::json!({ "tick": to }),
        )
        .with_changes(vec![StateChange::new(
            EntityRef::World,
            Field::Tick,
            FieldValue::Tick(from),
            FieldValue::Tick(to),
        )])
    }

    fn shared_store() -> (EventStore, MemoryEventLog) {
        let log = MemoryEventLog::new();
        let store = EventStore::open(
            Box::new(log.clone()),
            Box::new(MemorySnapshotStore::new()),
        )
        .unwrap();
        (store, log)
    }

    #[test]
    fn appends_chain_onto_previous_hash() {
        let store = EventStore::in_memory();
        let genesis = store.genesis(&world()).unwrap();
        assert_eq!(genesis.sequence, 0);
        assert_eq!(genesis.prev_hash, GENESIS_PREV_HASH);

        let next = store.append(tick_draft(0, 1)).unwrap();
        assert_eq!(next.sequence, 1);
        assert_eq!(next.prev_hash, genesis.hash);
        assert_eq!(store.latest_hash().unwrap(), next.hash);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn append_before_genesis_is_rejected() {
        let store = EventStore::in_memory();
        assert!(matches!(
            store.append(tick_draft(0, 1)),
            Err(EventStoreError::NoBaseState)
        ));
    }

    #[test]
    fn second_genesis_is_rejected() {
        let store = EventStore::in_memory();
        store.genesis(&world()).unwrap();
        assert!(matches!(
            store.genesis(&world()),
            Err(EventStoreError::AlreadyInitialized { events: 1 })
        ));
    }

    #[test]
    fn intact_chain_verifies() {
        let store = EventStore::in_memory();
        store.genesis(&world()).unwrap();
        for tick in 1..=3_u64 {
            store.append(tick_draft(tick.saturating_sub(1), tick)).unwrap();
        }
        assert_eq!(store.verify_chain().unwrap(), ChainStatus::Intact { events: 4 });
        assert!(!store.is_halted());
    }

    #[test]
    fn corrupted_payload_in_a_thousand_events_is_located_and_halts() {
        let (store, log) = shared_store();
        store.genesis(&world()).unwrap();
        for tick in 1..1000_u64 {
            store.append(tick_draft(tick.saturating_sub(1), tick)).unwrap();
        }
        assert_eq!(store.len().unwrap(), 1000);

        log.edit(|events| {
            if let Some(event) = events.get_mut(637) {
                event.payload = serde_json::json!({ "tick": 1 });
            }
        });

        let status = store.verify_chain().unwrap();
        assert!(!status.is_intact());
        assert!(matches!(
            status,
            ChainStatus::Broken {
                sequence: 637,
                reason: BreakReason::HashMismatch { .. }
            }
        ));
        assert!(store.is_halted());
        assert!(matches!(
            store.append(tick_draft(999, 1000)),
            Err(EventStoreError::Halted { .. })
        ));
    }

    #[test]
    fn replay_folds_changes_from_genesis() {
        let store = EventStore::in_memory();
        store.genesis(&world()).unwrap();
        for tick in 1..=5_u64 {
            store.append(tick_draft(tick.saturating_sub(1), tick)).unwrap();
        }
        assert_eq!(store.world_at(3).unwrap().tick, 3);
        assert_eq!(store.replay_range(0, 5).unwrap().tick, 5);
    }

    #[test]
    fn replay_starts_from_the_nearest_snapshot() {
        let (store, log) = shared_store();
        let mut live = world();
        store.genesis(&live).unwrap();
        for tick in 1..=6_u64 {
            let draft = tick_draft(live.tick, tick);
            apply_changes(&mut live, &draft.changes).unwrap();
            store.append(draft).unwrap();
            if tick == 4 {
                store.snapshot(&live).unwrap();
            }
        }

        // Events before the snapshot are no longer needed to reach tick 6.
        log.edit(|events| {
            if let Some(event) = events.get_mut(2) {
                event.payload = serde_json::json!("tampered");
            }
        });

        assert_eq!(store.replay_range(5, 6).unwrap(), live);
        assert!(!store.is_halted());
        assert!(matches!(
            store.replay_range(1, 6),
            Err(EventStoreError::Integrity { sequence: 2, .. })
        ));
        assert!(store.is_halted());
    }

    #[test]
    fn reversed_range_is_rejected() {
        let store = EventStore::in_memory();
        store.genesis(&world()).unwrap();
        assert!(matches!(
            store.replay_range(4, 2),
            Err(EventStoreError::InvalidRange { from: 4, to: 2 })
        ));
    }

    #[test]
    fn events_for_tick_filters_by_tick() {
        let store = EventStore::in_memory();
        store.genesis(&world()).unwrap();
        store.append(tick_draft(0, 1)).unwrap();
        store
            .append(EventDraft::new(
                1,
                Actor::System,
                EventCategory::ResourcesRegenerated,
                serde_json::json!({}),
            ))
            .unwrap();
        store.append(tick_draft(1, 2)).unwrap();

        let tick_one = store.events_for_tick(1).unwrap();
        assert_eq!(
            tick_one.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn reopening_resumes_sequence_and_head() {
        let log = MemoryEventLog::new();
        let first = EventStore::open(Box::new(log.clone()), Box::new(MemorySnapshotStore::new()))
            .unwrap();
        first.genesis(&world()).unwrap();
        let head = first.append(tick_draft(0, 1)).unwrap();
        drop(first);

        let reopened =
            EventStore::open(Box::new(log), Box::new(MemorySnapshotStore::new())).unwrap();
        assert_eq!(reopened.len().unwrap(), 2);
        assert_eq!(reopened.latest_hash().unwrap(), head.hash);
        let next = reopened.append(tick_draft(1, 2)).unwrap();
        assert_eq!(next.prev_hash, head.hash);
        assert!(reopened.verify_chain().unwrap().is_intact());
    }
}
