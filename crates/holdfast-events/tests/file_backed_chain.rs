//! File-backed event streams: tamper detection and snapshot replay.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;

use holdfast_events::{
    BreakReason, ChainStatus, DirectorySnapshotStore, EventStore, EventStoreError, JsonlEventLog,
};
use holdfast_types::{
    Actor, AgentId, AgentState, EntityRef, EventCategory, EventDraft, Field, FieldValue, GridSize,
    Position, StateChange, WorldState,
};
use rust_decimal_macros::dec;

fn open(dir: &Path) -> EventStore {
    let log = JsonlEventLog::open(&dir.join("events.jsonl")).unwrap();
    let snapshots = DirectorySnapshotStore::open(&dir.join("snapshots")).unwrap();
    EventStore::open(Box::new(log), Box::new(snapshots)).unwrap()
}

fn make_world() -> WorldState {
    let mut world = WorldState::empty(GridSize {
        width: 10,
        height: 10,
    });
    let agent = AgentState::new(AgentId::new(1), "Ada", Position { x: 0, y: 0 }, dec!(100));
    world.agents.insert(agent.id, agent);
    world
}

/// One tick: advance the counter and walk the agent one cell east.
fn record_tick(store: &EventStore, world: &mut WorldState) {
    let next = world.tick.saturating_add(1);
    let started = EventDraft::new(
        next,
        Actor::System,
        EventCategory::TickStarted,
        serde_json::json!({ "tick": next }),
    )
    .with_changes(vec![StateChange::new(
        EntityRef::World,
        Field::Tick,
        FieldValue::Tick(world.tick),
        FieldValue::Tick(next),
    )]);
    holdfast_world::apply_changes(world, &started.changes).unwrap();
    store.append(started).unwrap();

    let id = AgentId::new(1);
    let from = world.agents.get(&id).unwrap().position;
    let to = Position {
        x: from.x.saturating_add(1) % 10,
        y: from.y,
    };
    let moved = EventDraft::new(
        next,
        Actor::Agent(id),
        EventCategory::ActionSucceeded,
        serde_json::json!({ "to": to }),
    )
    .with_changes(vec![StateChange::new(
        EntityRef::Agent(id),
        Field::Position,
        FieldValue::Position(from),
        FieldValue::Position(to),
    )]);
    holdfast_world::apply_changes(world, &moved.changes).unwrap();
    store.append(moved).unwrap();
}

fn rewrite_line(path: &Path, line: usize, mut edit: impl FnMut(&str) -> String) {
    let text = fs::read_to_string(path).unwrap();
    let rewritten: Vec<String> = text
        .lines()
        .enumerate()
        .map(|(index, content)| {
            if index == line {
                edit(content)
            } else {
                content.to_owned()
            }
        })
        .collect();
    fs::write(path, format!("{}\n", rewritten.join("\n"))).unwrap();
}

#[test]
fn tampered_line_in_a_thousand_event_file_is_the_first_break() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let mut world = make_world();
    store.genesis(&world).unwrap();
    while store.len().unwrap() < 1000 {
        record_tick(&store, &mut world);
    }
    let total = store.len().unwrap();
    assert!(store.verify_chain().unwrap().is_intact());
    drop(store);

    rewrite_line(&dir.path().join("events.jsonl"), 421, |line| {
        let mut event: serde_json::Value = serde_json::from_str(line).unwrap();
        if let Some(payload) = event.get_mut("payload") {
            *payload = serde_json::json!({ "forged": true });
        }
        event.to_string()
    });

    let reopened = open(dir.path());
    assert_eq!(reopened.len().unwrap(), total);
    let status = reopened.verify_chain().unwrap();
    assert!(matches!(
        status,
        ChainStatus::Broken {
            sequence: 421,
            reason: BreakReason::HashMismatch { .. }
        }
    ));
    assert!(reopened.is_halted());
}

#[test]
fn unreadable_line_is_reported_as_a_break() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let mut world = make_world();
    store.genesis(&world).unwrap();
    for _ in 0..5 {
        record_tick(&store, &mut world);
    }
    drop(store);

    rewrite_line(&dir.path().join("events.jsonl"), 3, |_| "{\"sequence\": 3".to_owned());

    let reopened = open(dir.path());
    assert!(matches!(
        reopened.verify_chain().unwrap(),
        ChainStatus::Broken {
            sequence: 3,
            reason: BreakReason::Unreadable { .. }
        }
    ));
}

#[test]
fn replay_from_directory_snapshot_matches_live_world() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let mut world = make_world();
    store.genesis(&world).unwrap();
    let mut at_twelve = None;
    for _ in 0..20 {
        record_tick(&store, &mut world);
        if world.tick % 5 == 0 {
            store.snapshot(&world).unwrap();
        }
        if world.tick == 12 {
            at_twelve = Some(world.clone());
        }
    }
    drop(store);

    let reopened = open(dir.path());
    assert_eq!(reopened.replay_range(12, 12).unwrap(), at_twelve.unwrap());
    assert_eq!(reopened.replay_range(17, 20).unwrap(), world);
    assert_eq!(reopened.replay_range(0, 20).unwrap(), world);
}

#[test]
fn halted_store_rejects_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let world = make_world();
    store.genesis(&world).unwrap();
    store.halt("operator requested").unwrap();
    assert!(matches!(
        store.snapshot(&world),
        Err(EventStoreError::Halted { .. })
    ));
}
