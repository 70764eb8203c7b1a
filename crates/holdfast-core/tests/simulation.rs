//! End-to-end checks of the tick loop against an in-memory event store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use holdfast_core::{
    CacheStatus, ConfigError, ConfigHandle, DecisionOrchestrator, SchedulerError,
    SchedulerStatus, SimulationConfig, TickScheduler,
};
use holdfast_events::EventStore;
use holdfast_runner::{
    ProviderError, ProviderRegistry, ReasoningProvider, ScriptedProvider, ScriptedReply,
    render_decision,
};
use holdfast_types::{
    Account, Action, AgentId, AgentState, Decision, EntrySide, EventCategory, FailureReason,
    GridSize, Item, Position, ResourceSpawn, SpawnId, Vendor, VendorId, WorldState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_agent(id: u64, position: Position) -> AgentState {
    AgentState::new(AgentId::new(id), format!("agent-{id}"), position, dec!(100))
}

fn make_world(agents: &[(u64, Position)]) -> WorldState {
    let mut world = WorldState::empty(GridSize {
        width: 8,
        height: 8,
    });
    for &(id, position) in agents {
        let agent = make_agent(id, position);
        world.agents.insert(agent.id, agent);
    }
    world
}

fn make_vendor(position: Position, balance: Decimal) -> Vendor {
    Vendor {
        id: VendorId::new(1),
        name: String::from("market"),
        position,
        prices: [(Item::Food, dec!(5))].into_iter().collect(),
        stock: [(Item::Food, 10)].into_iter().collect(),
        balance,
    }
}

fn reply(action: Action) -> ScriptedReply {
    ScriptedReply::Text(render_decision(&Decision::new(action, "scripted")).unwrap())
}

fn scripted(
    id: &str,
    replies: impl IntoIterator<Item = ScriptedReply>,
) -> Arc<ReasoningProvider> {
    Arc::new(ReasoningProvider::Scripted(ScriptedProvider::with_replies(id, replies)))
}

fn calls(provider: &ReasoningProvider) -> u64 {
    match provider {
        ReasoningProvider::Scripted(scripted) => scripted.calls(),
        _ => 0,
    }
}

fn uncached_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.decision.cache_capacity = 0;
    config
}

fn make_scheduler(
    world: WorldState,
    registry: ProviderRegistry,
    config: SimulationConfig,
) -> TickScheduler {
    let orchestrator = DecisionOrchestrator::new(registry, &config);
    TickScheduler::new(
        world,
        Arc::new(EventStore::in_memory()),
        orchestrator,
        ConfigHandle::new(config),
    )
    .unwrap()
}

fn per_agent(bindings: Vec<(u64, Arc<ReasoningProvider>)>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(scripted("idle", []));
    for (id, provider) in bindings {
        registry.bind(AgentId::new(id), provider);
    }
    registry
}

// ---------------------------------------------------------------------------
// Determinism and replay
// ---------------------------------------------------------------------------

async fn scripted_run() -> (WorldState, String) {
    let world = make_world(&[(1, Position::new(1, 1)), (2, Position::new(5, 5))]);
    let registry = per_agent(vec![
        (
            1,
            scripted(
                "north",
                [
                    reply(Action::Move {
                        to: Position::new(1, 2),
                    }),
                    reply(Action::Explore),
                    reply(Action::Sleep),
                ],
            ),
        ),
        (
            2,
            scripted(
                "south",
                [
                    reply(Action::Explore),
                    ScriptedReply::Text(String::from("not a decision")),
                    reply(Action::Idle),
                ],
            ),
        ),
    ]);
    let mut scheduler = make_scheduler(world, registry, uncached_config());
    for _ in 0..4 {
        scheduler.advance().await.unwrap();
    }
    let hash = scheduler.store().latest_hash().unwrap();
    (scheduler.world().clone(), hash)
}

#[tokio::test]
async fn identical_runs_produce_identical_worlds_and_chains() {
    let (first_world, first_hash) = scripted_run().await;
    let (second_world, second_hash) = scripted_run().await;
    assert_eq!(first_world, second_world);
    assert_eq!(first_hash, second_hash);
}

#[tokio::test]
async fn replay_from_genesis_matches_the_live_world() {
    let world = make_world(&[(1, Position::new(3, 3))]);
    let registry = per_agent(vec![(1, scripted("p", [reply(Action::Explore)]))]);
    let mut scheduler = make_scheduler(world, registry, uncached_config());
    for _ in 0..3 {
        scheduler.advance().await.unwrap();
    }
    let store = scheduler.store();
    assert!(store.verify_chain().unwrap().is_intact());
    assert_eq!(&store.world_at(3).unwrap(), scheduler.world());
}

#[tokio::test]
async fn replay_range_starts_from_a_snapshot() {
    let world = make_world(&[(1, Position::new(3, 3))]);
    let registry = per_agent(vec![(1, scripted("p", []))]);
    let mut config = uncached_config();
    config.tick.snapshot_interval_ticks = 2;
    let mut scheduler = make_scheduler(world, registry, config);
    for _ in 0..5 {
        scheduler.advance().await.unwrap();
    }
    let replayed = scheduler.store().replay_range(4, 5).unwrap();
    assert_eq!(&replayed, scheduler.world());
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn identical_observations_share_one_provider_call() {
    let provider = scripted(
        "shared",
        [ScriptedReply::Delayed {
            delay: Duration::from_millis(200),
            text: render_decision(&Decision::new(Action::Sleep, "tired")).unwrap(),
        }],
    );
    let config = SimulationConfig::default();
    let orchestrator =
        DecisionOrchestrator::new(ProviderRegistry::new(Arc::clone(&provider)), &config);

    let west = make_world(&[(1, Position::new(2, 2))]);
    let east = make_world(&[(2, Position::new(2, 2))]);
    let (first, second) = tokio::join!(
        orchestrator.decide(AgentId::new(1), &west, 1),
        orchestrator.decide(AgentId::new(2), &east, 1),
    );

    assert_eq!(calls(&provider), 1);
    assert_eq!(first.decision, second.decision);
    assert_eq!(first.decision.action, Action::Sleep);
    let statuses = [first.cache_status, second.cache_status];
    assert!(statuses.contains(&CacheStatus::Computed));
    assert!(statuses.contains(&CacheStatus::Coalesced));
}

#[tokio::test]
async fn failed_provider_calls_never_reach_the_cache() {
    let world = make_world(&[(1, Position::new(1, 1)), (2, Position::new(6, 6))]);
    let failing = scripted(
        "broken",
        [
            ScriptedReply::Fail(ProviderError::Status {
                provider: String::from("broken"),
                status: 401,
                body: String::from("unauthorized"),
            }),
            ScriptedReply::Text(String::from("{\"action\":")),
        ],
    );
    let registry = ProviderRegistry::new(failing);
    let mut scheduler = make_scheduler(world, registry, SimulationConfig::default());
    for _ in 0..2 {
        let summary = scheduler.advance().await.unwrap().unwrap();
        assert_eq!(summary.fallbacks, 2);
    }
    assert!(scheduler.orchestrator().cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_hung_provider_does_not_stall_the_tick() {
    let world = make_world(&[(1, Position::new(1, 1))]);
    let hung = scripted(
        "hung",
        [ScriptedReply::Delayed {
            delay: Duration::from_secs(24 * 3600),
            text: String::from("{}"),
        }],
    );
    let mut config = uncached_config();
    config.decision.provider_timeout_ms = 30_000;
    let mut scheduler = make_scheduler(world, ProviderRegistry::new(hung), config);

    let started = tokio::time::Instant::now();
    let summary = scheduler.advance().await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(summary.fallbacks, 1);
    assert!(summary.results.values().all(|report| report.used_fallback));
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn lower_id_wins_contention_regardless_of_response_order() {
    let spot = Position::new(4, 4);
    let mut world = make_world(&[(1, spot), (2, spot)]);
    let spawn = ResourceSpawn {
        id: SpawnId::new(1),
        item: Item::Wood,
        position: spot,
        quantity: 1,
        max_quantity: 3,
        regen_per_tick: 0,
    };
    world.spawns.insert(spawn.id, spawn);

    let gather = render_decision(&Decision::new(
        Action::Gather {
            spawn: SpawnId::new(1),
        },
        "wood",
    ))
    .unwrap();
    let registry = per_agent(vec![
        (
            1,
            scripted(
                "slow",
                [ScriptedReply::Delayed {
                    delay: Duration::from_millis(500),
                    text: gather.clone(),
                }],
            ),
        ),
        (2, scripted("fast", [ScriptedReply::Text(gather)])),
    ]);
    let mut scheduler = make_scheduler(world, registry, uncached_config());
    let summary = scheduler.advance().await.unwrap().unwrap();

    let first = &summary.results.get(&AgentId::new(1)).unwrap().result;
    let second = &summary.results.get(&AgentId::new(2)).unwrap().result;
    assert!(first.success);
    assert!(!second.success);
    assert_eq!(second.reason, Some(FailureReason::ResourceExhausted));
    let agent = scheduler.world().agents.get(&AgentId::new(1)).unwrap();
    assert_eq!(agent.holding(Item::Wood), 1);
}

#[tokio::test]
async fn hungry_agent_at_a_vendor_buys_food_when_the_provider_fails() {
    let spot = Position::new(2, 2);
    let mut world = make_world(&[(1, spot)]);
    if let Some(agent) = world.agents.get_mut(&AgentId::new(1)) {
        agent.hunger = 15;
    }
    let vendor = make_vendor(spot, dec!(0));
    world.vendors.insert(vendor.id, vendor);

    let failing = scripted(
        "down",
        [ScriptedReply::Fail(ProviderError::Status {
            provider: String::from("down"),
            status: 400,
            body: String::from("bad request"),
        })],
    );
    let mut scheduler = make_scheduler(world, ProviderRegistry::new(failing), uncached_config());
    let summary = scheduler.advance().await.unwrap().unwrap();

    let report = summary.results.get(&AgentId::new(1)).unwrap();
    assert!(report.used_fallback);
    assert!(report.result.success);
    let agent = scheduler.world().agents.get(&AgentId::new(1)).unwrap();
    assert_eq!(agent.balance, dec!(95));
    assert_eq!(agent.holding(Item::Food), 1);
    let vendor = scheduler.world().vendors.get(&VendorId::new(1)).unwrap();
    assert_eq!(vendor.balance, dec!(5));

    let entries = scheduler.ledger().entries_for_tick(1);
    assert_eq!(entries.len(), 2);
    let debit = entries.iter().find(|e| e.side == EntrySide::Debit).unwrap();
    let credit = entries.iter().find(|e| e.side == EntrySide::Credit).unwrap();
    assert_eq!(debit.account, Account::Agent(AgentId::new(1)));
    assert_eq!(credit.account, Account::Vendor(VendorId::new(1)));
    assert_eq!(debit.amount, credit.amount);
    assert_eq!(debit.transaction_id, credit.transaction_id);
}

// ---------------------------------------------------------------------------
// Failure handling and configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_tick_is_recorded_once_and_the_next_tick_proceeds() {
    let spot = Position::new(2, 2);
    let mut world = make_world(&[(1, spot)]);
    let vendor = make_vendor(spot, Decimal::MAX);
    world.vendors.insert(vendor.id, vendor);

    let buy = Action::Buy {
        vendor: VendorId::new(1),
        item: Item::Food,
        quantity: 1,
    };
    let provider = scripted("p", [reply(buy), reply(Action::Idle)]);
    let mut scheduler = make_scheduler(world, ProviderRegistry::new(provider), uncached_config());

    let err = scheduler.advance().await.unwrap_err();
    assert!(matches!(err, SchedulerError::TickFailed { tick: 1, .. }));
    assert_eq!(scheduler.status(), SchedulerStatus::Idle);

    let failed: Vec<_> = scheduler
        .store()
        .events_for_tick(1)
        .unwrap()
        .into_iter()
        .filter(|event| event.category == EventCategory::TickFailed)
        .collect();
    assert_eq!(failed.len(), 1);

    let summary = scheduler.advance().await.unwrap().unwrap();
    assert_eq!(summary.tick, 2);
    assert_eq!(scheduler.world().tick, 2);
    assert!(scheduler.store().verify_chain().unwrap().is_intact());
}

#[tokio::test]
async fn reload_rejects_grid_changes_and_applies_the_rest_next_tick() {
    let world = make_world(&[(1, Position::new(1, 1))]);
    let provider = scripted("p", [reply(Action::Idle), reply(Action::Idle)]);
    let mut scheduler = make_scheduler(world, ProviderRegistry::new(provider), uncached_config());

    scheduler.advance().await.unwrap();
    let hunger_after_one = scheduler.world().agents.get(&AgentId::new(1)).unwrap().hunger;

    let mut resized = scheduler.config().current().as_ref().clone();
    resized.world.width = 40;
    assert!(matches!(
        scheduler.config().reload(resized),
        Err(ConfigError::ImmutableField { .. })
    ));

    let mut hungrier = scheduler.config().current().as_ref().clone();
    hungrier.needs.hunger_decay = 10;
    scheduler.config().reload(hungrier).unwrap();

    scheduler.advance().await.unwrap();
    let hunger_after_two = scheduler.world().agents.get(&AgentId::new(1)).unwrap().hunger;
    assert_eq!(hunger_after_one.saturating_sub(hunger_after_two), 10);
    assert_eq!(scheduler.world().grid.width, 8);
}
