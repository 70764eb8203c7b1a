//! Precondition checks and change computation for each action.
//!
//! Handlers read the world and never mutate it. Each check runs in a
//! fixed order and the first one that fails rejects the action with a
//! [`FailureReason`]. A handler that passes every check returns the full
//! list of changes plus at most one ledger transfer.

use holdfast_ledger::{TransactionBuilder, Transfer};
use holdfast_types::{
    Account, ActionType, ActivityStatus, AgentId, AgentState, ContractId, EntityRef,
    FailureReason, Field, GAUGE_MAX, Item, MAX_QUANTITY, Position, SpawnId, TransferKind,
    VendorId, WorldState,
};
use holdfast_world::explore_target;
use rust_decimal::Decimal;

use crate::error::{ActionError, overflow};

use super::changeset::ChangeSet;
use crate::config::NeedsConfig;

use super::costs::energy_cost;

/// A handler that passed every check.
#[derive(Debug)]
pub(crate) struct Execution {
    pub(crate) summary: String,
    pub(crate) status: ActivityStatus,
    pub(crate) changes: ChangeSet,
    pub(crate) transfer: Option<Transfer>,
}

/// What a handler decided.
#[derive(Debug)]
pub(crate) enum Outcome {
    Applied(Execution),
    Rejected {
        reason: FailureReason,
        summary: String,
    },
}

type HandlerResult = Result<Outcome, ActionError>;

#[allow(clippy::unnecessary_wraps)]
fn reject(reason: FailureReason, summary: impl Into<String>) -> HandlerResult {
    Ok(Outcome::Rejected {
        reason,
        summary: summary.into(),
    })
}

#[allow(clippy::unnecessary_wraps)]
fn applied(
    summary: impl Into<String>,
    status: ActivityStatus,
    changes: ChangeSet,
    transfer: Option<Transfer>,
) -> HandlerResult {
    Ok(Outcome::Applied(Execution {
        summary: summary.into(),
        status,
        changes,
        transfer,
    }))
}

/// Energy left after paying for `action`, or `None` if the agent cannot afford it.
fn remaining_energy(agent: &AgentState, action: ActionType) -> Option<u32> {
    agent.energy.checked_sub(energy_cost(action))
}

fn valid_quantity(quantity: u32) -> bool {
    (1..=MAX_QUANTITY).contains(&quantity)
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// Step to an adjacent in-bounds cell.
pub(crate) fn execute_move(world: &WorldState, agent: &AgentState, to: Position) -> HandlerResult {
    if !world.grid.contains(to) {
        return reject(
            FailureReason::OutOfBounds,
            format!("({}, {}) is outside the grid", to.x, to.y),
        );
    }
    if !agent.position.is_adjacent(to) {
        return reject(
            FailureReason::NotAdjacent,
            format!("({}, {}) is not one step away", to.x, to.y),
        );
    }
    step(agent, to, ActionType::Move, ActivityStatus::Moving)
}

/// Step to the deterministic exploration target.
pub(crate) fn execute_explore(world: &WorldState, agent: &AgentState) -> HandlerResult {
    let Some(target) = explore_target(agent.id, world.tick, agent.position, world.grid) else {
        return reject(FailureReason::OutOfBounds, "nowhere to explore");
    };
    step(agent, target, ActionType::Explore, ActivityStatus::Exploring)
}

fn step(
    agent: &AgentState,
    to: Position,
    action: ActionType,
    status: ActivityStatus,
) -> HandlerResult {
    let Some(energy) = remaining_energy(agent, action) else {
        return reject(FailureReason::InsufficientEnergy, "too tired to move");
    };
    let entity = EntityRef::Agent(agent.id);
    let mut changes = ChangeSet::new();
    changes.position(entity, agent.position, to);
    changes.count(entity, Field::Energy, agent.energy, energy);
    applied(
        format!("{action} to ({}, {})", to.x, to.y),
        status,
        changes,
        None,
    )
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Take units from a spawn on the agent's cell.
pub(crate) fn execute_gather(
    world: &WorldState,
    agent: &AgentState,
    spawn_id: SpawnId,
    needs: &NeedsConfig,
) -> HandlerResult {
    let Some(spawn) = world.spawns.get(&spawn_id) else {
        return reject(FailureReason::InvalidTarget, format!("no spawn {spawn_id}"));
    };
    if spawn.position != agent.position {
        return reject(
            FailureReason::NotAtLocation,
            format!("spawn {spawn_id} is not here"),
        );
    }
    let Some(energy) = remaining_energy(agent, ActionType::Gather) else {
        return reject(FailureReason::InsufficientEnergy, "too tired to gather");
    };
    let taken = spawn.quantity.min(needs.gather_yield);
    if taken == 0 {
        return reject(
            FailureReason::ResourceExhausted,
            format!("spawn {spawn_id} has no {} left", spawn.item),
        );
    }
    let held = agent.holding(spawn.item);
    let Some(new_held) = held.checked_add(taken) else {
        return reject(FailureReason::InvalidQuantity, "inventory is full");
    };
    let left = spawn.quantity.saturating_sub(taken);

    let me = EntityRef::Agent(agent.id);
    let mut changes = ChangeSet::new();
    changes.count(
        EntityRef::Spawn(spawn_id),
        Field::SpawnQuantity,
        spawn.quantity,
        left,
    );
    changes.count(me, Field::Inventory(spawn.item), held, new_held);
    changes.count(me, Field::Energy, agent.energy, energy);
    applied(
        format!("gathered {taken} {}", spawn.item),
        ActivityStatus::Gathering,
        changes,
        None,
    )
}

/// Eat food from the inventory.
pub(crate) fn execute_consume(
    agent: &AgentState,
    item: Item,
    quantity: u32,
    needs: &NeedsConfig,
) -> HandlerResult {
    if !valid_quantity(quantity) {
        return reject(
            FailureReason::InvalidQuantity,
            format!("cannot consume {quantity} {item}"),
        );
    }
    if item != Item::Food {
        return reject(FailureReason::InvalidTarget, format!("{item} is not edible"));
    }
    let held = agent.holding(item);
    let Some(left) = held.checked_sub(quantity) else {
        return reject(
            FailureReason::InsufficientInventory,
            format!("holding {held} {item}, need {quantity}"),
        );
    };
    let restored = needs.food_nutrition.saturating_mul(quantity);
    let hunger = agent.hunger.saturating_add(restored).min(GAUGE_MAX);

    let me = EntityRef::Agent(agent.id);
    let mut changes = ChangeSet::new();
    changes.count(me, Field::Inventory(item), held, left);
    changes.count(me, Field::Hunger, agent.hunger, hunger);
    applied(
        format!("ate {quantity} {item}"),
        ActivityStatus::Eating,
        changes,
        None,
    )
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// Buy from a vendor on the agent's cell.
pub(crate) fn execute_buy(
    world: &WorldState,
    agent: &AgentState,
    vendor_id: VendorId,
    item: Item,
    quantity: u32,
) -> HandlerResult {
    if !valid_quantity(quantity) {
        return reject(
            FailureReason::InvalidQuantity,
            format!("cannot buy {quantity} {item}"),
        );
    }
    let Some(vendor) = world.vendors.get(&vendor_id) else {
        return reject(FailureReason::InvalidTarget, format!("no vendor {vendor_id}"));
    };
    if vendor.position != agent.position {
        return reject(
            FailureReason::NotAtLocation,
            format!("{} is not here", vendor.name),
        );
    }
    let Some(price) = vendor.prices.get(&item).copied() else {
        return reject(
            FailureReason::OutOfStock,
            format!("{} does not sell {item}", vendor.name),
        );
    };
    let stock = vendor.stock_of(item);
    let Some(stock_left) = stock.checked_sub(quantity) else {
        return reject(
            FailureReason::OutOfStock,
            format!("{} has {stock} {item}, need {quantity}", vendor.name),
        );
    };
    let Some(total) = price.checked_mul(Decimal::from(quantity)) else {
        return reject(FailureReason::InvalidQuantity, "price overflow");
    };
    if agent.balance < total {
        return reject(
            FailureReason::InsufficientFunds,
            format!("balance {} cannot cover {total}", agent.balance),
        );
    }
    let held = agent.holding(item);
    let Some(new_held) = held.checked_add(quantity) else {
        return reject(FailureReason::InvalidQuantity, "inventory is full");
    };
    let buyer_balance = agent
        .balance
        .checked_sub(total)
        .ok_or_else(|| overflow("buyer balance"))?;
    let vendor_balance = vendor
        .balance
        .checked_add(total)
        .ok_or_else(|| overflow("vendor balance"))?;

    let me = EntityRef::Agent(agent.id);
    let shop = EntityRef::Vendor(vendor_id);
    let mut changes = ChangeSet::new();
    changes.amount(me, agent.balance, buyer_balance);
    changes.amount(shop, vendor.balance, vendor_balance);
    changes.count(shop, Field::Stock(item), stock, stock_left);
    changes.count(me, Field::Inventory(item), held, new_held);

    let transfer = paid_transfer(
        world.tick,
        TransferKind::Purchase,
        Account::Agent(agent.id),
        Account::Vendor(vendor_id),
        total,
    )?;
    applied(
        format!("bought {quantity} {item} from {} for {total}", vendor.name),
        ActivityStatus::Trading,
        changes,
        transfer,
    )
}

/// Swap items with a live agent at most one step away.
pub(crate) fn execute_trade(
    world: &WorldState,
    agent: &AgentState,
    partner_id: AgentId,
    give: (Item, u32),
    receive: (Item, u32),
) -> HandlerResult {
    let (give_item, give_quantity) = give;
    let (receive_item, receive_quantity) = receive;
    if !valid_quantity(give_quantity) || !valid_quantity(receive_quantity) {
        return reject(FailureReason::InvalidQuantity, "trade quantities must be positive");
    }
    if give_item == receive_item || partner_id == agent.id {
        return reject(
            FailureReason::InvalidTarget,
            "trade must swap different items with someone else",
        );
    }
    let Some(partner) = world.agents.get(&partner_id) else {
        return reject(FailureReason::InvalidTarget, format!("no agent {partner_id}"));
    };
    if !partner.is_alive() || partner.position.distance(agent.position) > 1 {
        return reject(
            FailureReason::PartnerUnavailable,
            format!("{} cannot trade right now", partner.name),
        );
    }
    let my_give = agent.holding(give_item);
    let Some(my_give_left) = my_give.checked_sub(give_quantity) else {
        return reject(
            FailureReason::InsufficientInventory,
            format!("holding {my_give} {give_item}, offered {give_quantity}"),
        );
    };
    let their_receive = partner.holding(receive_item);
    let Some(their_receive_left) = their_receive.checked_sub(receive_quantity) else {
        return reject(
            FailureReason::InsufficientInventory,
            format!("{} holds only {their_receive} {receive_item}", partner.name),
        );
    };
    let my_receive = agent.holding(receive_item);
    let their_give = partner.holding(give_item);
    let (Some(my_receive_new), Some(their_give_new)) = (
        my_receive.checked_add(receive_quantity),
        their_give.checked_add(give_quantity),
    ) else {
        return reject(FailureReason::InvalidQuantity, "inventory is full");
    };

    let me = EntityRef::Agent(agent.id);
    let them = EntityRef::Agent(partner_id);
    let mut changes = ChangeSet::new();
    changes.count(me, Field::Inventory(give_item), my_give, my_give_left);
    changes.count(me, Field::Inventory(receive_item), my_receive, my_receive_new);
    changes.count(them, Field::Inventory(give_item), their_give, their_give_new);
    changes.count(
        them,
        Field::Inventory(receive_item),
        their_receive,
        their_receive_left,
    );
    applied(
        format!(
            "traded {give_quantity} {give_item} for {receive_quantity} {receive_item} with {}",
            partner.name
        ),
        ActivityStatus::Trading,
        changes,
        None,
    )
}

/// Work one shift of a contract and collect the wage.
pub(crate) fn execute_work(
    world: &WorldState,
    agent: &AgentState,
    contract_id: ContractId,
) -> HandlerResult {
    let Some(contract) = world.contracts.get(&contract_id) else {
        return reject(
            FailureReason::InvalidTarget,
            format!("no contract {contract_id}"),
        );
    };
    if contract.worker != agent.id || contract.completed || contract.employer == agent.id {
        return reject(
            FailureReason::ContractClosed,
            format!("contract {contract_id} is not open to this agent"),
        );
    }
    let Some(employer) = world.agents.get(&contract.employer).filter(|e| e.is_alive()) else {
        return reject(
            FailureReason::PartnerUnavailable,
            format!("employer {} is gone", contract.employer),
        );
    };
    let Some(energy) = remaining_energy(agent, ActionType::Work) else {
        return reject(FailureReason::InsufficientEnergy, "too tired to work");
    };
    if employer.balance < contract.wage {
        return reject(
            FailureReason::InsufficientFunds,
            format!("{} cannot pay {}", employer.name, contract.wage),
        );
    }
    let shifts = contract
        .shifts_completed
        .checked_add(1)
        .ok_or_else(|| overflow("contract shifts"))?;
    let employer_balance = employer
        .balance
        .checked_sub(contract.wage)
        .ok_or_else(|| overflow("employer balance"))?;
    let worker_balance = agent
        .balance
        .checked_add(contract.wage)
        .ok_or_else(|| overflow("worker balance"))?;

    let me = EntityRef::Agent(agent.id);
    let boss = EntityRef::Agent(employer.id);
    let deal = EntityRef::Contract(contract_id);
    let mut changes = ChangeSet::new();
    changes.count(me, Field::Energy, agent.energy, energy);
    changes.amount(boss, employer.balance, employer_balance);
    changes.amount(me, agent.balance, worker_balance);
    changes.count(
        deal,
        Field::ShiftsCompleted,
        contract.shifts_completed,
        shifts,
    );
    changes.flag(deal, Field::Completed, false, shifts >= contract.shifts_total);

    let transfer = paid_transfer(
        world.tick,
        TransferKind::Wage,
        Account::Agent(employer.id),
        Account::Agent(agent.id),
        contract.wage,
    )?;
    applied(
        format!(
            "worked shift {shifts}/{} for {} and earned {}",
            contract.shifts_total, employer.name, contract.wage
        ),
        ActivityStatus::Working,
        changes,
        transfer,
    )
}

/// Build a transfer unless the amount is zero.
fn paid_transfer(
    tick: u64,
    kind: TransferKind,
    from: Account,
    to: Account,
    amount: Decimal,
) -> Result<Option<Transfer>, ActionError> {
    if amount.is_zero() {
        return Ok(None);
    }
    let transfer = TransactionBuilder::new(tick, kind)
        .from(from)
        .to(to)
        .amount(amount)
        .build()?;
    Ok(Some(transfer))
}

// ---------------------------------------------------------------------------
// Rest
// ---------------------------------------------------------------------------

/// Recover energy, with a bonus in a shelter that has room.
pub(crate) fn execute_sleep(
    world: &WorldState,
    agent: &AgentState,
    needs: &NeedsConfig,
) -> HandlerResult {
    let sheltered = world.shelters.values().any(|shelter| {
        shelter.position == agent.position
            && world.live_agents_at(agent.position)
                <= usize::try_from(shelter.capacity).unwrap_or(usize::MAX)
    });
    let recovery = if sheltered {
        needs.sleep_recovery.saturating_add(needs.shelter_bonus)
    } else {
        needs.sleep_recovery
    };
    let energy = agent.energy.saturating_add(recovery).min(GAUGE_MAX);

    let mut changes = ChangeSet::new();
    changes.count(EntityRef::Agent(agent.id), Field::Energy, agent.energy, energy);
    let summary = if sheltered {
        "slept in a shelter"
    } else {
        "slept in the open"
    };
    applied(summary, ActivityStatus::Sleeping, changes, None)
}

/// Do nothing.
pub(crate) fn execute_idle() -> HandlerResult {
    applied("idled", ActivityStatus::Idle, ChangeSet::new(), None)
}
