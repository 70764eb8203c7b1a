//! Action application: precondition checks, change computation, and
//! committing the result to the world and ledger.
//!
//! [`apply`] is pure. It evaluates one decision against the current world
//! and returns an [`ActionPlan`]: the result, the changes to make, and the
//! ledger transfer (if any). [`commit`] then writes the plan into the
//! world and ledger, or nothing at all when the action failed.
//!
//! The tick pipeline applies plans one agent at a time in ascending
//! [`AgentId`] order, each against the world as left by the agent before
//! it. That ordering is the whole contention policy: when two agents race
//! for the last unit of a spawn, the lower id wins and the other sees
//! [`FailureReason::ResourceExhausted`].
//!
//! # Submodules
//!
//! - [`costs`] -- Energy costs and item effects per action type.
//! - `handlers` -- Per-action precondition checks and change computation.
//! - `changeset` -- Change accumulation.

pub(crate) mod changeset;
pub mod costs;
mod handlers;

use holdfast_ledger::{Ledger, Transfer};
use holdfast_types::{
    Action, ActionResult, ActivityStatus, AgentId, AgentState, Decision, EntityRef,
    FailureReason, LedgerEntry, MEMORY_CAPACITY, MemoryNote, StateChange, WorldState,
};
use holdfast_world::apply_changes;

use crate::config::NeedsConfig;
use crate::error::ActionError;

use self::changeset::ChangeSet;
use self::handlers::Outcome;

/// A decision evaluated against the world, not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    /// Outcome reported to the agent.
    pub result: ActionResult,
    /// Changes to apply. Empty when the action failed.
    pub changes: Vec<StateChange>,
    /// Currency movement to post. `None` for actions that move no money.
    pub transfer: Option<Transfer>,
}

/// A committed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAction {
    /// Outcome reported to the agent.
    pub result: ActionResult,
    /// Changes written to the world.
    pub changes: Vec<StateChange>,
    /// Ledger entries written, zero or one debit/credit pair.
    pub ledger: Vec<LedgerEntry>,
}

/// Evaluate `decision` for `agent_id` against `world`.
///
/// `needs` supplies the item effects: nutrition, sleep recovery, and
/// gather yield. Precondition failures produce a failed [`ActionResult`] with no changes.
/// Successful actions also update the agent's status and append a memory
/// note. The world's current `tick` stamps the note and any transfer.
///
/// # Errors
///
/// Returns [`ActionError::AgentNotFound`] if the agent does not exist,
/// or an arithmetic error if a balance computation overflows.
pub fn apply(
    world: &WorldState,
    agent_id: AgentId,
    decision: &Decision,
    needs: &NeedsConfig,
) -> Result<ActionPlan, ActionError> {
    let agent = world
        .agents
        .get(&agent_id)
        .ok_or(ActionError::AgentNotFound(agent_id))?;
    let action_type = decision.action.action_type();

    if !agent.is_alive() {
        return Ok(rejected(
            agent_id,
            decision,
            FailureReason::AgentDead,
            format!("{} is dead", agent.name),
        ));
    }

    let outcome = match &decision.action {
        Action::Move { to } => handlers::execute_move(world, agent, *to),
        Action::Gather { spawn } => handlers::execute_gather(world, agent, *spawn, needs),
        Action::Consume { item, quantity } => {
            handlers::execute_consume(agent, *item, *quantity, needs)
        }
        Action::Buy {
            vendor,
            item,
            quantity,
        } => handlers::execute_buy(world, agent, *vendor, *item, *quantity),
        Action::Trade {
            partner,
            give,
            give_quantity,
            receive,
            receive_quantity,
        } => handlers::execute_trade(
            world,
            agent,
            *partner,
            (*give, *give_quantity),
            (*receive, *receive_quantity),
        ),
        Action::Sleep => handlers::execute_sleep(world, agent, needs),
        Action::Work { contract } => handlers::execute_work(world, agent, *contract),
        Action::Explore => handlers::execute_explore(world, agent),
        Action::Idle => handlers::execute_idle(),
    }?;

    match outcome {
        Outcome::Rejected { reason, summary } => {
            tracing::debug!(
                agent_id = %agent_id,
                action = %action_type,
                reason = ?reason,
                "Action rejected"
            );
            Ok(rejected(agent_id, decision, reason, summary))
        }
        Outcome::Applied(execution) => {
            let mut changes = execution.changes;
            finish(&mut changes, agent, world.tick, execution.status, &execution.summary);
            Ok(ActionPlan {
                result: ActionResult::succeeded(agent_id, action_type, execution.summary),
                changes: changes.into_inner(),
                transfer: execution.transfer,
            })
        }
    }
}

/// Write `plan` into the world and ledger.
///
/// Failed plans write nothing. If the ledger refuses the transfer the
/// world changes are rolled back before the error is returned.
///
/// # Errors
///
/// Returns [`ActionError::World`] if the changes no longer match the
/// world, or [`ActionError::Ledger`] if the ledger refuses the posting.
pub fn commit(
    world: &mut WorldState,
    ledger: &mut Ledger,
    plan: ActionPlan,
) -> Result<AppliedAction, ActionError> {
    let ActionPlan {
        result,
        changes,
        transfer,
    } = plan;
    if !result.success {
        return Ok(AppliedAction {
            result,
            changes: Vec::new(),
            ledger: Vec::new(),
        });
    }

    apply_changes(world, &changes)?;

    let entries = match transfer.as_ref().map(|t| ledger.post(t)).transpose() {
        Ok(pair) => pair.map(Vec::from).unwrap_or_default(),
        Err(err) => {
            revert(world, &changes);
            return Err(err.into());
        }
    };

    Ok(AppliedAction {
        result,
        changes,
        ledger: entries,
    })
}

fn rejected(
    agent_id: AgentId,
    decision: &Decision,
    reason: FailureReason,
    summary: String,
) -> ActionPlan {
    ActionPlan {
        result: ActionResult::failed(agent_id, decision.action.action_type(), reason, summary),
        changes: Vec::new(),
        transfer: None,
    }
}

/// Append the status update and memory note every successful action carries.
fn finish(
    changes: &mut ChangeSet,
    agent: &AgentState,
    tick: u64,
    status: ActivityStatus,
    summary: &str,
) {
    let entity = EntityRef::Agent(agent.id);
    changes.status(entity, agent.status, status);
    changes.memories(entity, &agent.memories, remember(&agent.memories, tick, summary));
}

/// `memories` with a new note appended, oldest notes dropped past capacity.
pub(crate) fn remember(memories: &[MemoryNote], tick: u64, summary: &str) -> Vec<MemoryNote> {
    let mut notes = memories.to_vec();
    notes.push(MemoryNote {
        tick,
        summary: summary.to_owned(),
    });
    let excess = notes.len().saturating_sub(MEMORY_CAPACITY);
    notes.drain(..excess);
    notes
}

fn revert(world: &mut WorldState, changes: &[StateChange]) {
    let inverse: Vec<StateChange> = changes.iter().rev().map(StateChange::inverted).collect();
    if let Err(err) = apply_changes(world, &inverse) {
        tracing::error!(error = %err, "Failed to roll back action after ledger refusal");
    }
}
