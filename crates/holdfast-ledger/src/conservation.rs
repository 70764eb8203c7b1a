//! Conservation law verification.
//!
//! Two checks run at the end of every tick:
//!
//! 1. Each transaction consists of exactly one debit and one credit of
//!    equal amount.
//! 2. Each account's net ledger flow for the tick equals the observed
//!    change in its balance. A balance that moved without a ledger row,
//!    or a row whose amount never reached the world, is an anomaly.

use std::collections::{BTreeMap, BTreeSet};

use holdfast_types::{Account, EntrySide, LedgerEntry, TransactionId, WorldState};
use rust_decimal::Decimal;

use crate::LedgerAnomaly;

/// The result of a conservation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// Everything balanced.
    Balanced,
    /// Something did not.
    Anomaly(LedgerAnomaly),
}

#[derive(Default)]
struct Sides {
    debits: Decimal,
    credits: Decimal,
    debit_rows: u32,
    credit_rows: u32,
}

/// Check that every transaction among `entries` balances.
pub fn verify_transactions(entries: &[LedgerEntry]) -> ConservationResult {
    let mut by_transaction: BTreeMap<TransactionId, Sides> = BTreeMap::new();
    let mut overflowed: BTreeSet<TransactionId> = BTreeSet::new();

    for entry in entries {
        let sides = by_transaction.entry(entry.transaction_id).or_default();
        let (total, rows) = match entry.side {
            EntrySide::Debit => (&mut sides.debits, &mut sides.debit_rows),
            EntrySide::Credit => (&mut sides.credits, &mut sides.credit_rows),
        };
        match total.checked_add(entry.amount) {
            Some(sum) => *total = sum,
            None => {
                overflowed.insert(entry.transaction_id);
            }
        }
        *rows = rows.saturating_add(1);
    }

    let unbalanced: Vec<TransactionId> = by_transaction
        .iter()
        .filter(|(id, sides)| {
            overflowed.contains(id)
                || sides.debits != sides.credits
                || sides.debit_rows != 1
                || sides.credit_rows != 1
        })
        .map(|(id, _)| *id)
        .collect();

    if unbalanced.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = unbalanced.len();
        ConservationResult::Anomaly(LedgerAnomaly {
            tick: None,
            transactions: unbalanced,
            accounts: Vec::new(),
            message: format!("LEDGER_ANOMALY: {count} unbalanced transaction(s)"),
        })
    }
}

/// Net flow per account: credits add, debits subtract.
///
/// Returns `None` on overflow.
pub fn net_flows<'a>(
    entries: impl Iterator<Item = &'a LedgerEntry>,
) -> Option<BTreeMap<Account, Decimal>> {
    let mut flows: BTreeMap<Account, Decimal> = BTreeMap::new();
    for entry in entries {
        let slot = flows.entry(entry.account).or_insert(Decimal::ZERO);
        *slot = match entry.side {
            EntrySide::Credit => slot.checked_add(entry.amount)?,
            EntrySide::Debit => slot.checked_sub(entry.amount)?,
        };
    }
    Some(flows)
}

/// Compare ledger flows against observed balance deltas.
pub fn verify_flows(
    tick: u64,
    entries: &[LedgerEntry],
    balance_deltas: &BTreeMap<Account, Decimal>,
) -> ConservationResult {
    let Some(flows) = net_flows(entries.iter()) else {
        return ConservationResult::Anomaly(LedgerAnomaly {
            tick: Some(tick),
            transactions: Vec::new(),
            accounts: Vec::new(),
            message: format!("LEDGER_ANOMALY at tick {tick}: overflow summing flows"),
        });
    };

    let accounts: BTreeSet<Account> = flows.keys().chain(balance_deltas.keys()).copied().collect();
    let mismatched: Vec<Account> = accounts
        .into_iter()
        .filter(|account| {
            let flow = flows.get(account).copied().unwrap_or(Decimal::ZERO);
            let delta = balance_deltas.get(account).copied().unwrap_or(Decimal::ZERO);
            flow != delta
        })
        .collect();

    if mismatched.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = mismatched.len();
        ConservationResult::Anomaly(LedgerAnomaly {
            tick: Some(tick),
            transactions: Vec::new(),
            accounts: mismatched,
            message: format!(
                "LEDGER_ANOMALY at tick {tick}: {count} account(s) changed balance \
                 without matching ledger rows"
            ),
        })
    }
}

/// Every account's balance in `world`.
pub fn balances(world: &WorldState) -> BTreeMap<Account, Decimal> {
    let agents = world
        .agents
        .values()
        .map(|agent| (Account::Agent(agent.id), agent.balance));
    let vendors = world
        .vendors
        .values()
        .map(|vendor| (Account::Vendor(vendor.id), vendor.balance));
    agents.chain(vendors).collect()
}

/// Per-account change between two balance snapshots, omitting zeros.
///
/// Returns `None` on overflow.
pub fn balance_deltas(
    before: &BTreeMap<Account, Decimal>,
    after: &BTreeMap<Account, Decimal>,
) -> Option<BTreeMap<Account, Decimal>> {
    let accounts: BTreeSet<&Account> = before.keys().chain(after.keys()).collect();
    let mut deltas = BTreeMap::new();
    for account in accounts {
        let old = before.get(account).copied().unwrap_or(Decimal::ZERO);
        let new = after.get(account).copied().unwrap_or(Decimal::ZERO);
        let delta = new.checked_sub(old)?;
        if !delta.is_zero() {
            deltas.insert(*account, delta);
        }
    }
    Some(deltas)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use holdfast_types::{AgentId, LedgerEntryId, TransferKind, VendorId};
    use rust_decimal_macros::dec;

    use super::*;

    fn row(
        id: u64,
        transaction: u64,
        account: Account,
        side: EntrySide,
        amount: Decimal,
    ) -> LedgerEntry {
        LedgerEntry {
            id: LedgerEntryId::new(id),
            transaction_id: TransactionId::new(transaction),
            tick: 1,
            account,
            side,
            amount,
            kind: TransferKind::Purchase,
        }
    }

    const AGENT: Account = Account::Agent(AgentId(1));
    const VENDOR: Account = Account::Vendor(VendorId(1));

    #[test]
    fn balanced_pair_passes() {
        let rows = vec![
            row(1, 1, AGENT, EntrySide::Debit, dec!(2)),
            row(2, 1, VENDOR, EntrySide::Credit, dec!(2)),
        ];
        assert_eq!(verify_transactions(&rows), ConservationResult::Balanced);
    }

    #[test]
    fn mismatched_amounts_flagged() {
        let rows = vec![
            row(1, 1, AGENT, EntrySide::Debit, dec!(2)),
            row(2, 1, VENDOR, EntrySide::Credit, dec!(3)),
        ];
        let result = verify_transactions(&rows);
        let expected = vec![TransactionId::new(1)];
        assert!(matches!(
            result,
            ConservationResult::Anomaly(ref anomaly) if anomaly.transactions == expected
        ));
    }

    #[test]
    fn one_sided_transaction_flagged() {
        let rows = vec![row(1, 7, AGENT, EntrySide::Debit, dec!(2))];
        assert!(matches!(
            verify_transactions(&rows),
            ConservationResult::Anomaly(_)
        ));
    }

    #[test]
    fn deltas_omit_unchanged_accounts() {
        let mut before = BTreeMap::new();
        before.insert(AGENT, dec!(10));
        before.insert(VENDOR, dec!(0));
        let mut after = before.clone();
        after.insert(AGENT, dec!(10.00));
        let deltas = balance_deltas(&before, &after).unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn balance_moving_without_rows_is_anomaly() {
        let mut deltas = BTreeMap::new();
        deltas.insert(AGENT, dec!(-1));
        assert!(matches!(
            verify_flows(1, &[], &deltas),
            ConservationResult::Anomaly(_)
        ));
    }
}
