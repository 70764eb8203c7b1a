//! The append-only ledger of currency movements.
//!
//! - **Append-only**: rows are never modified or deleted.
//! - **Double-entry**: every posting writes one debit and one credit row.
//! - **Deterministic ids**: transaction and row ids are sequential, so a
//!   replayed run produces identical rows.
//! - **Precision**: amounts are [`Decimal`], never floating point.

use std::collections::BTreeMap;

use holdfast_types::{Account, EntrySide, LedgerEntry, LedgerEntryId, TransactionId};
use rust_decimal::Decimal;
use tracing::error;

use crate::conservation::{self, ConservationResult};
use crate::transaction::Transfer;
use crate::{LedgerAnomaly, LedgerError};

/// The ledger for one simulation stream.
#[derive(Debug, Default)]
pub struct Ledger {
    /// All rows, in posting order.
    entries: Vec<LedgerEntry>,
    /// Last transaction id handed out.
    last_transaction: u64,
    /// Last row id handed out.
    last_entry: u64,
    /// Set once an anomaly has been recorded.
    halted: Option<String>,
}

impl Ledger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_transaction: 0,
            last_entry: 0,
            halted: None,
        }
    }

    /// Number of rows.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no rows have been posted.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All rows in posting order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Rows posted during `tick`.
    pub fn entries_for_tick(&self, tick: u64) -> Vec<&LedgerEntry> {
        self.entries.iter().filter(|e| e.tick == tick).collect()
    }

    /// Rows touching `account`, oldest first.
    pub fn history(&self, account: Account) -> Vec<&LedgerEntry> {
        self.entries.iter().filter(|e| e.account == account).collect()
    }

    /// Whether postings are refused after an anomaly.
    pub const fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Post a transfer, returning its debit and credit rows.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Halted`] after an anomaly and
    /// [`LedgerError::IdOverflow`] if the id space is exhausted.
    pub fn post(&mut self, transfer: &Transfer) -> Result<[LedgerEntry; 2], LedgerError> {
        if let Some(reason) = &self.halted {
            return Err(LedgerError::Halted(reason.clone()));
        }

        let transaction_id = self
            .last_transaction
            .checked_add(1)
            .ok_or(LedgerError::IdOverflow)?;
        let debit_id = self.last_entry.checked_add(1).ok_or(LedgerError::IdOverflow)?;
        let credit_id = debit_id.checked_add(1).ok_or(LedgerError::IdOverflow)?;

        let debit = LedgerEntry {
            id: LedgerEntryId::new(debit_id),
            transaction_id: TransactionId::new(transaction_id),
            tick: transfer.tick,
            account: transfer.from,
            side: EntrySide::Debit,
            amount: transfer.amount,
            kind: transfer.kind,
        };
        let credit = LedgerEntry {
            id: LedgerEntryId::new(credit_id),
            account: transfer.to,
            side: EntrySide::Credit,
            ..debit.clone()
        };

        self.last_transaction = transaction_id;
        self.last_entry = credit_id;
        self.entries.push(debit.clone());
        self.entries.push(credit.clone());
        Ok([debit, credit])
    }

    /// Net flow per account during `tick`: credits minus debits.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::IdOverflow`] if summation overflows.
    pub fn net_flows(&self, tick: u64) -> Result<BTreeMap<Account, Decimal>, LedgerError> {
        conservation::net_flows(self.entries.iter().filter(|e| e.tick == tick))
            .ok_or(LedgerError::IdOverflow)
    }

    /// Check that every transaction has one debit and one credit of equal size.
    pub fn verify_transactions(&self) -> ConservationResult {
        conservation::verify_transactions(&self.entries)
    }

    /// Check the tick's transactions and that each account's net flow
    /// matches the observed change in its balance.
    pub fn verify_tick(
        &self,
        tick: u64,
        balance_deltas: &BTreeMap<Account, Decimal>,
    ) -> ConservationResult {
        let tick_entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|e| e.tick == tick)
            .cloned()
            .collect();
        if let ConservationResult::Anomaly(mut anomaly) =
            conservation::verify_transactions(&tick_entries)
        {
            anomaly.tick = Some(tick);
            return ConservationResult::Anomaly(anomaly);
        }
        conservation::verify_flows(tick, &tick_entries, balance_deltas)
    }

    /// Stop accepting postings. Used when an anomaly is detected.
    pub fn halt(&mut self, anomaly: &LedgerAnomaly) {
        error!(message = %anomaly.message, "ledger halted");
        self.halted = Some(anomaly.message.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use holdfast_types::{AgentId, TransferKind, VendorId};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::TransactionBuilder;

    fn purchase(tick: u64, agent: u64, amount: Decimal) -> Transfer {
        TransactionBuilder::new(tick, TransferKind::Purchase)
            .from(Account::Agent(AgentId::new(agent)))
            .to(Account::Vendor(VendorId::new(1)))
            .amount(amount)
            .build()
            .unwrap()
    }

    #[test]
    fn post_writes_a_balanced_pair() {
        let mut ledger = Ledger::new();
        let [debit, credit] = ledger.post(&purchase(1, 1, dec!(4))).unwrap();
        assert_eq!(debit.transaction_id, credit.transaction_id);
        assert_eq!(debit.side, EntrySide::Debit);
        assert_eq!(credit.side, EntrySide::Credit);
        assert_eq!(debit.amount, credit.amount);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.verify_transactions(), ConservationResult::Balanced);
    }

    #[test]
    fn ids_are_sequential() {
        let mut ledger = Ledger::new();
        ledger.post(&purchase(1, 1, dec!(1))).unwrap();
        let [debit, credit] = ledger.post(&purchase(1, 2, dec!(1))).unwrap();
        assert_eq!(debit.transaction_id, TransactionId::new(2));
        assert_eq!(debit.id, LedgerEntryId::new(3));
        assert_eq!(credit.id, LedgerEntryId::new(4));
    }

    #[test]
    fn net_flows_per_account() {
        let mut ledger = Ledger::new();
        ledger.post(&purchase(3, 1, dec!(4))).unwrap();
        ledger.post(&purchase(3, 2, dec!(1.5))).unwrap();
        ledger.post(&purchase(4, 1, dec!(9))).unwrap();

        let flows = ledger.net_flows(3).unwrap();
        assert_eq!(flows[&Account::Agent(AgentId::new(1))], dec!(-4));
        assert_eq!(flows[&Account::Agent(AgentId::new(2))], dec!(-1.5));
        assert_eq!(flows[&Account::Vendor(VendorId::new(1))], dec!(5.5));
    }

    #[test]
    fn verify_tick_matches_balance_deltas() {
        let mut ledger = Ledger::new();
        ledger.post(&purchase(2, 1, dec!(3))).unwrap();
        let mut deltas = BTreeMap::new();
        deltas.insert(Account::Agent(AgentId::new(1)), dec!(-3));
        deltas.insert(Account::Vendor(VendorId::new(1)), dec!(3));
        assert_eq!(ledger.verify_tick(2, &deltas), ConservationResult::Balanced);

        deltas.insert(Account::Vendor(VendorId::new(1)), dec!(4));
        assert!(matches!(
            ledger.verify_tick(2, &deltas),
            ConservationResult::Anomaly(_)
        ));
    }

    #[test]
    fn halted_ledger_refuses_postings() {
        let mut ledger = Ledger::new();
        ledger.halt(&LedgerAnomaly {
            tick: Some(1),
            transactions: Vec::new(),
            accounts: Vec::new(),
            message: "test anomaly".to_owned(),
        });
        assert!(ledger.is_halted());
        assert!(matches!(
            ledger.post(&purchase(1, 1, dec!(1))),
            Err(LedgerError::Halted(_))
        ));
    }
}
