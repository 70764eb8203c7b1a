//! Double-entry ledger rows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{EntrySide, TransferKind};
use crate::ids::{AgentId, LedgerEntryId, TransactionId, VendorId};

/// An account that can hold currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Account {
    /// An agent's balance.
    Agent(AgentId),
    /// A vendor's till.
    Vendor(VendorId),
}

impl core::fmt::Display for Account {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::Vendor(id) => write!(f, "vendor:{id}"),
        }
    }
}

/// One row of a balanced transaction.
///
/// Every transaction consists of exactly one [`EntrySide::Debit`] row on
/// the paying account and one [`EntrySide::Credit`] row on the receiving
/// account, both carrying the same `transaction_id` and `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LedgerEntry {
    /// Row identifier.
    pub id: LedgerEntryId,
    /// Shared by the paired debit and credit rows.
    pub transaction_id: TransactionId,
    /// Tick the transfer happened in.
    pub tick: u64,
    /// Account affected by this row.
    pub account: Account,
    /// Whether funds left or arrived.
    pub side: EntrySide,
    /// Positive amount moved.
    #[ts(as = "String")]
    pub amount: Decimal,
    /// Why the transfer happened.
    pub kind: TransferKind,
}
