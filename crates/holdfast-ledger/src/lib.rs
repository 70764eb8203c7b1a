//! Double-entry currency ledger for the Holdfast simulation core.
//!
//! Every movement of currency between accounts is recorded as a
//! transaction of exactly two rows: a debit on the paying account and a
//! credit on the receiving account, sharing one [`TransactionId`]. Currency
//! is never minted or burned inside a tick, so the total across all
//! accounts is conserved.
//!
//! # Architecture
//!
//! - [`transaction`] -- [`TransactionBuilder`] producing validated [`Transfer`]s.
//! - [`ledger`] -- The append-only [`Ledger`] that turns transfers into row pairs.
//! - [`conservation`] -- Per-transaction balance and per-tick flow verification.
//!
//! # Conservation Law
//!
//! For every transaction `X`:
//!
//! ```text
//! sum(debits in X) == sum(credits in X)
//! ```
//!
//! and for every tick, each account's net ledger flow equals the change in
//! its balance. A violation produces a [`LedgerAnomaly`]. After an anomaly
//! the ledger refuses further postings until it is reset.
//!
//! # Usage
//!
//! ```
//! use holdfast_ledger::{Ledger, TransactionBuilder};
//! use holdfast_ledger::conservation::ConservationResult;
//! use holdfast_types::{Account, AgentId, TransferKind, VendorId};
//! use rust_decimal::Decimal;
//!
//! let mut ledger = Ledger::new();
//! let transfer = TransactionBuilder::new(1, TransferKind::Purchase)
//!     .from(Account::Agent(AgentId::new(1)))
//!     .to(Account::Vendor(VendorId::new(1)))
//!     .amount(Decimal::new(5, 0))
//!     .build()
//!     .ok();
//!
//! if let Some(transfer) = transfer {
//!     ledger.post(&transfer).ok();
//! }
//! assert_eq!(ledger.verify_transactions(), ConservationResult::Balanced);
//! ```
//!
//! [`TransactionId`]: holdfast_types::TransactionId

pub mod conservation;
pub mod ledger;
pub mod transaction;

pub use conservation::ConservationResult;
pub use ledger::Ledger;
pub use transaction::{TransactionBuilder, Transfer};

use holdfast_types::{Account, TransactionId};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when recording ledger entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amount must be strictly positive.
    #[error("transfer amount must be non-zero")]
    ZeroAmount,

    /// Amount must not be negative.
    #[error("transfer amount must be positive, got {amount}")]
    NegativeAmount {
        /// The invalid amount.
        amount: Decimal,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Paying and receiving accounts are the same.
    #[error("transfer from {account} to itself")]
    SelfTransfer {
        /// The account on both sides.
        account: Account,
    },

    /// An identifier counter overflowed.
    #[error("ledger identifier space exhausted")]
    IdOverflow,

    /// A conservation violation was detected earlier; no further postings
    /// are accepted.
    #[error("ledger halted after anomaly: {0}")]
    Halted(String),
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation law violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// Tick the violation was detected in, if tick-scoped.
    pub tick: Option<u64>,
    /// Transactions that did not balance.
    pub transactions: Vec<TransactionId>,
    /// Accounts whose ledger flow disagreed with their balance change.
    pub accounts: Vec<Account>,
    /// Human-readable description.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
