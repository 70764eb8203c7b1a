//! Transaction builder and validation.
//!
//! A [`TransactionBuilder`] collects the two accounts, the amount, and the
//! reason for a currency movement and validates them into a [`Transfer`].
//! The [`Ledger`](crate::Ledger) assigns identifiers and expands a transfer
//! into its debit and credit rows.

use holdfast_types::{Account, TransferKind};
use rust_decimal::Decimal;

use crate::LedgerError;

/// A validated, not-yet-posted currency movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Tick of the movement.
    pub tick: u64,
    /// Why the currency moved.
    pub kind: TransferKind,
    /// Paying account (debit side).
    pub from: Account,
    /// Receiving account (credit side).
    pub to: Account,
    /// Strictly positive amount.
    pub amount: Decimal,
}

/// Builder for [`Transfer`] values.
///
/// # Examples
///
/// ```
/// use holdfast_ledger::TransactionBuilder;
/// use holdfast_types::{Account, AgentId, TransferKind};
/// use rust_decimal::Decimal;
///
/// let transfer = TransactionBuilder::new(4, TransferKind::Wage)
///     .from(Account::Agent(AgentId::new(1)))
///     .to(Account::Agent(AgentId::new(2)))
///     .amount(Decimal::new(3, 0))
///     .build();
///
/// assert!(transfer.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    tick: u64,
    kind: TransferKind,
    from: Option<Account>,
    to: Option<Account>,
    amount: Option<Decimal>,
}

impl TransactionBuilder {
    /// Start building a transfer for the given tick and kind.
    pub const fn new(tick: u64, kind: TransferKind) -> Self {
        Self {
            tick,
            kind,
            from: None,
            to: None,
            amount: None,
        }
    }

    /// Set the paying account (debit side).
    #[must_use]
    pub const fn from(mut self, account: Account) -> Self {
        self.from = Some(account);
        self
    }

    /// Set the receiving account (credit side).
    #[must_use]
    pub const fn to(mut self, account: Account) -> Self {
        self.to = Some(account);
        self
    }

    /// Set the amount moved.
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Validate inputs and produce a [`Transfer`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] if an account or the amount is
    /// unset, [`LedgerError::ZeroAmount`] or [`LedgerError::NegativeAmount`]
    /// for a non-positive amount, and [`LedgerError::SelfTransfer`] when both
    /// sides name the same account.
    pub fn build(self) -> Result<Transfer, LedgerError> {
        let from = self.from.ok_or(LedgerError::MissingField("from"))?;
        let to = self.to.ok_or(LedgerError::MissingField("to"))?;
        let amount = self.amount.ok_or(LedgerError::MissingField("amount"))?;

        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount { amount });
        }
        if from == to {
            return Err(LedgerError::SelfTransfer { account: from });
        }

        Ok(Transfer {
            tick: self.tick,
            kind: self.kind,
            from,
            to,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use holdfast_types::{AgentId, VendorId};
    use rust_decimal_macros::dec;

    use super::*;

    fn purchase() -> TransactionBuilder {
        TransactionBuilder::new(1, TransferKind::Purchase)
            .from(Account::Agent(AgentId::new(1)))
            .to(Account::Vendor(VendorId::new(1)))
    }

    #[test]
    fn valid_transfer_builds() {
        let transfer = purchase().amount(dec!(2.50)).build();
        assert!(transfer.is_ok_and(|t| t.amount == dec!(2.50)));
    }

    #[test]
    fn zero_amount_rejected() {
        let result = purchase().amount(Decimal::ZERO).build();
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
    }

    #[test]
    fn negative_amount_rejected() {
        let result = purchase().amount(dec!(-1)).build();
        assert!(matches!(result, Err(LedgerError::NegativeAmount { .. })));
    }

    #[test]
    fn missing_amount_rejected() {
        let result = purchase().build();
        assert!(matches!(result, Err(LedgerError::MissingField("amount"))));
    }

    #[test]
    fn self_transfer_rejected() {
        let account = Account::Agent(AgentId::new(5));
        let result = TransactionBuilder::new(1, TransferKind::Wage)
            .from(account)
            .to(account)
            .amount(dec!(1))
            .build();
        assert!(matches!(result, Err(LedgerError::SelfTransfer { .. })));
    }
}
