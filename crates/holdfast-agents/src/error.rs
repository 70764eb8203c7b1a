//! Error types for the `holdfast-agents` crate.
//!
//! Precondition failures are not errors: they come back as a failed
//! [`ActionResult`](holdfast_types::ActionResult). The variants here are
//! faults that stop a tick.

use holdfast_ledger::LedgerError;
use holdfast_types::AgentId;
use holdfast_world::WorldError;

/// Faults raised while applying actions or decaying needs.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The acting agent does not exist.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Applying the computed changes failed.
    #[error("world update failed: {source}")]
    World {
        /// Underlying error.
        #[from]
        source: WorldError,
    },

    /// Posting the ledger pair failed.
    #[error("ledger posting failed: {source}")]
    Ledger {
        /// Underlying error.
        #[from]
        source: LedgerError,
    },

    /// Checked arithmetic failed.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: String,
    },
}

impl ActionError {
    /// Whether the fault means state and history can no longer be trusted.
    pub const fn is_integrity(&self) -> bool {
        match self {
            Self::World { source } => source.is_integrity(),
            Self::Ledger { source } => matches!(source, LedgerError::Halted(_)),
            Self::AgentNotFound(_) | Self::ArithmeticOverflow { .. } => false,
        }
    }
}

/// Shorthand for an overflow error.
pub(crate) fn overflow(context: impl Into<String>) -> ActionError {
    ActionError::ArithmeticOverflow {
        context: context.into(),
    }
}
