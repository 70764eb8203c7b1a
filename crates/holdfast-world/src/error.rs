//! Error types for the `holdfast-world` crate.

use holdfast_types::{EntityRef, Field, FieldValue};

/// Errors raised while applying state changes to a world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The change targets an entity that does not exist.
    #[error("unknown entity {entity}")]
    UnknownEntity {
        /// The missing entity.
        entity: EntityRef,
    },

    /// The entity has no such field.
    #[error("field {field:?} is not valid for {entity}")]
    UnsupportedField {
        /// Target entity.
        entity: EntityRef,
        /// Offending field.
        field: Field,
    },

    /// The value type does not match the field.
    #[error("{entity} {field:?} expects a different value type, got {value:?}")]
    TypeMismatch {
        /// Target entity.
        entity: EntityRef,
        /// Target field.
        field: Field,
        /// Offending value.
        value: FieldValue,
    },

    /// The recorded old value differs from the live value.
    #[error("{entity} {field:?} is stale: expected {expected:?}, found {actual:?}")]
    StaleValue {
        /// Target entity.
        entity: EntityRef,
        /// Target field.
        field: Field,
        /// Old value carried by the change.
        expected: FieldValue,
        /// Live value in the world.
        actual: FieldValue,
    },

    /// The new value would break a world invariant.
    #[error("invariant violated on {entity} {field:?}: {detail}")]
    InvariantViolation {
        /// Target entity.
        entity: EntityRef,
        /// Target field.
        field: Field,
        /// What went wrong.
        detail: String,
    },

    /// Checked arithmetic failed.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: String,
    },
}

impl WorldError {
    /// Whether the error means the world and its history disagree, or an
    /// invariant such as a non-negative balance was about to be broken.
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::StaleValue { .. } | Self::InvariantViolation { .. })
    }
}
