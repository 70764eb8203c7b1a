//! Accumulates [`StateChange`]s for one action, skipping no-op deltas.

use holdfast_types::{
    ActivityStatus, EntityRef, Field, FieldValue, MemoryNote, Position, StateChange,
};
use rust_decimal::Decimal;

/// Ordered list of changes produced by a handler.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    changes: Vec<StateChange>,
}

impl ChangeSet {
    pub(crate) const fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    fn push(&mut self, entity: EntityRef, field: Field, old: FieldValue, new: FieldValue) {
        if old != new {
            self.changes.push(StateChange::new(entity, field, old, new));
        }
    }

    pub(crate) fn count(&mut self, entity: EntityRef, field: Field, old: u32, new: u32) {
        self.push(entity, field, FieldValue::Count(old), FieldValue::Count(new));
    }

    pub(crate) fn amount(&mut self, entity: EntityRef, old: Decimal, new: Decimal) {
        self.push(
            entity,
            Field::Balance,
            FieldValue::Amount(old),
            FieldValue::Amount(new),
        );
    }

    pub(crate) fn position(&mut self, entity: EntityRef, old: Position, new: Position) {
        self.push(
            entity,
            Field::Position,
            FieldValue::Position(old),
            FieldValue::Position(new),
        );
    }

    pub(crate) fn status(&mut self, entity: EntityRef, old: ActivityStatus, new: ActivityStatus) {
        self.push(
            entity,
            Field::Status,
            FieldValue::Status(old),
            FieldValue::Status(new),
        );
    }

    pub(crate) fn flag(&mut self, entity: EntityRef, field: Field, old: bool, new: bool) {
        self.push(entity, field, FieldValue::Flag(old), FieldValue::Flag(new));
    }

    pub(crate) fn memories(&mut self, entity: EntityRef, old: &[MemoryNote], new: Vec<MemoryNote>) {
        self.push(
            entity,
            Field::Memories,
            FieldValue::Memories(old.to_vec()),
            FieldValue::Memories(new),
        );
    }

    pub(crate) fn into_inner(self) -> Vec<StateChange> {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use holdfast_types::AgentId;

    use super::*;

    #[test]
    fn unchanged_values_are_skipped() {
        let agent = EntityRef::Agent(AgentId::new(1));
        let mut set = ChangeSet::new();
        set.count(agent, Field::Energy, 50, 50);
        set.status(agent, ActivityStatus::Idle, ActivityStatus::Idle);
        set.count(agent, Field::Hunger, 40, 70);
        let changes = set.into_inner();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.first().map(|c| c.field), Some(Field::Hunger));
    }
}
