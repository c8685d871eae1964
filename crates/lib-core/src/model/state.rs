use smol_str::SmolStr;

use ahash::AHashMap;

use crate::errors::{GenerateError, Result};
use crate::instance::{EntityHandle, EntityKey};
use crate::value::Value;

/// One deferred action: when the entity it is queued on reaches `Persisted`,
/// `property` of `entity` emits the statements that complete the reference.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub entity: EntityHandle,
    pub property: SmolStr,
    pub args: Vec<Value>,
}

/// Write state of one entity. `Persisted` is monotone; pre-existing rows
/// collapse to `Persisted` on first mention.
#[derive(Debug)]
pub enum EntityState {
    Pending(Vec<PendingUpdate>),
    Persisted,
}

/// Per-descriptor write states, keyed by entity identity.
#[derive(Debug, Default)]
pub struct StateMap {
    states: AHashMap<EntityKey, EntityState>,
}

impl StateMap {
    /// An entity is new until it reaches `Persisted`. The id value is never
    /// consulted: the first generated id may legitimately be zero.
    pub fn is_new(&self, key: &EntityKey) -> bool {
        !matches!(self.states.get(key), Some(EntityState::Persisted))
    }

    /// Queues a deferred action, creating a `Pending` state on first use.
    /// Queuing onto a persisted entity would lose the action, so it is
    /// rejected.
    pub fn mark_pending(&mut self, key: EntityKey, update: PendingUpdate) -> Result<()> {
        match self
            .states
            .entry(key)
            .or_insert_with(|| EntityState::Pending(Vec::new()))
        {
            EntityState::Pending(updates) => {
                updates.push(update);
                Ok(())
            }
            EntityState::Persisted => Err(GenerateError::model(format!(
                "deferred update for {} queued on an already persisted entity",
                update.property
            ))),
        }
    }

    /// Transitions to `Persisted` and drains the queued actions in the order
    /// they were queued. Re-persisting is a no-op.
    pub fn set_persisted(&mut self, key: EntityKey) -> Vec<PendingUpdate> {
        match self.states.insert(key, EntityState::Persisted) {
            Some(EntityState::Pending(updates)) => updates,
            _ => Vec::new(),
        }
    }

    /// Entities still pending, with the number of queued actions. Non-empty
    /// at shutdown means the model referenced rows that were never written.
    pub fn residual_pending(&self) -> Vec<(EntityKey, usize)> {
        self.states
            .iter()
            .filter_map(|(key, state)| match state {
                EntityState::Pending(updates) => Some((key.clone(), updates.len())),
                EntityState::Persisted => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{PendingUpdate, StateMap};
    use crate::instance::EntityHandle;

    fn pending(entity: &EntityHandle, property: &str) -> PendingUpdate {
        PendingUpdate {
            entity: entity.clone(),
            property: property.into(),
            args: Vec::new(),
        }
    }

    #[test]
    fn pending_actions_flush_in_fifo_order() {
        let target = EntityHandle::new("B");
        let first = EntityHandle::new("A");
        let second = EntityHandle::new("A");

        let mut states = StateMap::default();
        states
            .mark_pending(target.key(), pending(&first, "b"))
            .unwrap();
        states
            .mark_pending(target.key(), pending(&second, "b"))
            .unwrap();

        let drained = states.set_persisted(target.key());
        assert_eq!(drained.len(), 2);
        assert!(drained[0].entity.ptr_eq(&first));
        assert!(drained[1].entity.ptr_eq(&second));
        assert!(!states.is_new(&target.key()));
    }

    #[test]
    fn persisted_is_monotone() {
        let target = EntityHandle::new("B");
        let source = EntityHandle::new("A");

        let mut states = StateMap::default();
        states.set_persisted(target.key());
        assert!(
            states
                .mark_pending(target.key(), pending(&source, "b"))
                .is_err()
        );
        assert!(states.set_persisted(target.key()).is_empty());
        assert!(!states.is_new(&target.key()));
    }

    #[test]
    fn unknown_entities_are_new() {
        let states = StateMap::default();
        assert!(states.is_new(&EntityHandle::new("A").key()));
    }
}
