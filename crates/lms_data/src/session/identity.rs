//! Per-session identity map keyed by entity type and primary key.

use crate::entity::Entity;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Session-local view of one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tracked<T> {
    Present(T),
    /// Removal is staged; the store still holds the row until flush.
    Removed,
}

trait ErasedSlot: Any {
    fn purge_removed(&mut self);
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<T: Entity> {
    entries: HashMap<T::Key, Tracked<T>>,
}

impl<T: Entity> ErasedSlot for Slot<T> {
    fn purge_removed(&mut self) {
        self.entries
            .retain(|_, entry| matches!(entry, Tracked::Present(_)));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub(crate) struct IdentityMap {
    slots: HashMap<TypeId, Box<dyn ErasedSlot>>,
}

impl IdentityMap {
    pub(crate) fn get<T: Entity>(&self, key: &T::Key) -> Option<&Tracked<T>> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.as_any().downcast_ref::<Slot<T>>())
            .and_then(|slot| slot.entries.get(key))
    }

    /// Records `entity`, replacing any earlier entry for its key.
    pub(crate) fn put<T: Entity>(&mut self, entity: T) {
        self.slot_mut::<T>()
            .entries
            .insert(entity.key(), Tracked::Present(entity));
    }

    /// Records `entity` unless its key is already tracked.
    pub(crate) fn put_if_absent<T: Entity>(&mut self, entity: T) {
        self.slot_mut::<T>()
            .entries
            .entry(entity.key())
            .or_insert(Tracked::Present(entity));
    }

    pub(crate) fn mark_removed<T: Entity>(&mut self, key: T::Key) {
        self.slot_mut::<T>().entries.insert(key, Tracked::Removed);
    }

    /// Drops entries whose removal has been committed.
    pub(crate) fn purge_removed(&mut self) {
        for slot in self.slots.values_mut() {
            slot.purge_removed();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.len()).sum()
    }

    fn slot_mut<T: Entity>(&mut self) -> &mut Slot<T> {
        let slot = self.slots.entry(TypeId::of::<T>()).or_insert_with(|| {
            Box::new(Slot::<T> {
                entries: HashMap::new(),
            })
        });
        match slot.as_any_mut().downcast_mut::<Slot<T>>() {
            Some(slot) => slot,
            None => unreachable!("identity slot is keyed by its own TypeId"),
        }
    }
}
