//! The entity index: entity id to storage location.
//!
//! A dense array keyed by entity id. Each slot remembers the version of the entity that owns
//! (or last owned) the id and, while that entity is live, where it is stored. A handle is live
//! exactly when its version matches the slot's and the slot has a location.

use crate::ecs::{entity::Entity, storage::location::Location};

/// One entry of the index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Slot {
    version: u32,
    /// `None` while the id is unused.
    location: Option<Location>,
}

/// Dense map from entity id to [`Location`], grown by doubling.
#[derive(Debug, Default)]
pub struct EntityIndex {
    slots: Vec<Slot>,
    live: usize,
}

impl EntityIndex {
    /// Smallest capacity allocated on first growth.
    const MIN_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of id slots currently allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Grow (by doubling) until `id` has a slot. New slots are unused.
    fn ensure(&mut self, id: usize) {
        if id < self.slots.len() {
            return;
        }
        let mut capacity = self.slots.len().max(Self::MIN_CAPACITY);
        while capacity <= id {
            capacity *= 2;
        }
        self.slots.resize(capacity, Slot::default());
    }

    /// The location of a live entity.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<Location> {
        let slot = self.slots.get(entity.index())?;
        if slot.version == entity.version() && !entity.is_null() {
            slot.location
        } else {
            None
        }
    }

    /// Whether the handle names a live entity.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Mark an entity live at `location`.
    pub fn insert(&mut self, entity: Entity, location: Location) {
        debug_assert!(!entity.is_null());
        self.ensure(entity.index());
        let slot = &mut self.slots[entity.index()];
        debug_assert!(slot.location.is_none(), "id {} is already live", entity.id());
        *slot = Slot {
            version: entity.version(),
            location: Some(location),
        };
        self.live += 1;
    }

    /// Point a live entity at a new location.
    pub fn relocate(&mut self, entity: Entity, location: Location) {
        debug_assert!(self.contains(entity), "relocating dead entity {entity}");
        if let Some(slot) = self.slots.get_mut(entity.index()) {
            slot.location = Some(location);
        }
    }

    /// Mark an entity unused, returning its last location.
    pub fn remove(&mut self, entity: Entity) -> Option<Location> {
        let location = self.get(entity)?;
        self.slots[entity.index()].location = None;
        self.live -= 1;
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        // Given
        let mut index = EntityIndex::new();
        let entity = Entity::new(3, 1);
        let location = Location::new(1, 2, 3);

        // When
        index.insert(entity, location);

        // Then
        assert_eq!(index.get(entity), Some(location));
        assert_eq!(index.len(), 1);

        // When
        assert_eq!(index.remove(entity), Some(location));

        // Then
        assert_eq!(index.get(entity), None);
        assert!(index.is_empty());
        assert_eq!(index.remove(entity), None);
    }

    #[test]
    fn stale_versions_are_not_live() {
        // Given
        let mut index = EntityIndex::new();
        index.insert(Entity::new(5, 2), Location::new(0, 0, 0));

        // Then
        assert!(index.contains(Entity::new(5, 2)));
        assert!(!index.contains(Entity::new(5, 1)));
        assert!(!index.contains(Entity::new(6, 1)));
        assert!(!index.contains(Entity::NULL));
    }

    #[test]
    fn grows_by_doubling() {
        // Given
        let mut index = EntityIndex::new();
        index.insert(Entity::new(1, 1), Location::new(0, 0, 0));
        assert_eq!(index.capacity(), 64);

        // When
        index.insert(Entity::new(200, 1), Location::new(0, 0, 1));

        // Then
        assert_eq!(index.capacity(), 256);
        assert!(index.contains(Entity::new(1, 1)));
        assert!(index.contains(Entity::new(200, 1)));
    }

    #[test]
    fn relocate_keeps_version() {
        // Given
        let mut index = EntityIndex::new();
        let entity = Entity::new(9, 4);
        index.insert(entity, Location::new(0, 0, 5));

        // When
        index.relocate(entity, Location::new(2, 1, 0));

        // Then
        assert_eq!(index.get(entity), Some(Location::new(2, 1, 0)));
        assert_eq!(index.len(), 1);
    }
}
