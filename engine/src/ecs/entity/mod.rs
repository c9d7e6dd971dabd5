//! Entity handles and id allocation.
//!
//! An [`Entity`] is a plain `(id, version)` pair. The `id` is a dense index into the entity
//! index of a world, and the `version` distinguishes successive owners of the same `id`:
//!
//! ```rust,ignore
//! let entity = allocator.alloc(); // Entity { id: 1, version: 1 }
//! allocator.free(entity);
//! let reused = allocator.alloc();  // Entity { id: 1, version: 2 }
//! // `entity` is now stale: its version no longer matches.
//! ```
//!
//! Id `0` is reserved for [`Entity::NULL`], so a zeroed entity column never names a real entity.

use std::{
    fmt,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU32, Ordering},
    },
};

use bytemuck::{Pod, Zeroable};
use crossbeam::queue::SegQueue;

/// An entity handle.
///
/// Entities are stored inside block entity columns as raw bytes, hence `repr(C)` and `Pod`.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Entity {
    id: u32,
    version: u32,
}

impl Entity {
    /// The null entity. Never live.
    pub const NULL: Self = Self { id: 0, version: 0 };

    /// The version handed out with a fresh id.
    pub const FIRST_VERSION: u32 = 1;

    /// Construct an entity from raw parts.
    #[inline]
    pub const fn new(id: u32, version: u32) -> Self {
        Self { id, version }
    }

    /// The dense id of this entity.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The reuse version of this entity.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The id as an index into id keyed storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.id as usize
    }

    /// True for [`Entity::NULL`] (or any handle with id 0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.id == 0
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by id, then version.
impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.version)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.version)
    }
}

const CHUNK_SIZE: usize = 4096;

/// Growable array of atomic versions, indexed by entity id.
#[derive(Default, Debug)]
struct Versions {
    chunks: RwLock<Vec<Box<[AtomicU32; CHUNK_SIZE]>>>,
}

impl Versions {
    const fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn get(&self, id: u32) -> u32 {
        let chunk_idx = id as usize / CHUNK_SIZE;
        let slot_idx = id as usize % CHUNK_SIZE;

        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        match chunks.get(chunk_idx) {
            Some(chunk) => chunk[slot_idx].load(Ordering::Acquire),
            None => Entity::FIRST_VERSION,
        }
    }

    fn increment(&self, id: u32) {
        self.ensure_capacity(id);
        let chunk_idx = id as usize / CHUNK_SIZE;
        let slot_idx = id as usize % CHUNK_SIZE;

        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let version = &chunks[chunk_idx][slot_idx];
        // Version 0 is never issued, so a wrapped id stays distinguishable from NULL.
        let next = match version.load(Ordering::Acquire).wrapping_add(1) {
            0 => Entity::FIRST_VERSION,
            next => next,
        };
        version.store(next, Ordering::Release);
    }

    fn ensure_capacity(&self, id: u32) {
        let chunk_idx = id as usize / CHUNK_SIZE;
        let chunks_len = self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        if chunk_idx >= chunks_len {
            let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
            while chunks.len() <= chunk_idx {
                chunks.push(Box::new(std::array::from_fn(|_| {
                    AtomicU32::new(Entity::FIRST_VERSION)
                })));
            }
        }
    }
}

/// Issues entity handles and recycles destroyed ids.
///
/// Freed ids go to a lock-free dead pool with their version bumped, so a reissued id never
/// compares equal to any handle issued before.
#[derive(Debug)]
pub struct Allocator {
    /// Current version of each id.
    versions: Versions,

    /// Ids available for reuse.
    dead_pool: SegQueue<u32>,

    /// Next fresh id. Starts at 1 since 0 is null.
    next_id: AtomicU32,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator {
    /// Construct an allocator whose first fresh id is 1.
    #[inline]
    pub const fn new() -> Self {
        Self {
            versions: Versions::new(),
            dead_pool: SegQueue::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Allocate many entities at once, reusing dead ids first.
    pub fn alloc_many(&self, count: usize) -> Vec<Entity> {
        let mut alloced = Vec::with_capacity(count);
        while alloced.len() < count
            && let Some(id) = self.dead_pool.pop()
        {
            alloced.push(Entity::new(id, self.versions.get(id)));
        }

        let remaining = (count - alloced.len()) as u32;
        if remaining > 0 {
            let start_id = self.next_id.fetch_add(remaining, Ordering::Relaxed);
            let last_id = start_id + remaining;
            self.versions.ensure_capacity(last_id - 1);

            alloced.extend((start_id..last_id).map(|id| Entity::new(id, Entity::FIRST_VERSION)));
        }

        alloced
    }

    /// Allocate one entity, reusing a dead id if one is available.
    pub fn alloc(&self) -> Entity {
        if let Some(id) = self.dead_pool.pop() {
            return Entity::new(id, self.versions.get(id));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.versions.ensure_capacity(id);
        Entity::new(id, Entity::FIRST_VERSION)
    }

    /// Return an entity's id for reuse. The caller guarantees the entity was live.
    pub fn free(&self, entity: Entity) {
        debug_assert!(!entity.is_null(), "freeing the null entity");
        self.versions.increment(entity.id());
        self.dead_pool.push(entity.id());
    }

    /// Number of ids waiting for reuse.
    #[inline]
    pub fn dead_count(&self) -> usize {
        self.dead_pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_uniqueness() {
        // Given
        let allocator = Allocator::default();

        // When
        let mut entities: Vec<_> = (0..200).map(|_| allocator.alloc()).collect();

        // Then - No dupes generated, none null
        let pre_len = entities.len();
        entities.sort();
        entities.dedup();
        assert_eq!(pre_len, entities.len());
        assert!(entities.iter().all(|e| !e.is_null()));
    }

    #[test]
    fn fresh_ids_start_at_one() {
        // Given
        let allocator = Allocator::new();

        // When
        let e1 = allocator.alloc();
        let e2 = allocator.alloc();

        // Then
        assert_eq!(e1, Entity::new(1, 1));
        assert_eq!(e2, Entity::new(2, 1));
    }

    #[test]
    fn reuse_increments_version() {
        // Given
        let allocator = Allocator::default();
        let e1 = allocator.alloc();

        // When
        allocator.free(e1);
        let e2 = allocator.alloc();

        // Then
        assert_eq!(e2.id(), e1.id());
        assert_ne!(e2.version(), e1.version());
        assert_ne!(e1, e2);
        assert_eq!(e2.version(), 2);
    }

    #[test]
    fn free_and_reuse_cycle() {
        // Given
        let allocator = Allocator::default();
        let entities = allocator.alloc_many(5);
        assert_eq!(allocator.dead_count(), 0);

        // When - Free all entities
        for e in entities {
            allocator.free(e);
        }

        // Then
        assert_eq!(allocator.dead_count(), 5);

        // When - Allocate 6 (more than pool size)
        let next: Vec<_> = (0..6).map(|_| allocator.alloc()).collect();

        // Then - 5 reused (version 2) + 1 new (version 1)
        assert_eq!(allocator.dead_count(), 0);
        assert_eq!(next.iter().filter(|e| e.version() == 2).count(), 5);
        assert_eq!(next.iter().filter(|e| e.version() == 1).count(), 1);
        assert!(next.iter().any(|e| e.id() == 6));
    }

    #[test]
    fn multiple_versions() {
        // Given
        let allocator = Allocator::default();
        let mut entity = allocator.alloc();
        let id = entity.id();

        // When/Then - Same id, incrementing versions
        for expected in 2..5 {
            allocator.free(entity);
            entity = allocator.alloc();
            assert_eq!(entity.id(), id);
            assert_eq!(entity.version(), expected);
        }
    }

    #[test]
    fn alloc_many_mixed() {
        // Given
        let allocator = Allocator::default();
        for e in allocator.alloc_many(3) {
            allocator.free(e);
        }

        // When - Allocate 5 (more than pool size)
        let entities = allocator.alloc_many(5);

        // Then - 3 reused + 2 new with ids 4 and 5
        let mut new_ids: Vec<_> = entities
            .iter()
            .filter(|e| e.version() == Entity::FIRST_VERSION)
            .map(|e| e.id())
            .collect();
        new_ids.sort();
        assert_eq!(new_ids, vec![4, 5]);
        assert_eq!(entities.iter().filter(|e| e.version() == 2).count(), 3);
    }

    #[test]
    fn versions_cross_chunk_boundary() {
        // Given
        let allocator = Allocator::default();
        let entities = allocator.alloc_many(CHUNK_SIZE + 10);
        let last = *entities.last().unwrap();

        // When
        allocator.free(last);

        // Then
        assert_eq!(allocator.alloc(), Entity::new(last.id(), 2));
    }

    #[test]
    fn entity_ordering_and_display() {
        // Given
        let e1 = Entity::new(1, 1);
        let e2 = Entity::new(2, 1);
        let e1_v2 = Entity::new(1, 2);

        // Then - Ordered by id first, then version
        assert!(e1 < e2);
        assert!(e1 < e1_v2);
        assert!(e1_v2 < e2);
        assert_eq!(e1_v2.to_string(), "1v2");
        assert!(Entity::NULL.is_null());
        assert_eq!(Entity::zeroed(), Entity::NULL);
    }
}
