//! The World is the public face of the store.
//!
//! A `World` pairs the entity id allocator with the [`ComponentManager`] that owns all
//! component data. It is the only place entities are created and destroyed, so a handle's
//! version always tells whether it still names a live entity.
//!
//! # Threading
//!
//! One thread, the mutator thread, performs structural changes. Parallel work goes through
//! [`World::par_for_each_block`] (or through job handles taken from the [`SyncPoint`]), and
//! every structural operation waits for outstanding work before it touches storage.
//!
//! # Example
//!
//! ```ignore
//! use rusty_blocks::ecs::{Archetype, ComponentQuery, World};
//!
//! let mut world = World::new();
//! let moving = Archetype::empty().add::<Position>()?.add::<Velocity>()?;
//! let entity = world.create_entity(&moving)?;
//! world.set_component(entity, Velocity { dx: 1.0, dy: 0.0 })?;
//!
//! let query = ComponentQuery::new().include::<Velocity>()?.include_mut::<Position>()?;
//! world.par_for_each_block(&query, |block| {
//!     let velocities = block.components::<Velocity>().unwrap();
//!     for (p, v) in block.components_mut::<Position>().unwrap().iter_mut().zip(velocities) {
//!         p.x += v.dx;
//!     }
//! })?;
//! ```

pub(crate) mod sync;

use std::{num::NonZeroUsize, sync::Arc, thread};

use crossbeam::{channel::Receiver, queue::SegQueue};

pub use sync::{JobHandle, SyncPoint};

use crate::ecs::{
    archetype::Archetype,
    component::{Component, Index, Info, SharedComponent, SharedValue},
    entity::{self, Entity},
    error::Result,
    event::{Event, Interest},
    prefab::Prefab,
    query::{BlockAccessor, BlockIter, ChangeFilter, ComponentQuery},
    storage::{Block, ComponentManager, Config},
};

/// Owns every entity and its components.
pub struct World {
    /// Entity id and version allocation.
    entities: entity::Allocator,

    /// All component storage.
    components: ComponentManager,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// A world with the default [`Config`], owned by the calling thread.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            entities: entity::Allocator::new(),
            components: ComponentManager::new(config),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        self.components.config()
    }

    #[inline]
    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    #[inline]
    pub fn sync_point(&self) -> &SyncPoint {
        self.components.sync_point()
    }

    /// Make the calling thread the mutator thread.
    pub fn bind_to_current_thread(&mut self) {
        self.components.sync_point_mut().bind_to_current_thread();
    }

    /// The last issued change version, for use with [`ChangeFilter`].
    #[inline]
    pub fn version(&self) -> u64 {
        self.components.version()
    }

    /// Receive every future event the interest covers.
    pub fn subscribe(&mut self, interest: Interest) -> Receiver<Event> {
        self.components.subscribe(interest)
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.components.entity_count()
    }

    #[inline]
    pub fn is_live(&self, entity: Entity) -> bool {
        self.components.is_live(entity)
    }

    pub fn archetype_of(&self, entity: Entity) -> Result<&Arc<Archetype>> {
        self.components.archetype_of(entity)
    }

    /// Create an entity with zeroed components of `archetype`.
    pub fn create_entity(&mut self, archetype: &Archetype) -> Result<Entity> {
        let entity = self.entities.alloc();
        if let Err(error) = self.components.add_entity(entity, archetype) {
            self.entities.free(entity);
            return Err(error);
        }
        Ok(entity)
    }

    /// Create an entity without components.
    pub fn create_empty(&mut self) -> Result<Entity> {
        self.create_entity(&Archetype::empty())
    }

    /// Create `count` entities of the same archetype.
    pub fn create_entities(&mut self, archetype: &Archetype, count: usize) -> Result<Vec<Entity>> {
        (0..count).map(|_| self.create_entity(archetype)).collect()
    }

    /// Create an entity from a prefab.
    pub fn instantiate(&mut self, prefab: &Prefab) -> Result<Entity> {
        let entity = self.entities.alloc();
        if let Err(error) = self.components.instantiate(entity, prefab) {
            self.entities.free(entity);
            return Err(error);
        }
        Ok(entity)
    }

    pub fn instantiate_many(&mut self, prefab: &Prefab, count: usize) -> Result<Vec<Entity>> {
        (0..count).map(|_| self.instantiate(prefab)).collect()
    }

    /// Destroy a live entity. Its handle, and every copy of it, becomes stale.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        self.components.remove_entity(entity)?;
        self.entities.free(entity);
        Ok(())
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        self.components.add_component(entity, value)
    }

    pub(crate) fn add_component_bytes(
        &mut self,
        entity: Entity,
        info: Info,
        bytes: &[u8],
    ) -> Result<()> {
        self.components.add_component_bytes(entity, info, bytes)
    }

    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        self.components.set_component(entity, value)
    }

    pub(crate) fn set_component_bytes(
        &mut self,
        entity: Entity,
        index: Index,
        bytes: &[u8],
    ) -> Result<()> {
        self.components.set_component_bytes(entity, index, bytes)
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        self.components.remove_component::<T>(entity)
    }

    pub(crate) fn remove_component_index(&mut self, entity: Entity, index: Index) -> Result<()> {
        self.components.remove_component_index(entity, index)
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T> {
        self.components.get_component(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        self.components.get_component_mut(entity)
    }

    pub fn try_get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.components.try_get_component(entity)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool> {
        self.components.has_component::<T>(entity)
    }

    pub fn add_shared_component<S: SharedComponent>(
        &mut self,
        entity: Entity,
        value: S,
    ) -> Result<()> {
        self.components.add_shared_component(entity, value)
    }

    pub(crate) fn add_shared_value(&mut self, entity: Entity, value: SharedValue) -> Result<()> {
        self.components.add_shared_value(entity, value)
    }

    pub fn remove_shared_component<S: SharedComponent>(&mut self, entity: Entity) -> Result<()> {
        self.components.remove_shared_component::<S>(entity)
    }

    pub(crate) fn remove_shared_index(&mut self, entity: Entity, index: Index) -> Result<()> {
        self.components.remove_shared_index(entity, index)
    }

    pub fn get_shared_component<S: SharedComponent>(&self, entity: Entity) -> Result<&S> {
        self.components.get_shared_component(entity)
    }

    pub fn try_get_shared_component<S: SharedComponent>(&self, entity: Entity) -> Option<&S> {
        self.components.try_get_shared_component(entity)
    }

    pub fn has_shared_component<S: SharedComponent>(&self, entity: Entity) -> Result<bool> {
        self.components.has_shared_component::<S>(entity)
    }

    /// Read-only view of every non-empty matching block.
    pub fn filter_blocks<'a>(
        &'a self,
        query: &'a ComponentQuery,
    ) -> impl Iterator<Item = &'a Block> + 'a {
        self.components.filter_blocks(query)
    }

    /// Accessors over every non-empty matching block.
    pub fn blocks<'a>(&'a mut self, query: &'a ComponentQuery) -> Result<BlockIter<'a>> {
        self.components.blocks(query)
    }

    /// [`World::blocks`] without waiting on the sync point.
    pub fn blocks_no_sync<'a>(&'a mut self, query: &'a ComponentQuery) -> BlockIter<'a> {
        self.components.blocks_no_sync(query)
    }

    /// [`World::blocks`] restricted to blocks the filter accepts.
    pub fn blocks_changed<'a>(
        &'a mut self,
        query: &'a ComponentQuery,
        filter: ChangeFilter,
    ) -> Result<BlockIter<'a>> {
        self.components.blocks_changed(query, filter)
    }

    /// Run `f` over every non-empty matching block on scoped worker threads, one block per
    /// task. Returns once every block was processed; a panic in `f` resumes on the caller.
    pub fn par_for_each_block<F>(&mut self, query: &ComponentQuery, f: F) -> Result<()>
    where
        F: Fn(BlockAccessor<'_>) + Sync,
    {
        let (blocks, job) = self.components.blocks_for_jobs(query)?;
        let queue = SegQueue::new();
        for block in blocks {
            queue.push(block);
        }

        let workers = thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(queue.len());
        let (queue, f) = (&queue, &f);
        let result = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let job = job.clone();
                scope.spawn(move |_| {
                    let _job = job;
                    while let Some(block) = queue.pop() {
                        f(block);
                    }
                });
            }
        });
        drop(job);

        if let Err(panic) = result {
            std::panic::resume_unwind(panic);
        }
        Ok(())
    }

    /// Check that the entity index and the blocks agree.
    pub fn verify_invariants(&self) {
        self.components.verify_invariants();
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("components", &self.components)
            .finish()
    }
}
