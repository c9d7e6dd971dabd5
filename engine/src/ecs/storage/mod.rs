//! Chunked archetype storage.
//!
//! The [`ComponentManager`] is the central authority over entity data. It owns the archetype
//! block tables, the entity index and the block allocator, and performs every structural move:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ComponentManager                                               │
//! │  - create / destroy, add / remove component, queries            │
//! └────────┬───────────────────┬───────────────────┬────────────────┘
//!          │                   │                   │
//! ┌────────▼────────┐ ┌────────▼────────┐ ┌────────▼───────┐
//! │  Tables         │ │  EntityIndex    │ │  SyncPoint     │
//! │  - Archetype →  │ │  - Entity →     │ │  - thread      │
//! │    BlockTable   │ │    Location     │ │  - barrier     │
//! │  - edge cache   │ │  - versions     │ └────────────────┘
//! └────────┬────────┘ └─────────────────┘
//!          │
//! ┌────────▼────────┐       ┌─────────────────┐
//! │  Block          │◄──────┤  BlockAllocator │
//! │  - columns      │ rent  │  - size classes │
//! │  - swap-remove  │       │  - slabs        │
//! └─────────────────┘       └─────────────────┘
//! ```
//!
//! A structural change computes the target archetype, finds a block with room in the target
//! table, copies the entity's shared columns over as raw bytes, swap-removes it from its old
//! block and patches the entity index for both the moved entity and whichever entity filled
//! the hole. Every structural entry point passes the [`SyncPoint`] first, and notifications
//! are fired only once the change is committed.

pub mod alloc;
pub mod block;
mod config;
pub mod index;
pub mod location;
pub mod table;

use std::sync::Arc;

pub use alloc::{BlockAllocator, Rented, SizeClass};
pub use block::{Block, BlockLayout, ColumnLayout};
pub use config::Config;
pub use index::EntityIndex;
pub use location::Location;
pub use table::{BlockTable, Tables};

use crossbeam::channel::Receiver;

use crate::ecs::{
    archetype::Archetype,
    component::{self, Component, Index, Info, SharedComponent, SharedValue},
    entity::Entity,
    error::{Error, Result},
    event::{Event, Interest, Notifier},
    prefab::Prefab,
    query::{BlockIter, ChangeFilter, ComponentQuery},
    world::sync::{JobHandle, SyncPoint},
};

/// Owns and mutates all component data of a world.
pub struct ComponentManager {
    config: Config,
    allocator: BlockAllocator,
    tables: Tables,
    index: EntityIndex,
    sync: SyncPoint,
    notifier: Notifier,

    /// Last issued change version.
    version: u64,
}

impl Default for ComponentManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ComponentManager {
    pub fn new(config: Config) -> Self {
        Self {
            allocator: BlockAllocator::new(config.units_per_slab()),
            sync: SyncPoint::new(config.check_thread()),
            config,
            tables: Tables::new(),
            index: EntityIndex::new(),
            notifier: Notifier::new(),
            version: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }

    #[inline]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    #[inline]
    pub fn sync_point(&self) -> &SyncPoint {
        &self.sync
    }

    #[inline]
    pub fn sync_point_mut(&mut self) -> &mut SyncPoint {
        &mut self.sync
    }

    /// The last issued change version. Anything written later gets a larger version.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Receive every future event the interest covers.
    pub fn subscribe(&mut self, interest: Interest) -> Receiver<Event> {
        self.notifier.subscribe(interest)
    }

    /// Whether the handle names a live entity.
    #[inline]
    pub fn is_live(&self, entity: Entity) -> bool {
        self.index.contains(entity)
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct archetypes seen so far.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of blocks across all archetypes.
    pub fn block_count(&self) -> usize {
        self.tables.iter().map(|table| table.blocks().len()).sum()
    }

    /// Where a live entity is stored.
    #[inline]
    pub fn location_of(&self, entity: Entity) -> Result<Location> {
        self.index.get(entity).ok_or(Error::InvalidEntity(entity))
    }

    /// The archetype of a live entity.
    pub fn archetype_of(&self, entity: Entity) -> Result<&Arc<Archetype>> {
        let location = self.location_of(entity)?;
        Ok(self.tables[location.table()].archetype())
    }

    #[inline]
    fn block_at(&self, location: Location) -> &Block {
        &self.tables[location.table()].blocks()[location.block()]
    }

    #[inline]
    fn block_at_mut(&mut self, location: Location) -> &mut Block {
        &mut self.tables[location.table()].blocks_mut()[location.block()]
    }

    /// Store a new entity with zeroed components of `archetype`.
    ///
    /// Fails with [`Error::InvalidEntity`] for the null entity or one that is already live.
    pub fn add_entity(&mut self, entity: Entity, archetype: &Archetype) -> Result<()> {
        self.sync.enter()?;
        if entity.is_null() || self.index.contains(entity) {
            return Err(Error::InvalidEntity(entity));
        }

        let table = self.tables.find_or_create(archetype);
        let location = self.push_entity(entity, table)?;
        self.index.insert(entity, location);
        self.announce_created(entity, table);
        Ok(())
    }

    /// Store a new entity initialised from a prefab.
    pub fn instantiate(&mut self, entity: Entity, prefab: &Prefab) -> Result<()> {
        self.sync.enter()?;
        if entity.is_null() || self.index.contains(entity) {
            return Err(Error::InvalidEntity(entity));
        }

        let table = self.tables.find_or_create(prefab.archetype());
        let location = self.push_entity(entity, table)?;
        let version = self.version;
        let block = self.block_at_mut(location);
        for (index, bytes) in prefab.values() {
            block.write_slot_bytes(*index, location.slot(), bytes, version)?;
        }
        self.index.insert(entity, location);
        self.announce_created(entity, table);
        Ok(())
    }

    /// Append an entity to a block with room in `table`, stamping the block.
    fn push_entity(&mut self, entity: Entity, table: usize) -> Result<Location> {
        let block_index = self.tables[table].free_block_index(&self.allocator, &self.config)?;
        let version = self.next_version();
        let block = &mut self.tables[table].blocks_mut()[block_index];
        let slot = block.add_entity(entity);
        block.stamp_all(version);
        Ok(Location::new(table, block_index, slot))
    }

    fn announce_created(&mut self, entity: Entity, table: usize) {
        if !self.notifier.is_active() {
            return;
        }
        let archetype = self.tables[table].archetype();
        self.notifier.fire(Event::EntityCreated(entity));
        for info in archetype.components() {
            self.notifier.fire(Event::ComponentAdded {
                entity,
                component: info.index(),
            });
        }
        for value in archetype.shared_values() {
            self.notifier.fire(Event::SharedComponentAdded {
                entity,
                component: value.index(),
            });
        }
    }

    /// Remove a live entity and all of its components.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<()> {
        self.sync.enter()?;
        let location = self.location_of(entity)?;

        let mut events = Vec::new();
        if self.notifier.is_active() {
            let block = self.block_at(location);
            for info in block.archetype().components() {
                if self.notifier.wants_snapshot(info.index())
                    && let Some(bytes) = block.slot_bytes(info.index(), location.slot())
                {
                    events.push(Event::ComponentRemoved {
                        entity,
                        component: info.index(),
                        snapshot: bytes.to_vec(),
                    });
                }
            }
            events.extend(block.archetype().shared_values().iter().map(|value| {
                Event::SharedComponentRemoved {
                    entity,
                    component: value.index(),
                }
            }));
            events.push(Event::EntityDestroyed(entity));
        }

        let version = self.next_version();
        self.swap_remove(location, version);
        self.index.remove(entity);

        self.notifier.fire_all(events);
        Ok(())
    }

    /// Swap-remove the slot at `location` and patch the entity that filled it.
    fn swap_remove(&mut self, location: Location, version: u64) {
        let table = &mut self.tables[location.table()];
        let block = &mut table.blocks_mut()[location.block()];
        if let Some(moved) = block.remove_entity_move_last(location.slot()) {
            block.stamp_all(version);
            self.index.relocate(moved, location);
        }
        table.note_free(location.block());

        #[cfg(debug_assertions)]
        self.tables[location.table()].blocks()[location.block()].verify_invariants();
    }

    /// Move a live entity into a block of `target`, keeping every column both archetypes
    /// share. Returns the new location.
    fn move_entity(
        &mut self,
        entity: Entity,
        from: Location,
        target: usize,
        version: u64,
    ) -> Result<Location> {
        let block_index = self.tables[target].free_block_index(&self.allocator, &self.config)?;
        let (source, destination) = self.tables.pair_mut(from.table(), target);

        let dst_block = &mut destination.blocks_mut()[block_index];
        let slot = source.blocks()[from.block()].copy_entity_to(from.slot(), dst_block);
        dst_block.stamp_all(version);

        let src_block = &mut source.blocks_mut()[from.block()];
        if let Some(moved) = src_block.remove_entity_move_last(from.slot()) {
            src_block.stamp_all(version);
            self.index.relocate(moved, from);
        }
        source.note_free(from.block());

        let to = Location::new(target, block_index, slot);
        self.index.relocate(entity, to);
        Ok(to)
    }

    /// Add plain component `T`, or overwrite it if already present.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        let info = component::info_of::<T>()?;
        self.add_component_bytes(entity, info, bytemuck::bytes_of(&value))
    }

    /// Untyped form of [`ComponentManager::add_component`].
    pub fn add_component_bytes(&mut self, entity: Entity, info: Info, bytes: &[u8]) -> Result<()> {
        self.sync.enter()?;
        let location = self.location_of(entity)?;
        if bytes.len() != info.size() {
            return Err(Error::ComponentSizeMismatch {
                component: info.name(),
                expected: info.size(),
                actual: bytes.len(),
            });
        }

        if self.tables[location.table()]
            .archetype()
            .has_index(info.index())
        {
            let version = self.next_version();
            return self.block_at_mut(location).write_slot_bytes(
                info.index(),
                location.slot(),
                bytes,
                version,
            );
        }

        let target = self.tables.add_edge(location.table(), info)?;
        let version = self.next_version();
        let location = self.move_entity(entity, location, target, version)?;
        self.block_at_mut(location)
            .write_slot_bytes(info.index(), location.slot(), bytes, version)?;

        self.notifier.fire(Event::ComponentAdded {
            entity,
            component: info.index(),
        });
        Ok(())
    }

    /// Overwrite plain component `T`. Fails with [`Error::ComponentNotFound`] if absent.
    ///
    /// Writes are not structural, so they skip the job barrier but still hold to the mutator
    /// thread.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        *self.get_component_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Untyped form of [`ComponentManager::set_component`].
    pub fn set_component_bytes(&mut self, entity: Entity, index: Index, bytes: &[u8]) -> Result<()> {
        self.sync.check_thread()?;
        let location = self.location_of(entity)?;
        let version = self.next_version();
        self.block_at_mut(location)
            .write_slot_bytes(index, location.slot(), bytes, version)
    }

    /// Remove plain component `T`. Removing an absent component is a no-op.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<()> {
        let index = component::index_of::<T>()?;
        self.remove_component_index(entity, index)
    }

    /// Untyped form of [`ComponentManager::remove_component`].
    pub fn remove_component_index(&mut self, entity: Entity, index: Index) -> Result<()> {
        self.sync.enter()?;
        let location = self.location_of(entity)?;
        if !self.tables[location.table()].archetype().has_index(index) {
            return Ok(());
        }

        let snapshot = self
            .notifier
            .wants_snapshot(index)
            .then(|| self.block_at(location).slot_bytes(index, location.slot()))
            .flatten()
            .map(<[u8]>::to_vec);

        let target = self.tables.remove_edge(location.table(), index)?;
        let version = self.next_version();
        self.move_entity(entity, location, target, version)?;

        if let Some(snapshot) = snapshot {
            self.notifier.fire(Event::ComponentRemoved {
                entity,
                component: index,
                snapshot,
            });
        }
        Ok(())
    }

    /// Attach a shared value, moving the entity to the archetype holding it. Replacing another
    /// value of the same kind reports the removal before the addition; attaching an equal value
    /// is a no-op.
    pub fn add_shared_component<S: SharedComponent>(
        &mut self,
        entity: Entity,
        value: S,
    ) -> Result<()> {
        self.add_shared_value(entity, SharedValue::new(value)?)
    }

    /// Untyped form of [`ComponentManager::add_shared_component`].
    pub fn add_shared_value(&mut self, entity: Entity, value: SharedValue) -> Result<()> {
        self.sync.enter()?;
        let location = self.location_of(entity)?;
        let current = self.tables[location.table()].archetype();
        if current.shared_value(value.index()) == Some(&value) {
            return Ok(());
        }

        let component = value.index();
        let replaced = current.has_shared_index(component);
        let archetype = current.set_shared_value(value)?;
        let target = self.tables.find_or_create(&archetype);
        let version = self.next_version();
        self.move_entity(entity, location, target, version)?;

        if replaced {
            self.notifier
                .fire(Event::SharedComponentRemoved { entity, component });
        }
        self.notifier
            .fire(Event::SharedComponentAdded { entity, component });
        Ok(())
    }

    /// Detach shared kind `S`. Removing an absent kind is a no-op.
    pub fn remove_shared_component<S: SharedComponent>(&mut self, entity: Entity) -> Result<()> {
        let index = component::shared_index_of::<S>()?;
        self.remove_shared_index(entity, index)
    }

    /// Untyped form of [`ComponentManager::remove_shared_component`].
    pub fn remove_shared_index(&mut self, entity: Entity, index: Index) -> Result<()> {
        self.sync.enter()?;
        let location = self.location_of(entity)?;
        let current = self.tables[location.table()].archetype();
        if !current.has_shared_index(index) {
            return Ok(());
        }

        let archetype = current.remove_shared_index(index)?;
        let target = self.tables.find_or_create(&archetype);
        let version = self.next_version();
        self.move_entity(entity, location, target, version)?;

        self.notifier.fire(Event::SharedComponentRemoved {
            entity,
            component: index,
        });
        Ok(())
    }

    /// Read plain component `T` of a live entity.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T> {
        let location = self.location_of(entity)?;
        let column = self.block_at(location).column::<T>()?;
        Ok(&column[location.slot()])
    }

    /// Write plain component `T` of a live entity. Stamps the column.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        self.sync.check_thread()?;
        let location = self.location_of(entity)?;
        let version = self.next_version();
        let column = self.block_at_mut(location).column_mut::<T>(version)?;
        Ok(&mut column[location.slot()])
    }

    /// [`ComponentManager::get_component`] without the error.
    #[inline]
    pub fn try_get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get_component(entity).ok()
    }

    /// Whether a live entity has plain component `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool> {
        Ok(self.archetype_of(entity)?.has::<T>())
    }

    /// The raw bytes of one component of a live entity.
    pub(crate) fn component_bytes(&self, entity: Entity, index: Index) -> Result<&[u8]> {
        let location = self.location_of(entity)?;
        self.block_at(location)
            .slot_bytes(index, location.slot())
            .ok_or(Error::ComponentNotFound(
                component::registry()
                    .info(index)
                    .map_or("<unregistered>", |info| info.name()),
            ))
    }

    /// The shared value of kind `S` of a live entity.
    pub fn get_shared_component<S: SharedComponent>(&self, entity: Entity) -> Result<&S> {
        component::shared_index_of::<S>()?;
        self.archetype_of(entity)?
            .shared::<S>()
            .ok_or(Error::SharedComponentNotFound(std::any::type_name::<S>()))
    }

    #[inline]
    pub fn try_get_shared_component<S: SharedComponent>(&self, entity: Entity) -> Option<&S> {
        self.get_shared_component(entity).ok()
    }

    /// Whether a live entity has shared kind `S`.
    pub fn has_shared_component<S: SharedComponent>(&self, entity: Entity) -> Result<bool> {
        Ok(self.archetype_of(entity)?.has_shared::<S>())
    }

    /// Every non-empty block of every archetype the query matches.
    ///
    /// Re-scans on every call. No structural change can happen while the iterator is alive.
    pub fn filter_blocks<'a>(
        &'a self,
        query: &'a ComponentQuery,
    ) -> impl Iterator<Item = &'a Block> + 'a {
        self.tables
            .iter()
            .filter(move |table| query.matches(table.archetype()))
            .flat_map(|table| table.blocks())
            .filter(|block| !block.is_empty())
    }

    /// Accessors over every matching non-empty block, after the sync point.
    pub fn blocks<'a>(&'a mut self, query: &'a ComponentQuery) -> Result<BlockIter<'a>> {
        self.sync.enter()?;
        Ok(self.blocks_no_sync(query))
    }

    /// [`ComponentManager::blocks`] without the sync point, for callers that already keep
    /// structural changes away from the iteration.
    pub fn blocks_no_sync<'a>(&'a mut self, query: &'a ComponentQuery) -> BlockIter<'a> {
        let version = self.next_version();
        BlockIter::new(self.tables.iter_mut(), query, None, version)
    }

    /// [`ComponentManager::blocks`], skipping blocks the filter rejects.
    pub fn blocks_changed<'a>(
        &'a mut self,
        query: &'a ComponentQuery,
        filter: ChangeFilter,
    ) -> Result<BlockIter<'a>> {
        self.sync.enter()?;
        let version = self.next_version();
        Ok(BlockIter::new(
            self.tables.iter_mut(),
            query,
            Some(filter),
            version,
        ))
    }

    /// [`ComponentManager::blocks`] plus a job handle covering the whole iteration.
    pub(crate) fn blocks_for_jobs<'a>(
        &'a mut self,
        query: &'a ComponentQuery,
    ) -> Result<(BlockIter<'a>, JobHandle)> {
        self.sync.enter()?;
        let job = self.sync.begin_job();
        let version = self.next_version();
        Ok((
            BlockIter::new(self.tables.iter_mut(), query, None, version),
            job,
        ))
    }

    /// Check that the entity index and the blocks agree.
    pub fn verify_invariants(&self) {
        let mut live = 0;
        for (t, table) in self.tables.iter().enumerate() {
            for (b, block) in table.blocks().iter().enumerate() {
                block.verify_invariants();
                for (slot, entity) in block.entities().iter().enumerate() {
                    assert_eq!(
                        self.index.get(*entity),
                        Some(Location::new(t, b, slot)),
                        "index disagrees with block for {entity}"
                    );
                    live += 1;
                }
            }
        }
        assert_eq!(live, self.index.len(), "index counts dead entities as live");
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("entities", &self.index.len())
            .field("tables", &self.tables.len())
            .field("version", &self.version)
            .finish()
    }
}
