//! Archetype block tables.
//!
//! Every distinct [`Archetype`] owns one [`BlockTable`]: the list of blocks holding its
//! entities. [`Tables`] maps archetypes to their table by structural key and caches the
//! add/remove component edges between tables, so repeated structural moves along the same
//! edge skip the archetype edit and the map lookup.

use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::ecs::{
    archetype::Archetype,
    component::{Index, Info},
    error::{Error, Result},
    storage::{Config, alloc::BlockAllocator, block::Block},
};

/// The blocks of one archetype.
pub struct BlockTable {
    archetype: Arc<Archetype>,
    blocks: Vec<Block>,

    /// The block most recently found to have room.
    last_free: Option<usize>,

    /// Table reached by adding a plain component kind.
    add_edges: HashMap<Index, usize>,

    /// Table reached by removing a plain component kind.
    remove_edges: HashMap<Index, usize>,
}

impl BlockTable {
    pub fn new(archetype: Arc<Archetype>) -> Self {
        Self {
            archetype,
            blocks: Vec::new(),
            last_free: None,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    #[inline]
    pub fn archetype(&self) -> &Arc<Archetype> {
        &self.archetype
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    #[inline]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    #[inline]
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Number of live entities across all blocks.
    pub fn entity_count(&self) -> usize {
        self.blocks.iter().map(Block::size).sum()
    }

    /// Index of a block with room, creating one if necessary.
    ///
    /// Tries the cached last free block, then scans newest first, then rents a new block.
    /// The first block of a table uses `config.first_block()`, later ones
    /// `config.growth_block()`; either is bumped to the smallest class one entity fits in.
    pub fn free_block_index(
        &mut self,
        allocator: &BlockAllocator,
        config: &Config,
    ) -> Result<usize> {
        if let Some(index) = self.last_free
            && self.blocks.get(index).is_some_and(Block::has_room)
        {
            return Ok(index);
        }

        if let Some(index) = self.blocks.iter().rposition(Block::has_room) {
            self.last_free = Some(index);
            return Ok(index);
        }

        let preferred = if self.blocks.is_empty() {
            config.first_block()
        } else {
            config.growth_block()
        };
        let class = preferred
            .and_larger()
            .find(|class| Block::layout(&self.archetype, class.bytes()).is_some())
            .ok_or(Error::ArchetypeTooLarge {
                bytes_per_entity: self.archetype.bytes_per_entity(),
            })?;

        let block = Block::new(Arc::clone(&self.archetype), allocator.rent(class))?;
        debug!(
            "new {class:?} block #{} for {:?} ({} entities)",
            self.blocks.len(),
            self.archetype,
            block.max_size()
        );
        self.blocks.push(block);
        let index = self.blocks.len() - 1;
        self.last_free = Some(index);
        Ok(index)
    }

    /// Remember a block that just gained room.
    #[inline]
    pub(crate) fn note_free(&mut self, block: usize) {
        self.last_free = Some(block);
    }
}

impl std::fmt::Debug for BlockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTable")
            .field("archetype", &self.archetype)
            .field("blocks", &self.blocks.len())
            .field("entities", &self.entity_count())
            .finish()
    }
}

/// Every block table of a world, keyed by archetype.
#[derive(Debug, Default)]
pub struct Tables {
    tables: Vec<BlockTable>,
    by_archetype: HashMap<Arc<Archetype>, usize>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the table for `archetype`, creating the table on a miss.
    pub fn find_or_create(&mut self, archetype: &Archetype) -> usize {
        if let Some(index) = self.by_archetype.get(archetype) {
            return *index;
        }

        let archetype = Arc::new(archetype.clone());
        let index = self.tables.len();
        debug!("new block table #{index} for {archetype:?}");
        self.tables.push(BlockTable::new(Arc::clone(&archetype)));
        self.by_archetype.insert(archetype, index);
        index
    }

    /// Index of the table for `archetype`, if one exists.
    #[inline]
    pub fn find(&self, archetype: &Archetype) -> Option<usize> {
        self.by_archetype.get(archetype).copied()
    }

    /// The table reached from `table` by adding a plain component kind.
    pub fn add_edge(&mut self, table: usize, info: Info) -> Result<usize> {
        if let Some(target) = self.tables[table].add_edges.get(&info.index()) {
            return Ok(*target);
        }
        let archetype = self.tables[table].archetype.add_info(info)?;
        let target = self.find_or_create(&archetype);
        self.tables[table].add_edges.insert(info.index(), target);
        self.tables[target].remove_edges.insert(info.index(), table);
        Ok(target)
    }

    /// The table reached from `table` by removing a plain component kind.
    pub fn remove_edge(&mut self, table: usize, index: Index) -> Result<usize> {
        if let Some(target) = self.tables[table].remove_edges.get(&index) {
            return Ok(*target);
        }
        let archetype = self.tables[table].archetype.remove_index(index)?;
        let target = self.find_or_create(&archetype);
        self.tables[table].remove_edges.insert(index, target);
        self.tables[target].add_edges.insert(index, table);
        Ok(target)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&BlockTable> {
        self.tables.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockTable> {
        self.tables.get_mut(index)
    }

    /// Two distinct tables at once.
    ///
    /// # Panics
    /// Panics if `a == b` or either is out of range.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut BlockTable, &mut BlockTable) {
        assert_ne!(a, b, "pair_mut on a single table");
        if a < b {
            let (left, right) = self.tables.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.tables.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, BlockTable> {
        self.tables.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, BlockTable> {
        self.tables.iter_mut()
    }

    /// Number of tables (distinct archetypes seen).
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl std::ops::Index<usize> for Tables {
    type Output = BlockTable;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tables[index]
    }
}

impl std::ops::IndexMut<usize> for Tables {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.tables[index]
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};
    use rusty_macros::{Component, SharedComponent};

    use super::*;
    use crate::ecs::{
        component::{self, register, register_shared},
        entity::Entity,
        storage::alloc::SizeClass,
    };

    #[derive(Component, Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Component, Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Huge([u64; 4096]);

    #[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
    struct Team(u8);

    fn setup() {
        register::<Position>().unwrap();
        register::<Velocity>().unwrap();
        register::<Huge>().unwrap();
        register_shared::<Team>().unwrap();
    }

    #[test]
    fn find_or_create_dedups_by_structure() {
        // Given
        setup();
        let mut tables = Tables::new();
        let a = Archetype::empty().add::<Position>().unwrap();
        let b = Archetype::empty()
            .add::<Position>()
            .unwrap()
            .add_shared(Team(1))
            .unwrap();

        // When
        let ta = tables.find_or_create(&a);
        let tb = tables.find_or_create(&b);
        let ta_again = tables.find_or_create(&a.clone());
        let tb_again = tables.find_or_create(&a.add_shared(Team(1)).unwrap());

        // Then
        assert_ne!(ta, tb);
        assert_eq!(ta, ta_again);
        assert_eq!(tb, tb_again);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables.find(&a.add_shared(Team(2)).unwrap()), None);
    }

    #[test]
    fn edges_are_cached_both_ways() {
        // Given
        setup();
        let mut tables = Tables::new();
        let base = tables.find_or_create(&Archetype::empty().add::<Position>().unwrap());
        let velocity = component::info_of::<Velocity>().unwrap();

        // When
        let with_velocity = tables.add_edge(base, velocity).unwrap();

        // Then
        assert!(tables[with_velocity].archetype().has::<Velocity>());
        assert_eq!(tables.add_edge(base, velocity).unwrap(), with_velocity);
        assert_eq!(
            tables.remove_edge(with_velocity, velocity.index()).unwrap(),
            base
        );
        assert_eq!(tables.len(), 2);
        assert!(matches!(
            tables.remove_edge(base, velocity.index()),
            Err(Error::InvalidArchetypeEdit { .. })
        ));
    }

    #[test]
    fn free_block_reuses_then_grows() {
        // Given
        setup();
        let allocator = BlockAllocator::new(4);
        let config = Config::default();
        let archetype = Arc::new(Archetype::empty().add::<Position>().unwrap());
        let mut table = BlockTable::new(archetype);

        // When - the first block fills up
        let first = table.free_block_index(&allocator, &config).unwrap();
        let capacity = table.blocks()[first].max_size();
        for id in 1..=capacity as u32 {
            let index = table.free_block_index(&allocator, &config).unwrap();
            table.blocks_mut()[index].add_entity(Entity::new(id, 1));
        }

        // Then - every entity went to the first, smallest block
        assert_eq!(table.blocks().len(), 1);
        assert_eq!(allocator.rented_count(SizeClass::Kb16), 1);

        // When
        let second = table.free_block_index(&allocator, &config).unwrap();

        // Then - the next block uses the growth class
        assert_eq!(second, 1);
        assert_eq!(allocator.rented_count(SizeClass::Kb64), 1);
        assert!(table.blocks()[second].max_size() > capacity);
        assert_eq!(table.entity_count(), capacity);
    }

    #[test]
    fn free_block_scans_for_room() {
        // Given - two blocks, the second full, the first with a hole
        setup();
        let allocator = BlockAllocator::new(4);
        let config = Config::default()
            .with_first_block(SizeClass::Kb16)
            .with_growth_block(SizeClass::Kb16);
        let mut table = BlockTable::new(Arc::new(Archetype::empty()));
        let mut id = 1;
        while table.blocks().len() < 2 || table.blocks()[1].has_room() {
            let index = table.free_block_index(&allocator, &config).unwrap();
            table.blocks_mut()[index].add_entity(Entity::new(id, 1));
            id += 1;
        }
        table.blocks_mut()[0].remove_entity_move_last(3);

        // When
        let index = table.free_block_index(&allocator, &config).unwrap();

        // Then
        assert_eq!(index, 0);
        assert_eq!(table.blocks().len(), 2);
    }

    #[test]
    fn large_archetype_bumps_size_class() {
        // Given - 32 KiB + 8 bytes per entity only fits a 64 KiB block
        setup();
        let allocator = BlockAllocator::new(1);
        let archetype = Archetype::empty().add::<Huge>().unwrap();
        let mut table = BlockTable::new(Arc::new(archetype));
        let config = Config::default().with_first_block(SizeClass::Kb16);

        // When
        let index = table.free_block_index(&allocator, &config).unwrap();

        // Then
        assert_eq!(table.blocks()[index].max_size(), 1);
        assert_eq!(allocator.rented_count(SizeClass::Kb16), 0);
        assert_eq!(allocator.rented_count(SizeClass::Kb64), 1);
    }
}
