use std::{cell::Cell, marker::PhantomData, ptr::NonNull, slice};

use crate::ecs::{
    archetype::Archetype,
    bitset::BitSet256,
    component::{self, Component, Index, SharedComponent},
    entity::Entity,
    error::{AccessMode, Error, Result},
    query::ComponentQuery,
    storage::{block::Block, table::BlockTable},
};

/// Skips blocks whose listed columns were not written after a version.
///
/// A block passes when any listed column changed. Versions come from
/// [`World::version`](crate::ecs::World::version).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFilter {
    components: BitSet256,
    since: u64,
}

impl ChangeFilter {
    /// Pass blocks whose `T` column was written after `since`.
    pub fn changed<T: Component>(since: u64) -> Result<Self> {
        let mut components = BitSet256::new();
        components.set(component::index_of::<T>()?.index());
        Ok(Self { components, since })
    }

    /// Also pass blocks whose `T` column was written after the same version.
    pub fn or_changed<T: Component>(mut self) -> Result<Self> {
        self.components.set(component::index_of::<T>()?.index());
        Ok(self)
    }

    #[inline]
    pub fn since(&self) -> u64 {
        self.since
    }

    /// Whether the block passes.
    pub fn accepts(&self, block: &Block) -> bool {
        self.components
            .iter()
            .any(|index| block.changed_since(Index::new(index as u8), self.since))
    }
}

/// Query scoped access to the live slots of one block.
///
/// Column views are sliced to the live entities and only granted for kinds the query declared:
/// reading needs an include, writing needs `include_mut`. Violations fail with
/// [`Error::IllegalAccess`], whether or not the block happens to hold the kind.
///
/// Writable columns were stamped with the iteration version when the accessor was created, so
/// handing an accessor to a worker never touches shared version state.
///
/// One accessor never lends aliasing views: a column lent for writing cannot be lent again,
/// and a column lent for reading cannot later be lent for writing. Violations panic, like a
/// `RefCell` borrow would.
///
/// Accessors are `Send`, so blocks can be processed on worker threads, but not `Sync`.
pub struct BlockAccessor<'a> {
    block: NonNull<Block>,
    query: &'a ComponentQuery,
    read: Cell<BitSet256>,
    written: Cell<BitSet256>,
    _marker: PhantomData<&'a mut Block>,
}

// SAFETY: the accessor holds the only access path to its block for `'a`, like `&'a mut Block`.
unsafe impl Send for BlockAccessor<'_> {}

impl<'a> BlockAccessor<'a> {
    /// Wrap a block, stamping every writable declared column with `version`.
    pub(crate) fn new(block: &'a mut Block, query: &'a ComponentQuery, version: u64) -> Self {
        for index in query.writes().iter() {
            block.stamp(Index::new(index as u8), version);
        }
        Self {
            block: NonNull::from(block),
            query,
            read: Cell::new(BitSet256::EMPTY),
            written: Cell::new(BitSet256::EMPTY),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn block(&self) -> &Block {
        // SAFETY: valid for 'a, and this accessor only hands out disjoint column views.
        unsafe { self.block.as_ref() }
    }

    /// Number of live entities in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.block().size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live entities, slot order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        self.block().entities()
    }

    #[inline]
    pub fn archetype(&self) -> &Archetype {
        self.block().archetype()
    }

    /// Whether the block holds plain component `T`.
    #[inline]
    pub fn has<T: Component>(&self) -> bool {
        self.archetype().has::<T>()
    }

    /// Version of the last write to `T`'s column.
    pub fn version_of<T: Component>(&self) -> Option<u64> {
        self.block()
            .column_version(component::index_of::<T>().ok()?)
    }

    /// Read the `T` column of the live slots.
    ///
    /// # Panics
    /// Panics if this accessor already lent `T` for writing.
    pub fn components<T: Component>(&self) -> Result<&[T]> {
        let index = component::index_of::<T>()?;
        if !self.query.does_include(index) {
            return Err(Error::IllegalAccess {
                component: std::any::type_name::<T>(),
                mode: AccessMode::Read,
            });
        }
        let ptr = self.block().column_ptr::<T>()?;
        self.lend::<T>(index, AccessMode::Read);
        // SAFETY: the column holds `len()` initialised values, and no mutable view of it exists.
        Ok(unsafe { slice::from_raw_parts(ptr, self.len()) })
    }

    /// Write the `T` column of the live slots.
    ///
    /// # Panics
    /// Panics if this accessor already lent `T`.
    #[allow(clippy::mut_from_ref)]
    pub fn components_mut<T: Component>(&self) -> Result<&mut [T]> {
        let index = component::index_of::<T>()?;
        if !self.query.does_include_write(index) {
            return Err(Error::IllegalAccess {
                component: std::any::type_name::<T>(),
                mode: AccessMode::Write,
            });
        }
        let ptr = self.block().column_ptr::<T>()?;
        self.lend::<T>(index, AccessMode::Write);
        // SAFETY: the accessor exclusively owns the block for 'a and this is the only view of
        // the column it will ever lend.
        Ok(unsafe { slice::from_raw_parts_mut(ptr, self.len()) })
    }

    /// The block's value of shared kind `S`.
    pub fn shared<S: SharedComponent>(&self) -> Result<&S> {
        let index = component::shared_index_of::<S>()?;
        if !self.query.does_include_shared(index) {
            return Err(Error::IllegalAccess {
                component: std::any::type_name::<S>(),
                mode: AccessMode::Read,
            });
        }
        self.archetype()
            .shared::<S>()
            .ok_or(Error::SharedComponentNotFound(std::any::type_name::<S>()))
    }

    fn lend<T>(&self, index: Index, mode: AccessMode) {
        let bit = index.index();
        let mut read = self.read.get();
        let mut written = self.written.get();
        match mode {
            AccessMode::Read => {
                assert!(
                    !written.get(bit),
                    "{} is already lent for writing by this accessor",
                    std::any::type_name::<T>()
                );
                read.set(bit);
                self.read.set(read);
            }
            AccessMode::Write => {
                assert!(
                    !written.get(bit) && !read.get(bit),
                    "{} is already lent by this accessor",
                    std::any::type_name::<T>()
                );
                written.set(bit);
                self.written.set(written);
            }
        }
    }
}

impl std::fmt::Debug for BlockAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAccessor")
            .field("archetype", self.archetype())
            .field("len", &self.len())
            .finish()
    }
}

/// Yields an accessor for every non-empty block of every archetype a query matches.
pub struct BlockIter<'a> {
    tables: slice::IterMut<'a, BlockTable>,
    blocks: slice::IterMut<'a, Block>,
    query: &'a ComponentQuery,
    filter: Option<ChangeFilter>,
    version: u64,
}

impl<'a> BlockIter<'a> {
    pub(crate) fn new(
        tables: slice::IterMut<'a, BlockTable>,
        query: &'a ComponentQuery,
        filter: Option<ChangeFilter>,
        version: u64,
    ) -> Self {
        Self {
            tables,
            blocks: Default::default(),
            query,
            filter,
            version,
        }
    }

    /// The version writable columns are stamped with.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = BlockAccessor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.blocks.next() {
                if block.is_empty() {
                    continue;
                }
                if let Some(filter) = &self.filter
                    && !filter.accepts(block)
                {
                    continue;
                }
                return Some(BlockAccessor::new(block, self.query, self.version));
            }

            let table = self.tables.next()?;
            if self.query.matches(table.archetype()) {
                self.blocks = table.blocks_mut().iter_mut();
            }
        }
    }
}
