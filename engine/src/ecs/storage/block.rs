//! Fixed capacity columnar storage for the entities of one archetype.
//!
//! A [`Block`] owns a single rented buffer and slices it into an entity column followed by one
//! column per plain component kind of its archetype:
//!
//! ```text
//! offset 0
//! ┌──────────────────────┬─pad─┬──────────────────────┬─pad─┬──────────────────────┐
//! │ Entity  x max_size   │     │ C0  x max_size       │     │ C1  x max_size       │
//! └──────────────────────┴─────┴──────────────────────┴─────┴──────────────────────┘
//! ```
//!
//! Slots `[0, size)` hold live entities, slots `[size, max_size)` are always zero. Removal
//! swaps the last live slot into the hole so the live prefix stays dense.
//!
//! Components are `Pod`, so every structural move is a raw byte copy between columns and the
//! zeroed tail is a valid value of every column type. Raw slot bytes never leave the crate.

use std::{mem, ops::Range, slice, sync::Arc};

use crate::ecs::{
    archetype::Archetype,
    component::{self, Component, Index, Info},
    entity::Entity,
    error::{Error, Result},
    storage::alloc::Rented,
};

/// Rounds `offset` up to a multiple of `align`.
#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Placement of one component column inside a block buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    info: Info,
    offset: usize,
}

impl ColumnLayout {
    #[inline]
    pub fn info(&self) -> Info {
        self.info
    }

    /// Byte offset of the column from the start of the buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The deterministic column layout of an archetype in a buffer of a given size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    max_size: usize,
    columns: Vec<ColumnLayout>,
}

impl BlockLayout {
    /// Lay out `archetype` in `bytes` bytes, or `None` if not even one entity fits.
    ///
    /// Capacity starts at `bytes / bytes_per_entity` and shrinks until the alignment padding
    /// between columns fits as well.
    pub fn compute(archetype: &Archetype, bytes: usize) -> Option<Self> {
        let mut max_size = bytes / archetype.bytes_per_entity();

        while max_size > 0 {
            let mut end = mem::size_of::<Entity>() * max_size;
            let mut columns = Vec::with_capacity(archetype.components().len());
            for info in archetype.components() {
                let offset = align_up(end, info.align());
                columns.push(ColumnLayout {
                    info: *info,
                    offset,
                });
                end = offset + info.size() * max_size;
            }
            if end <= bytes {
                return Some(Self { max_size, columns });
            }
            max_size -= 1;
        }
        None
    }

    /// Number of entities the layout holds.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Component columns, in archetype order.
    #[inline]
    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }
}

/// A component column of a live block.
#[derive(Debug)]
struct Column {
    index: Index,
    name: &'static str,
    size: usize,
    offset: usize,
    /// Global version of the last write to this column.
    version: u64,
}

/// A chunk of entities of one archetype.
pub struct Block {
    archetype: Arc<Archetype>,
    buffer: Rented,
    max_size: usize,
    size: usize,
    /// Sorted by component index, same order as the archetype.
    columns: Vec<Column>,
}

impl Block {
    /// Lay out `archetype` in the buffer. The buffer is zeroed.
    ///
    /// Fails with [`Error::ArchetypeTooLarge`] if not one entity fits.
    pub fn new(archetype: Arc<Archetype>, mut buffer: Rented) -> Result<Self> {
        let layout = BlockLayout::compute(&archetype, buffer.len()).ok_or(
            Error::ArchetypeTooLarge {
                bytes_per_entity: archetype.bytes_per_entity(),
            },
        )?;

        buffer.as_mut_slice().fill(0);

        let columns = layout
            .columns
            .iter()
            .map(|column| Column {
                index: column.info.index(),
                name: column.info.name(),
                size: column.info.size(),
                offset: column.offset,
                version: 0,
            })
            .collect();

        Ok(Self {
            archetype,
            buffer,
            max_size: layout.max_size,
            size: 0,
            columns,
        })
    }

    /// See [`BlockLayout::compute`].
    #[inline]
    pub fn layout(archetype: &Archetype, bytes: usize) -> Option<BlockLayout> {
        BlockLayout::compute(archetype, bytes)
    }

    #[inline]
    pub fn archetype(&self) -> &Arc<Archetype> {
        &self.archetype
    }

    /// Number of live entities.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Capacity in entities.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn has_room(&self) -> bool {
        self.size < self.max_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append an entity and return its slot. Component values of the new slot are zero.
    ///
    /// # Panics
    /// Panics if the block is full or the entity is null.
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        assert!(self.has_room(), "block is full ({} entities)", self.max_size);
        assert!(!entity.is_null(), "cannot store the null entity");

        let slot = self.size;
        self.entity_column_mut()[slot] = entity;
        self.size += 1;
        slot
    }

    /// Remove the entity at `slot` by moving the last live entity into it.
    ///
    /// Returns the entity that changed slot, if any. The vacated last slot is zeroed.
    ///
    /// # Panics
    /// Panics if `slot` is not live.
    pub fn remove_entity_move_last(&mut self, slot: usize) -> Option<Entity> {
        assert!(slot < self.size, "slot {slot} is not live (size {})", self.size);

        let last = self.size - 1;
        let mut moved = None;
        if slot != last {
            let entity = self.entity_column()[last];
            self.entity_column_mut()[slot] = entity;
            let bytes = self.buffer.as_mut_slice();
            for column in &self.columns {
                let from = column.offset + last * column.size;
                bytes.copy_within(from..from + column.size, column.offset + slot * column.size);
            }
            moved = Some(entity);
        }

        self.entity_column_mut()[last] = Entity::NULL;
        let bytes = self.buffer.as_mut_slice();
        for column in &self.columns {
            let from = column.offset + last * column.size;
            bytes[from..from + column.size].fill(0);
        }
        self.size -= 1;
        moved
    }

    /// Append the entity at `slot` to `other` and copy every column the two blocks share.
    ///
    /// Columns only present here are dropped, columns only present in `other` stay zero.
    /// Returns the entity's slot in `other`. The entity is not removed from this block.
    pub fn copy_entity_to(&self, slot: usize, other: &mut Block) -> usize {
        assert!(slot < self.size, "slot {slot} is not live (size {})", self.size);

        let entity = self.entity_column()[slot];
        let new_slot = other.add_entity(entity);

        let src = self.buffer.as_slice();
        let dst = other.buffer.as_mut_slice();
        let (mut i, mut j) = (0, 0);
        while i < self.columns.len() && j < other.columns.len() {
            let (from, to) = (&self.columns[i], &other.columns[j]);
            match from.index.cmp(&to.index) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    debug_assert_eq!(from.size, to.size);
                    let at = from.offset + slot * from.size;
                    let into = to.offset + new_slot * to.size;
                    dst[into..into + to.size].copy_from_slice(&src[at..at + from.size]);
                    i += 1;
                    j += 1;
                }
            }
        }
        new_slot
    }

    /// The live entities.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entity_column()[..self.size]
    }

    /// The whole entity column, `max_size` long.
    #[inline]
    pub fn entity_column(&self) -> &[Entity] {
        // SAFETY: the entity column starts at offset 0 of a 32 byte aligned buffer, holds
        // `max_size` entities, and every bit pattern is a valid `Entity`.
        unsafe { slice::from_raw_parts(self.buffer.as_ptr() as *const Entity, self.max_size) }
    }

    #[inline]
    fn entity_column_mut(&mut self) -> &mut [Entity] {
        // SAFETY: as in `entity_column`, with `&mut self` for exclusivity.
        unsafe { slice::from_raw_parts_mut(self.buffer.as_ptr() as *mut Entity, self.max_size) }
    }

    /// The column of `T`, `max_size` long. Slots past [`Block::size`] are zero.
    pub fn column<T: Component>(&self) -> Result<&[T]> {
        let ptr = self.column_ptr::<T>()?;
        // SAFETY: see `column_ptr`.
        Ok(unsafe { slice::from_raw_parts(ptr, self.max_size) })
    }

    /// The column of `T` for writing, stamped with `version`.
    pub fn column_mut<T: Component>(&mut self, version: u64) -> Result<&mut [T]> {
        let ptr = self.column_ptr::<T>()?;
        let position = self.position_of::<T>()?;
        self.columns[position].version = version;
        // SAFETY: see `column_ptr`, with `&mut self` for exclusivity.
        Ok(unsafe { slice::from_raw_parts_mut(ptr, self.max_size) })
    }

    /// Pointer to the first `T` of its column.
    ///
    /// The pointer is aligned for `T` and valid for `max_size` reads of `T`, since the column
    /// was laid out with `T`'s size and alignment and the buffer is fully initialised.
    /// Writing through it requires exclusive access to the column.
    pub(crate) fn column_ptr<T: Component>(&self) -> Result<*mut T> {
        let position = self.position_of::<T>()?;
        let column = &self.columns[position];
        debug_assert_eq!(column.size, mem::size_of::<T>());
        // SAFETY: the offset lies inside the buffer by construction of the layout.
        Ok(unsafe { self.buffer.as_ptr().add(column.offset) } as *mut T)
    }

    fn position_of<T: Component>(&self) -> Result<usize> {
        let index = component::index_of::<T>()?;
        self.position(index)
            .ok_or(Error::ComponentNotFound(std::any::type_name::<T>()))
    }

    #[inline]
    fn position(&self, index: Index) -> Option<usize> {
        self.columns
            .binary_search_by_key(&index, |column| column.index)
            .ok()
    }

    /// Whether the block has a column for the kind.
    #[inline]
    pub fn has_column(&self, index: Index) -> bool {
        self.position(index).is_some()
    }

    /// Byte range of the entity column within the buffer.
    #[inline]
    pub fn entity_range(&self) -> Range<usize> {
        0..mem::size_of::<Entity>() * self.max_size
    }

    /// Byte range of a component column within the buffer.
    pub fn column_range(&self, index: Index) -> Option<Range<usize>> {
        let column = &self.columns[self.position(index)?];
        Some(column.offset..column.offset + column.size * self.max_size)
    }

    /// Version of the last write to a column.
    pub fn column_version(&self, index: Index) -> Option<u64> {
        self.position(index).map(|position| self.columns[position].version)
    }

    /// Whether a column was written after `since`. Missing columns never changed.
    #[inline]
    pub fn changed_since(&self, index: Index, since: u64) -> bool {
        self.column_version(index).is_some_and(|version| version > since)
    }

    /// Mark a column as written at `version`.
    pub(crate) fn stamp(&mut self, index: Index, version: u64) {
        if let Some(position) = self.position(index) {
            self.columns[position].version = version;
        }
    }

    /// Mark every column as written at `version`.
    pub(crate) fn stamp_all(&mut self, version: u64) {
        for column in &mut self.columns {
            column.version = version;
        }
    }

    /// The raw bytes of one component of one slot.
    pub(crate) fn slot_bytes(&self, index: Index, slot: usize) -> Option<&[u8]> {
        debug_assert!(slot < self.size);
        let column = &self.columns[self.position(index)?];
        let at = column.offset + slot * column.size;
        Some(&self.buffer.as_slice()[at..at + column.size])
    }

    /// Overwrite one component of one slot with raw bytes, stamping the column.
    pub(crate) fn write_slot_bytes(
        &mut self,
        index: Index,
        slot: usize,
        bytes: &[u8],
        version: u64,
    ) -> Result<()> {
        debug_assert!(slot < self.size);
        let Some(position) = self.position(index) else {
            return Err(Error::ComponentNotFound(
                component::registry()
                    .info(index)
                    .map_or("<unregistered>", |info| info.name()),
            ));
        };
        let column = &mut self.columns[position];
        if bytes.len() != column.size {
            return Err(Error::ComponentSizeMismatch {
                component: column.name,
                expected: column.size,
                actual: bytes.len(),
            });
        }
        column.version = version;
        let at = column.offset + slot * column.size;
        let size = column.size;
        self.buffer.as_mut_slice()[at..at + size].copy_from_slice(bytes);
        Ok(())
    }

    /// Check the occupancy invariants.
    pub fn verify_invariants(&self) {
        assert!(self.size <= self.max_size);
        assert!(
            self.entities().iter().all(|entity| !entity.is_null()),
            "null entity in live slots"
        );
        assert!(
            self.entity_column()[self.size..]
                .iter()
                .all(|entity| *entity == Entity::NULL),
            "entity tail not zeroed"
        );
        let bytes = self.buffer.as_slice();
        for column in &self.columns {
            let tail = column.offset + self.size * column.size
                ..column.offset + self.max_size * column.size;
            assert!(
                bytes[tail].iter().all(|byte| *byte == 0),
                "column {} tail not zeroed",
                column.name
            );
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("archetype", &self.archetype)
            .field("size", &self.size)
            .field("max_size", &self.max_size)
            .field("class", &self.buffer.class())
            .finish()
    }
}
