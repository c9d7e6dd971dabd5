/// Where a live entity is stored: its archetype table, the block within the table and the slot
/// within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Index of the archetype block table.
    table: usize,

    /// Index of the block within the table.
    block: usize,

    /// Slot within the block.
    slot: usize,
}

impl Location {
    #[inline]
    pub const fn new(table: usize, block: usize, slot: usize) -> Self {
        Self { table, block, slot }
    }

    #[inline]
    pub fn table(&self) -> usize {
        self.table
    }

    #[inline]
    pub fn block(&self) -> usize {
        self.block
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }
}
