//! Component queries: include/exclude filters matched against archetypes.
//!
//! A [`ComponentQuery`] declares which plain and shared kinds a piece of code needs and which
//! it must not see. It selects archetypes through four bitmask tests and, through a
//! [`BlockAccessor`], limits column access to what it declared:
//!
//! ```rust,ignore
//! let query = ComponentQuery::new()
//!     .include::<Velocity>()?
//!     .include_mut::<Position>()?
//!     .exclude::<Frozen>()?;
//!
//! for block in world.blocks(&query)? {
//!     let velocities = block.components::<Velocity>()?;
//!     let positions = block.components_mut::<Position>()?;
//!     for (p, v) in positions.iter_mut().zip(velocities) {
//!         p.x += v.dx;
//!     }
//! }
//! ```

mod accessor;

pub use accessor::{BlockAccessor, BlockIter, ChangeFilter};

use crate::ecs::{
    archetype::Archetype,
    bitset::BitSet256,
    component::{self, Component, Index, SharedComponent},
    error::Result,
};

/// An include/exclude filter over plain and shared component kinds.
///
/// The empty query matches every archetype.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentQuery {
    include: BitSet256,
    /// Subset of `include` declared writable.
    write: BitSet256,
    exclude: BitSet256,
    include_shared: BitSet256,
    exclude_shared: BitSet256,
}

impl ComponentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T` and declare read access to it.
    pub fn include<T: Component>(mut self) -> Result<Self> {
        self.include.set(component::index_of::<T>()?.index());
        Ok(self)
    }

    /// Require `T` and declare write access to it.
    pub fn include_mut<T: Component>(mut self) -> Result<Self> {
        let index = component::index_of::<T>()?.index();
        self.include.set(index);
        self.write.set(index);
        Ok(self)
    }

    /// Reject archetypes holding `T`.
    pub fn exclude<T: Component>(mut self) -> Result<Self> {
        self.exclude.set(component::index_of::<T>()?.index());
        Ok(self)
    }

    /// Require shared kind `S` and declare read access to it.
    pub fn include_shared<S: SharedComponent>(mut self) -> Result<Self> {
        self.include_shared
            .set(component::shared_index_of::<S>()?.index());
        Ok(self)
    }

    /// Reject archetypes holding shared kind `S`.
    pub fn exclude_shared<S: SharedComponent>(mut self) -> Result<Self> {
        self.exclude_shared
            .set(component::shared_index_of::<S>()?.index());
        Ok(self)
    }

    /// Whether an archetype satisfies every include and no exclude.
    #[inline]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        let components = archetype.component_mask();
        let shared = archetype.shared_mask();
        components.contains_all(&self.include)
            && shared.contains_all(&self.include_shared)
            && !components.contains_any(&self.exclude)
            && !shared.contains_any(&self.exclude_shared)
    }

    /// Whether the query declared (at least) read access to a plain kind.
    #[inline]
    pub fn does_include(&self, index: Index) -> bool {
        self.include.get(index.index())
    }

    /// Whether the query declared write access to a plain kind.
    #[inline]
    pub fn does_include_write(&self, index: Index) -> bool {
        self.write.get(index.index())
    }

    /// Whether the query declared access to a shared kind.
    #[inline]
    pub fn does_include_shared(&self, index: Index) -> bool {
        self.include_shared.get(index.index())
    }

    /// The plain kinds declared writable.
    #[inline]
    pub fn writes(&self) -> &BitSet256 {
        &self.write
    }

    /// True when the query sets no bit at all.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.include_shared.is_empty()
            && self.exclude_shared.is_empty()
    }
}
