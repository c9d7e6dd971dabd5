//! Component kinds for the ECS.
//!
//! Two disjoint families of components exist:
//!
//! - [`Component`]: plain old data stored per entity inside block columns. These are copied
//!   around as raw bytes when entities move between blocks, so they must be `bytemuck::Pod`.
//! - [`SharedComponent`]: a value attached to a whole archetype. Every entity in a block shares
//!   the same instance, and two different values route entities to two different archetypes.
//!
//! Each family has its own process wide [`Registry`] mapping a Rust type to a small stable
//! [`Index`] in `0..256`, which is the bit the kind occupies in archetype and query masks.
//!
//! ## Usage
//!
//! ```ignore
//! use bytemuck::{Pod, Zeroable};
//! use rusty_blocks::ecs::component::{self, Descriptor};
//!
//! #[derive(Clone, Copy, Pod, Zeroable, Component)]
//! #[repr(C)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Hash, PartialEq, Eq, SharedComponent)]
//! struct Team(u32);
//!
//! component::register_all(&[Descriptor::of::<Position>(), Descriptor::shared::<Team>()])?;
//! ```

mod registry;
mod shared;

use std::{any::TypeId, fmt, hash::Hash};

pub use registry::{
    Descriptor, Family, Registry, register, register_all, register_shared, registry,
    shared_registry,
};
pub use shared::SharedValue;

use crate::ecs::error::{Error, Result};

/// A plain per-entity component.
///
/// Components are stored in untyped block columns and relocated with byte copies, which is
/// only sound for plain old data. The `Pod` bound also guarantees that the zeroed tail of a
/// column is a valid value.
pub trait Component: bytemuck::Pod + Send + Sync {}

/// A component shared by every entity of an archetype.
///
/// The value's content (through `Hash` and `Eq`) is part of the archetype identity. Shared
/// values are only ever handed out immutably: mutating one in place would silently break the
/// grouping it was hashed into.
pub trait SharedComponent: 'static + Send + Sync + Hash + Eq + fmt::Debug {}

/// The registry index of a component kind, which is also its bit in a [`BitSet256`].
///
/// [`BitSet256`]: crate::ecs::BitSet256
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index(u8);

impl Index {
    /// Construct an index from a raw value.
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Get the index as a usize for bitsets and vectors.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Metadata about a registered component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    index: Index,
    type_id: TypeId,
    name: &'static str,
    size: usize,
    align: usize,
}

impl Info {
    #[inline]
    pub(crate) fn new(index: Index, descriptor: &Descriptor) -> Self {
        Self {
            index,
            type_id: descriptor.type_id(),
            name: descriptor.name(),
            size: descriptor.size(),
            align: descriptor.align(),
        }
    }

    /// The registry index of this kind.
    #[inline]
    pub fn index(&self) -> Index {
        self.index
    }

    /// The Rust type id of this kind.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type name, used in diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size of one value in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Required alignment of one value.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }
}

/// Get the registry info for plain component `C`.
#[inline]
pub fn info_of<C: Component>() -> Result<Info> {
    registry()
        .info_of::<C>()
        .ok_or(Error::UnknownComponentKind(std::any::type_name::<C>()))
}

/// Get the registry index for plain component `C`.
#[inline]
pub fn index_of<C: Component>() -> Result<Index> {
    registry()
        .index_of_type(TypeId::of::<C>())
        .ok_or(Error::UnknownComponentKind(std::any::type_name::<C>()))
}

/// Get the registry index for shared component `S`.
#[inline]
pub fn shared_index_of<S: SharedComponent>() -> Result<Index> {
    shared_registry()
        .index_of_type(TypeId::of::<S>())
        .ok_or(Error::UnknownComponentKind(std::any::type_name::<S>()))
}
