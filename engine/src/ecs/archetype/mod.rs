//! Archetypes: the unique combination of component kinds and shared component values an
//! entity has.
//!
//! An [`Archetype`] is an immutable value. Edits such as [`Archetype::add`] or
//! [`Archetype::remove_shared`] return a new archetype and leave the original untouched, so one
//! archetype can be shared by every block and table that stores its entities.
//!
//! Identity is structural: two archetypes are equal when they hold the same kinds and, for
//! shared kinds, equal values. The folded [`Archetype::hash`] is kept as a cheap prefilter and
//! for diagnostics, never as the identity test.

use std::{
    fmt,
    hash::{Hash, Hasher},
    mem,
};

use crate::ecs::{
    bitset::{BitSet256, mix64},
    component::{
        self, Component, Index, Info, SharedComponent, SharedValue, registry, shared_registry,
    },
    entity::Entity,
    error::{Error, Result},
};

/// Hash contributed by a plain component kind.
#[inline]
fn kind_hash(index: Index) -> u64 {
    mix64(index.index() as u64 + 1)
}

/// An immutable set of plain component kinds plus shared component values.
#[derive(Clone, Default)]
pub struct Archetype {
    /// Plain component kinds, sorted by index.
    components: Vec<Info>,

    /// Shared values, sorted by index. At most one per kind.
    shared: Vec<SharedValue>,

    component_mask: BitSet256,
    shared_mask: BitSet256,

    /// XOR fold of every member's hash.
    hash: u64,
}

impl Archetype {
    /// The canonical archetype with no components.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new archetype with plain component `T` added.
    ///
    /// Fails with [`Error::InvalidArchetypeEdit`] if `T` is already present.
    pub fn add<T: Component>(&self) -> Result<Self> {
        self.add_info(component::info_of::<T>()?)
    }

    /// Untyped form of [`Archetype::add`].
    pub fn add_info(&self, info: Info) -> Result<Self> {
        if self.component_mask.get(info.index().index()) {
            return Err(Error::InvalidArchetypeEdit {
                component: info.name(),
                reason: "component already present",
            });
        }

        let mut next = self.clone();
        let at = next
            .components
            .partition_point(|existing| existing.index() < info.index());
        next.components.insert(at, info);
        next.component_mask.set(info.index().index());
        next.hash ^= kind_hash(info.index());
        Ok(next)
    }

    /// A new archetype with plain component `T` removed.
    ///
    /// Fails with [`Error::InvalidArchetypeEdit`] if `T` is absent.
    pub fn remove<T: Component>(&self) -> Result<Self> {
        let info = component::info_of::<T>()?;
        self.remove_index(info.index())
    }

    /// Untyped form of [`Archetype::remove`].
    pub fn remove_index(&self, index: Index) -> Result<Self> {
        let Ok(at) = self
            .components
            .binary_search_by_key(&index, |info| info.index())
        else {
            return Err(Error::InvalidArchetypeEdit {
                component: registry().info(index).map_or("<unregistered>", |info| info.name()),
                reason: "component not present",
            });
        };

        let mut next = self.clone();
        next.components.remove(at);
        next.component_mask.clear(index.index());
        next.hash ^= kind_hash(index);
        Ok(next)
    }

    /// A new archetype with the shared value added.
    ///
    /// Fails with [`Error::InvalidArchetypeEdit`] if the kind already has a value here, even an
    /// equal one. Use [`Archetype::set_shared`] to replace.
    pub fn add_shared<S: SharedComponent>(&self, value: S) -> Result<Self> {
        self.add_shared_value(SharedValue::new(value)?)
    }

    /// Untyped form of [`Archetype::add_shared`].
    pub fn add_shared_value(&self, value: SharedValue) -> Result<Self> {
        if self.shared_mask.get(value.index().index()) {
            return Err(Error::InvalidArchetypeEdit {
                component: value.name(),
                reason: "shared component already present",
            });
        }

        let mut next = self.clone();
        next.hash ^= value.archetype_hash();
        next.shared_mask.set(value.index().index());
        let at = next
            .shared
            .partition_point(|existing| existing.index() < value.index());
        next.shared.insert(at, value);
        Ok(next)
    }

    /// A new archetype with the shared kind `S` removed.
    pub fn remove_shared<S: SharedComponent>(&self) -> Result<Self> {
        self.remove_shared_index(component::shared_index_of::<S>()?)
    }

    /// Untyped form of [`Archetype::remove_shared`].
    pub fn remove_shared_index(&self, index: Index) -> Result<Self> {
        let Ok(at) = self
            .shared
            .binary_search_by_key(&index, |value| value.index())
        else {
            return Err(Error::InvalidArchetypeEdit {
                component: shared_registry()
                    .info(index)
                    .map_or("<unregistered>", |info| info.name()),
                reason: "shared component not present",
            });
        };

        let mut next = self.clone();
        let removed = next.shared.remove(at);
        next.shared_mask.clear(index.index());
        next.hash ^= removed.archetype_hash();
        Ok(next)
    }

    /// A new archetype where the shared kind holds `value`, added or replaced.
    pub fn set_shared<S: SharedComponent>(&self, value: S) -> Result<Self> {
        self.set_shared_value(SharedValue::new(value)?)
    }

    /// Untyped form of [`Archetype::set_shared`].
    pub fn set_shared_value(&self, value: SharedValue) -> Result<Self> {
        if self.shared_mask.get(value.index().index()) {
            self.remove_shared_index(value.index())?
                .add_shared_value(value)
        } else {
            self.add_shared_value(value)
        }
    }

    /// Whether plain component `T` is present. Unregistered kinds are never present.
    #[inline]
    pub fn has<T: Component>(&self) -> bool {
        component::index_of::<T>().is_ok_and(|index| self.has_index(index))
    }

    #[inline]
    pub fn has_index(&self, index: Index) -> bool {
        self.component_mask.get(index.index())
    }

    /// Whether shared kind `S` is present.
    #[inline]
    pub fn has_shared<S: SharedComponent>(&self) -> bool {
        component::shared_index_of::<S>().is_ok_and(|index| self.has_shared_index(index))
    }

    #[inline]
    pub fn has_shared_index(&self, index: Index) -> bool {
        self.shared_mask.get(index.index())
    }

    /// The value of shared kind `S`, if present. Shared values are only ever lent immutably.
    pub fn shared<S: SharedComponent>(&self) -> Option<&S> {
        let index = component::shared_index_of::<S>().ok()?;
        self.shared_value(index)?.downcast_ref::<S>()
    }

    /// The type erased shared value for a kind, if present.
    pub fn shared_value(&self, index: Index) -> Option<&SharedValue> {
        if !self.has_shared_index(index) {
            return None;
        }
        self.shared
            .binary_search_by_key(&index, |value| value.index())
            .ok()
            .map(|at| &self.shared[at])
    }

    /// Plain component kinds, sorted by index.
    #[inline]
    pub fn components(&self) -> &[Info] {
        &self.components
    }

    /// Shared values, sorted by kind index.
    #[inline]
    pub fn shared_values(&self) -> &[SharedValue] {
        &self.shared
    }

    #[inline]
    pub fn component_mask(&self) -> &BitSet256 {
        &self.component_mask
    }

    #[inline]
    pub fn shared_mask(&self) -> &BitSet256 {
        &self.shared_mask
    }

    /// Bytes one entity occupies in a block: its entity id plus every plain component.
    #[inline]
    pub fn bytes_per_entity(&self) -> usize {
        mem::size_of::<Entity>() + self.components.iter().map(Info::size).sum::<usize>()
    }

    /// The folded hash of kinds and shared contents. Equal archetypes have equal hashes.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// True if this archetype has no plain or shared components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.shared.is_empty()
    }
}

impl PartialEq for Archetype {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.component_mask == other.component_mask
            && self.shared_mask == other.shared_mask
            && self.shared == other.shared
    }
}

impl Eq for Archetype {}

impl Hash for Archetype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field(
                "components",
                &self.components.iter().map(Info::name).collect::<Vec<_>>(),
            )
            .field("shared", &self.shared)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish()
    }
}
