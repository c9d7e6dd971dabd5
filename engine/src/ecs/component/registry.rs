use std::{
    any::TypeId,
    sync::{OnceLock, PoisonError, RwLock},
};

use dashmap::DashMap;
use log::{error, warn};

use crate::ecs::{
    bitset::BitSet256,
    component::{Component, Index, Info, SharedComponent},
    error::RegistryError,
};

/// Largest alignment a block column can honour.
const MAX_ALIGN: usize = 32;

/// Which registry a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Plain per-entity components.
    Component,
    /// Shared per-archetype components.
    Shared,
}

/// A static description of a component kind, used for the startup registration pass.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    family: Family,
    type_id: TypeId,
    name: &'static str,
    size: usize,
    align: usize,
}

impl Descriptor {
    /// Describe plain component `C`.
    pub fn of<C: Component>() -> Self {
        Self {
            family: Family::Component,
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
        }
    }

    /// Describe shared component `S`.
    pub fn shared<S: SharedComponent>() -> Self {
        Self {
            family: Family::Shared,
            type_id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
            size: std::mem::size_of::<S>(),
            align: std::mem::align_of::<S>(),
        }
    }

    #[inline]
    pub fn family(&self) -> Family {
        self.family
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }
}

/// A thread-safe, append-only component registry. This maps a component type to the small
/// index it occupies in archetype and query masks.
///
/// Lookups go through a `DashMap` so the hot read path never takes the info lock. Registration
/// takes the info write lock, which also serialises index assignment so indices stay dense and
/// in registration order.
pub struct Registry {
    /// Which family this registry holds.
    family: Family,

    /// Map from TypeId to component index. Lock-free reads via sharded concurrent hashmap.
    type_map: DashMap<TypeId, Index>,

    /// Registered infos in index order. Protected by RwLock for rare writes.
    infos: RwLock<Vec<Info>>,
}

impl Registry {
    /// Maximum number of kinds a registry can hold.
    pub const CAPACITY: usize = BitSet256::CAPACITY;

    /// Create an empty registry for the given family.
    pub fn new(family: Family) -> Self {
        Self {
            family,
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
        }
    }

    /// The family of kinds held by this registry.
    #[inline]
    pub fn family(&self) -> Family {
        self.family
    }

    /// Register a kind from its descriptor and get its index.
    ///
    /// Registering a kind twice is not an error: the duplicate is logged and the existing
    /// index returned, so one misbehaving registration list cannot keep the rest of the
    /// engine from starting.
    pub fn register(&self, descriptor: &Descriptor) -> Result<Index, RegistryError> {
        debug_assert_eq!(
            descriptor.family(),
            self.family,
            "descriptor for {} registered in the wrong registry",
            descriptor.name()
        );

        // Fast path: already registered (lock-free read)
        if let Some(index) = self.type_map.get(&descriptor.type_id()) {
            warn!(
                "component kind {} registered more than once, keeping index {}",
                descriptor.name(),
                index.index()
            );
            return Ok(*index);
        }

        if descriptor.align() > MAX_ALIGN {
            return Err(RegistryError::UnsupportedAlignment {
                component: descriptor.name(),
                align: descriptor.align(),
            });
        }

        // Slow path: take the write lock so index assignment is serialised.
        let mut infos = self.infos.write().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have won the race while we waited for the lock.
        if let Some(index) = self.type_map.get(&descriptor.type_id()) {
            return Ok(*index);
        }

        if infos.len() >= Self::CAPACITY {
            error!(
                "cannot register {}: {:?} registry already holds {} kinds",
                descriptor.name(),
                self.family,
                Self::CAPACITY
            );
            return Err(RegistryError::Overflow {
                kind: descriptor.name(),
                capacity: Self::CAPACITY,
            });
        }

        let index = Index::new(infos.len() as u8);
        infos.push(Info::new(index, descriptor));
        self.type_map.insert(descriptor.type_id(), index);
        Ok(index)
    }

    /// Register a batch of kinds in order. Stops at the first hard failure.
    pub fn register_many(&self, descriptors: &[Descriptor]) -> Result<(), RegistryError> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Get the index of a kind by Rust type id, if registered.
    #[inline]
    pub fn index_of_type(&self, type_id: TypeId) -> Option<Index> {
        self.type_map.get(&type_id).map(|entry| *entry.value())
    }

    /// Get the info for type `T`, if registered.
    #[inline]
    pub fn info_of<T: 'static>(&self) -> Option<Info> {
        let index = self.index_of_type(TypeId::of::<T>())?;
        self.info(index)
    }

    /// Get the info for a registered index. This is the inverse of [`Registry::index_of_type`].
    #[inline]
    pub fn info(&self, index: Index) -> Option<Info> {
        let infos = self.infos.read().unwrap_or_else(PoisonError::into_inner);
        infos.get(index.index()).copied()
    }

    /// Number of registered kinds.
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing has been registered yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static COMPONENTS: OnceLock<Registry> = OnceLock::new();
static SHARED: OnceLock<Registry> = OnceLock::new();

/// The process wide registry of plain components.
pub fn registry() -> &'static Registry {
    COMPONENTS.get_or_init(|| Registry::new(Family::Component))
}

/// The process wide registry of shared components.
pub fn shared_registry() -> &'static Registry {
    SHARED.get_or_init(|| Registry::new(Family::Shared))
}

/// Register plain component `C` in the process wide registry.
pub fn register<C: Component>() -> Result<Index, RegistryError> {
    registry().register(&Descriptor::of::<C>())
}

/// Register shared component `S` in the process wide registry.
pub fn register_shared<S: SharedComponent>() -> Result<Index, RegistryError> {
    shared_registry().register(&Descriptor::shared::<S>())
}

/// The startup registration pass: route every descriptor to its family's registry, in order.
pub fn register_all(descriptors: &[Descriptor]) -> Result<(), RegistryError> {
    for descriptor in descriptors {
        match descriptor.family() {
            Family::Component => registry().register(descriptor)?,
            Family::Shared => shared_registry().register(descriptor)?,
        };
    }
    Ok(())
}
