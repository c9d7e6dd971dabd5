//! Prefabs: entity templates with initial component values.
//!
//! A [`Prefab`] pairs an archetype (shared values included) with one byte record per plain
//! component. Instantiating one creates an entity in that archetype and copies the records
//! straight into its slot; components without a record start zeroed.
//!
//! ```rust,ignore
//! let bullet = PrefabBuilder::new()
//!     .with(Velocity { dx: 10.0, dy: 0.0 })?
//!     .with(Damage(5))?
//!     .with_shared(Team::Red)?
//!     .build();
//! let entities = world.instantiate_many(&bullet, 100)?;
//! ```

use crate::ecs::{
    archetype::Archetype,
    component::{self, Component, Index, SharedComponent},
    entity::Entity,
    error::Result,
    world::World,
};

/// An entity template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefab {
    archetype: Archetype,
    values: Vec<(Index, Vec<u8>)>,
}

impl Prefab {
    /// Capture the archetype and every plain component value of a live entity.
    pub fn from_entity(world: &World, entity: Entity) -> Result<Self> {
        let components = world.components();
        let archetype = Archetype::clone(components.archetype_of(entity)?);
        let values = archetype
            .components()
            .iter()
            .map(|info| {
                let bytes = components.component_bytes(entity, info.index())?;
                Ok((info.index(), bytes.to_vec()))
            })
            .collect::<Result<_>>()?;
        Ok(Self { archetype, values })
    }

    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    /// Initial values, one record per plain kind at most.
    #[inline]
    pub fn values(&self) -> &[(Index, Vec<u8>)] {
        &self.values
    }
}

/// Builds a [`Prefab`] one component at a time.
#[derive(Debug, Clone, Default)]
pub struct PrefabBuilder {
    archetype: Archetype,
    values: Vec<(Index, Vec<u8>)>,
}

impl PrefabBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an archetype whose plain components are zeroed.
    pub fn from_archetype(archetype: Archetype) -> Self {
        Self {
            archetype,
            values: Vec::new(),
        }
    }

    /// Add plain component `T` with an initial value. Adding `T` again replaces the value.
    pub fn with<T: Component>(mut self, value: T) -> Result<Self> {
        let info = component::info_of::<T>()?;
        let bytes = bytemuck::bytes_of(&value).to_vec();
        if !self.archetype.has_index(info.index()) {
            self.archetype = self.archetype.add_info(info)?;
        }
        match self.values.iter_mut().find(|(index, _)| *index == info.index()) {
            Some((_, existing)) => *existing = bytes,
            None => self.values.push((info.index(), bytes)),
        }
        Ok(self)
    }

    /// Set shared component `S`, replacing any value of the same kind.
    pub fn with_shared<S: SharedComponent>(mut self, value: S) -> Result<Self> {
        self.archetype = self.archetype.set_shared(value)?;
        Ok(self)
    }

    pub fn build(self) -> Prefab {
        Prefab {
            archetype: self.archetype,
            values: self.values,
        }
    }
}
