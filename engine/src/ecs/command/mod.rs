//! Deferred structural changes.
//!
//! Code that cannot perform structural changes itself (typically work running inside
//! [`World::par_for_each_block`]) records them in an [`EntityCommandBuffer`] instead. The
//! mutator thread replays the buffer later, strictly in recording order.
//!
//! Commands target either a known entity or [`Target::LastCreated`], the entity created by the
//! most recent create or instantiate command of the same playback. That makes it possible to
//! build an entity and fill it in without ever knowing its handle:
//!
//! ```rust,ignore
//! let mut commands = EntityCommandBuffer::new();
//! commands.create_entity(&bullet);
//! commands.set_component(Target::LastCreated, Velocity { dx: 10.0, dy: 0.0 })?;
//! commands.destroy_entity(hit);
//!
//! let created = commands.playback(&mut world)?;
//! ```
//!
//! Component values are captured as plain byte records when recorded, so a buffer is `Send`
//! and each worker can own one.

use log::warn;

use crate::ecs::{
    archetype::Archetype,
    component::{self, Component, Index, Info, SharedComponent, SharedValue},
    entity::Entity,
    error::{Error, Result},
    prefab::Prefab,
    world::World,
};

/// The entity a recorded command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The entity created by the latest create or instantiate command in the same playback.
    LastCreated,
    Entity(Entity),
}

impl From<Entity> for Target {
    fn from(entity: Entity) -> Self {
        Target::Entity(entity)
    }
}

/// A recorded structural change.
#[derive(Debug, Clone)]
pub enum Command {
    CreateEntity(Archetype),
    Instantiate(Prefab),
    DestroyEntity(Target),
    SetComponent {
        target: Target,
        info: Info,
        bytes: Vec<u8>,
    },
    AddComponent {
        target: Target,
        info: Info,
        bytes: Vec<u8>,
    },
    RemoveComponent {
        target: Target,
        component: Index,
    },
    AddSharedComponent {
        target: Target,
        value: SharedValue,
    },
    RemoveSharedComponent {
        target: Target,
        component: Index,
    },
}

/// An ordered list of structural changes to replay on a world.
#[derive(Debug, Clone, Default)]
pub struct EntityCommandBuffer {
    commands: Vec<Command>,
}

impl EntityCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every recorded command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Record a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn create_entity(&mut self, archetype: &Archetype) {
        self.commands.push(Command::CreateEntity(archetype.clone()));
    }

    pub fn instantiate(&mut self, prefab: &Prefab) {
        self.commands.push(Command::Instantiate(prefab.clone()));
    }

    pub fn destroy_entity(&mut self, target: impl Into<Target>) {
        self.commands.push(Command::DestroyEntity(target.into()));
    }

    pub fn set_component<T: Component>(
        &mut self,
        target: impl Into<Target>,
        value: T,
    ) -> Result<()> {
        self.commands.push(Command::SetComponent {
            target: target.into(),
            info: component::info_of::<T>()?,
            bytes: bytemuck::bytes_of(&value).to_vec(),
        });
        Ok(())
    }

    pub fn add_component<T: Component>(
        &mut self,
        target: impl Into<Target>,
        value: T,
    ) -> Result<()> {
        self.commands.push(Command::AddComponent {
            target: target.into(),
            info: component::info_of::<T>()?,
            bytes: bytemuck::bytes_of(&value).to_vec(),
        });
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, target: impl Into<Target>) -> Result<()> {
        self.commands.push(Command::RemoveComponent {
            target: target.into(),
            component: component::index_of::<T>()?,
        });
        Ok(())
    }

    pub fn add_shared_component<S: SharedComponent>(
        &mut self,
        target: impl Into<Target>,
        value: S,
    ) -> Result<()> {
        self.commands.push(Command::AddSharedComponent {
            target: target.into(),
            value: SharedValue::new(value)?,
        });
        Ok(())
    }

    pub fn remove_shared_component<S: SharedComponent>(
        &mut self,
        target: impl Into<Target>,
    ) -> Result<()> {
        self.commands.push(Command::RemoveSharedComponent {
            target: target.into(),
            component: component::shared_index_of::<S>()?,
        });
        Ok(())
    }

    /// Apply every command in recording order and return the entities created.
    ///
    /// Stops at the first failing command and returns its error; commands before it stay
    /// applied. The buffer is empty afterwards either way. Destroying an entity that is no
    /// longer live is skipped with a warning, since another buffer may have destroyed it
    /// first.
    ///
    /// Entities created before a failure stay live but their handles are dropped with the
    /// error. Use [`EntityCommandBuffer::playback_into`] to keep them.
    pub fn playback(&mut self, world: &mut World) -> Result<Vec<Entity>> {
        let mut created = Vec::new();
        self.playback_into(world, &mut created)?;
        Ok(created)
    }

    /// [`EntityCommandBuffer::playback`] appending created entities to `created` as they are
    /// made, so they remain reachable when a later command fails.
    ///
    /// [`Target::LastCreated`] only sees entities created by this playback, never ones already
    /// in `created`.
    pub fn playback_into(&mut self, world: &mut World, created: &mut Vec<Entity>) -> Result<()> {
        let commands = std::mem::take(&mut self.commands);
        let first = created.len();

        let resolve = |target: Target, created: &[Entity]| match target {
            Target::Entity(entity) => Ok(entity),
            Target::LastCreated => created[first..]
                .last()
                .copied()
                .ok_or(Error::InvalidEntity(Entity::NULL)),
        };

        for command in commands {
            match command {
                Command::CreateEntity(archetype) => {
                    created.push(world.create_entity(&archetype)?);
                }
                Command::Instantiate(prefab) => {
                    created.push(world.instantiate(&prefab)?);
                }
                Command::DestroyEntity(target) => {
                    let entity = resolve(target, created.as_slice())?;
                    if !world.is_live(entity) {
                        warn!("command buffer destroys {entity}, which is not live; skipping");
                        continue;
                    }
                    world.destroy_entity(entity)?;
                }
                Command::SetComponent {
                    target,
                    info,
                    bytes,
                } => {
                    let entity = resolve(target, created.as_slice())?;
                    world.set_component_bytes(entity, info.index(), &bytes)?;
                }
                Command::AddComponent {
                    target,
                    info,
                    bytes,
                } => {
                    let entity = resolve(target, created.as_slice())?;
                    world.add_component_bytes(entity, info, &bytes)?;
                }
                Command::RemoveComponent { target, component } => {
                    let entity = resolve(target, created.as_slice())?;
                    world.remove_component_index(entity, component)?;
                }
                Command::AddSharedComponent { target, value } => {
                    let entity = resolve(target, created.as_slice())?;
                    world.add_shared_value(entity, value)?;
                }
                Command::RemoveSharedComponent { target, component } => {
                    let entity = resolve(target, created.as_slice())?;
                    world.remove_shared_index(entity, component)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytemuck::{Pod, Zeroable};
    use rusty_macros::{Component, SharedComponent};

    use super::*;
    use crate::ecs::{
        component::{register, register_shared},
        query::ComponentQuery,
    };

    #[derive(Component, Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
    #[repr(C)]
    struct X(u32);

    #[derive(Component, Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
    #[repr(C)]
    struct Y(u32);

    #[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
    struct Layer(u8);

    fn setup() -> Archetype {
        register::<X>().unwrap();
        register::<Y>().unwrap();
        register_shared::<Layer>().unwrap();
        Archetype::empty().add::<X>().unwrap().add::<Y>().unwrap()
    }

    #[test]
    fn last_created_follows_recording_order() {
        // Given
        let archetype = setup();
        let mut world = World::new();
        let mut commands = EntityCommandBuffer::new();

        // When
        commands.create_entity(&archetype);
        commands.set_component(Target::LastCreated, X(1)).unwrap();
        commands.create_entity(&archetype);
        commands.set_component(Target::LastCreated, Y(2)).unwrap();
        let created = commands.playback(&mut world).unwrap();

        // Then
        assert_eq!(created.len(), 2);
        assert_eq!(world.get_component::<X>(created[0]).unwrap(), &X(1));
        assert_eq!(world.get_component::<Y>(created[0]).unwrap(), &Y(0));
        assert_eq!(world.get_component::<X>(created[1]).unwrap(), &X(0));
        assert_eq!(world.get_component::<Y>(created[1]).unwrap(), &Y(2));
        assert!(commands.is_empty());
    }

    #[test]
    fn structural_commands_apply_in_order() {
        // Given
        setup();
        let mut world = World::new();
        let entity = world.create_empty().unwrap();
        let mut commands = EntityCommandBuffer::new();

        // When
        commands.add_component(entity, X(5)).unwrap();
        commands.add_shared_component(entity, Layer(3)).unwrap();
        commands.add_component(entity, Y(6)).unwrap();
        commands.remove_component::<X>(entity).unwrap();
        commands.playback(&mut world).unwrap();

        // Then
        assert!(!world.has_component::<X>(entity).unwrap());
        assert_eq!(world.get_component::<Y>(entity).unwrap(), &Y(6));
        assert_eq!(world.get_shared_component::<Layer>(entity).unwrap(), &Layer(3));

        // When
        commands.remove_shared_component::<Layer>(entity).unwrap();
        commands.destroy_entity(entity);
        commands.playback(&mut world).unwrap();

        // Then
        assert!(!world.is_live(entity));
        world.verify_invariants();
    }

    #[test]
    fn destroying_dead_entity_is_skipped() {
        // Given
        let archetype = setup();
        let mut world = World::new();
        let entity = world.create_entity(&archetype).unwrap();
        let mut commands = EntityCommandBuffer::new();
        commands.destroy_entity(entity);
        commands.destroy_entity(entity);
        commands.create_entity(&archetype);

        // When
        let created = commands.playback(&mut world).unwrap();

        // Then
        assert!(!world.is_live(entity));
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn failure_stops_playback_and_clears() {
        // Given
        let archetype = setup();
        let mut world = World::new();
        let mut commands = EntityCommandBuffer::new();
        commands.set_component(Target::LastCreated, X(1)).unwrap();
        commands.create_entity(&archetype);

        // When
        let result = commands.playback(&mut world);

        // Then
        assert_eq!(result, Err(Error::InvalidEntity(Entity::NULL)));
        assert!(commands.is_empty());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn entities_created_before_failure_stay_reachable() {
        // Given
        setup();
        let only_x = Archetype::empty().add::<X>().unwrap();
        let mut world = World::new();
        let earlier = world.create_empty().unwrap();
        let mut commands = EntityCommandBuffer::new();
        commands.create_entity(&only_x);
        commands.set_component(Target::LastCreated, X(5)).unwrap();
        commands.set_component(Target::LastCreated, Y(6)).unwrap();
        commands.create_entity(&only_x);
        let mut created = vec![earlier];

        // When
        let result = commands.playback_into(&mut world, &mut created);

        // Then
        assert!(matches!(result, Err(Error::ComponentNotFound(_))));
        assert!(commands.is_empty());
        assert_eq!(created.len(), 2);
        assert_eq!(created[0], earlier);
        assert!(world.is_live(created[1]));
        assert_eq!(world.get_component::<X>(created[1]).unwrap(), &X(5));
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn last_created_ignores_entities_from_earlier_playbacks() {
        // Given
        let archetype = setup();
        let mut world = World::new();
        let mut created = Vec::new();
        let mut first = EntityCommandBuffer::new();
        first.create_entity(&archetype);
        first.playback_into(&mut world, &mut created).unwrap();
        let mut second = EntityCommandBuffer::new();
        second.set_component(Target::LastCreated, X(1)).unwrap();

        // When
        let result = second.playback_into(&mut world, &mut created);

        // Then
        assert_eq!(result, Err(Error::InvalidEntity(Entity::NULL)));
        assert_eq!(world.get_component::<X>(created[0]).unwrap(), &X(0));
    }

    #[test]
    fn buffers_recorded_on_workers() {
        // Given
        let archetype = setup();
        let mut world = World::new();
        world.create_entities(&archetype, 100).unwrap();
        let query = ComponentQuery::new().include::<X>().unwrap();
        let entities: Vec<Entity> = world
            .filter_blocks(&query)
            .flat_map(|block| block.entities().to_vec())
            .collect();

        // When - each worker records into its own buffer
        let mut buffers: Vec<EntityCommandBuffer> = thread::scope(|scope| {
            let handles: Vec<_> = entities
                .chunks(25)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut commands = EntityCommandBuffer::new();
                        for entity in chunk.iter().step_by(2) {
                            commands.destroy_entity(*entity);
                        }
                        commands
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for buffer in &mut buffers {
            buffer.playback(&mut world).unwrap();
        }

        // Then
        assert_eq!(world.entity_count(), 50);
        world.verify_invariants();
    }
}
