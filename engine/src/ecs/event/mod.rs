//! Structural change notifications.
//!
//! The store fires an [`Event`] for every entity created or destroyed and every component
//! added or removed, after the change is committed. Subscribers register an [`Interest`] with
//! [`World::subscribe`](crate::ecs::World::subscribe) and receive matching events over a
//! `crossbeam` channel, in the order the changes happened.
//!
//! Removal events carry a byte exact snapshot of the removed value. Snapshots are only taken
//! for kinds at least one subscriber is interested in, so a world without subscribers pays
//! nothing for them.
//!
//! ```rust,ignore
//! let removed = world.subscribe(Interest::new().component::<Health>()?);
//! world.destroy_entity(e)?;
//! for event in removed.try_iter() {
//!     if let Some(health) = event.snapshot_as::<Health>() { /* ... */ }
//! }
//! ```

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::ecs::{
    bitset::BitSet256,
    component::{self, Component, Index, SharedComponent},
    entity::Entity,
    error::Result,
};

/// A committed structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    EntityCreated(Entity),
    EntityDestroyed(Entity),
    ComponentAdded {
        entity: Entity,
        component: Index,
    },
    /// Carries the value as it was just before removal.
    ComponentRemoved {
        entity: Entity,
        component: Index,
        snapshot: Vec<u8>,
    },
    SharedComponentAdded {
        entity: Entity,
        component: Index,
    },
    SharedComponentRemoved {
        entity: Entity,
        component: Index,
    },
}

impl Event {
    /// The entity the event is about.
    pub fn entity(&self) -> Entity {
        match self {
            Event::EntityCreated(entity) | Event::EntityDestroyed(entity) => *entity,
            Event::ComponentAdded { entity, .. }
            | Event::ComponentRemoved { entity, .. }
            | Event::SharedComponentAdded { entity, .. }
            | Event::SharedComponentRemoved { entity, .. } => *entity,
        }
    }

    /// Decode a removal snapshot as `T`. `None` for other events or other kinds.
    pub fn snapshot_as<T: Component>(&self) -> Option<T> {
        let Event::ComponentRemoved {
            component,
            snapshot,
            ..
        } = self
        else {
            return None;
        };
        if component::index_of::<T>().ok()? != *component {
            return None;
        }
        bytemuck::try_pod_read_unaligned(snapshot).ok()
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    lifecycle: bool,
    components: BitSet256,
    shared: BitSet256,
}

impl Interest {
    /// Interested in nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything: lifecycle events and every component kind.
    pub fn all() -> Self {
        let every = BitSet256::from_indices(0..BitSet256::CAPACITY);
        Self {
            lifecycle: true,
            components: every,
            shared: every,
        }
    }

    /// Entity created and destroyed events.
    pub fn lifecycle(mut self) -> Self {
        self.lifecycle = true;
        self
    }

    /// Add and remove events for plain component `T`.
    pub fn component<T: Component>(mut self) -> Result<Self> {
        self.components.set(component::index_of::<T>()?.index());
        Ok(self)
    }

    /// Add and remove events for shared component `S`.
    pub fn shared<S: SharedComponent>(mut self) -> Result<Self> {
        self.shared.set(component::shared_index_of::<S>()?.index());
        Ok(self)
    }

    /// Whether this interest covers the event.
    pub fn covers(&self, event: &Event) -> bool {
        match event {
            Event::EntityCreated(_) | Event::EntityDestroyed(_) => self.lifecycle,
            Event::ComponentAdded { component, .. } | Event::ComponentRemoved { component, .. } => {
                self.components.get(component.index())
            }
            Event::SharedComponentAdded { component, .. }
            | Event::SharedComponentRemoved { component, .. } => self.shared.get(component.index()),
        }
    }
}

/// Fans events out to subscribers.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<(Interest, Sender<Event>)>,

    /// Union of every subscriber's plain component interest.
    watched: BitSet256,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    pub fn subscribe(&mut self, interest: Interest) -> Receiver<Event> {
        let (sender, receiver) = unbounded();
        self.subscribers.push((interest, sender));
        self.watched = self.watched.or(&interest.components);
        receiver
    }

    /// Whether anyone listens at all.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Whether a removal of this plain kind needs a snapshot.
    #[inline]
    pub fn wants_snapshot(&self, component: Index) -> bool {
        self.watched.get(component.index())
    }

    /// Deliver an event to every interested subscriber. Subscribers whose receiver was
    /// dropped are forgotten.
    pub fn fire(&mut self, event: Event) {
        if self.subscribers.is_empty() {
            return;
        }
        let before = self.subscribers.len();
        self.subscribers.retain(|(interest, sender)| {
            !interest.covers(&event) || sender.send(event.clone()).is_ok()
        });
        if self.subscribers.len() != before {
            self.watched = self
                .subscribers
                .iter()
                .fold(BitSet256::EMPTY, |watched, (interest, _)| {
                    watched.or(&interest.components)
                });
        }
    }

    /// Deliver a batch in order.
    pub fn fire_all(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.fire(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};
    use rusty_macros::Component;

    use super::*;
    use crate::ecs::component::register;

    #[derive(Component, Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
    #[repr(C)]
    struct Health(i32);

    #[derive(Component, Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
    #[repr(C)]
    struct Armor(i32);

    fn setup() -> (Index, Index) {
        (register::<Health>().unwrap(), register::<Armor>().unwrap())
    }

    #[test]
    fn delivers_only_covered_events() {
        // Given
        let (health, armor) = setup();
        let mut notifier = Notifier::new();
        let lifecycle = notifier.subscribe(Interest::new().lifecycle());
        let healths = notifier.subscribe(Interest::new().component::<Health>().unwrap());
        let entity = Entity::new(1, 1);

        // When
        notifier.fire_all([
            Event::EntityCreated(entity),
            Event::ComponentAdded {
                entity,
                component: health,
            },
            Event::ComponentAdded {
                entity,
                component: armor,
            },
        ]);

        // Then
        assert_eq!(lifecycle.try_iter().collect::<Vec<_>>(), vec![
            Event::EntityCreated(entity)
        ]);
        assert_eq!(healths.try_iter().collect::<Vec<_>>(), vec![
            Event::ComponentAdded {
                entity,
                component: health
            }
        ]);
    }

    #[test]
    fn snapshots_only_for_watched_kinds() {
        // Given
        let (health, armor) = setup();
        let mut notifier = Notifier::new();
        assert!(!notifier.wants_snapshot(health));

        // When
        let _receiver = notifier.subscribe(Interest::new().component::<Health>().unwrap());

        // Then
        assert!(notifier.wants_snapshot(health));
        assert!(!notifier.wants_snapshot(armor));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        // Given
        let (health, _) = setup();
        let mut notifier = Notifier::new();
        let receiver = notifier.subscribe(Interest::all());
        drop(receiver);

        // When
        notifier.fire(Event::EntityCreated(Entity::new(1, 1)));

        // Then
        assert!(!notifier.is_active());
        assert!(!notifier.wants_snapshot(health));
    }

    #[test]
    fn snapshot_decodes_as_its_kind() {
        // Given
        let (health, _) = setup();
        let event = Event::ComponentRemoved {
            entity: Entity::new(2, 1),
            component: health,
            snapshot: bytemuck::bytes_of(&Health(42)).to_vec(),
        };

        // Then
        assert_eq!(event.snapshot_as::<Health>(), Some(Health(42)));
        assert_eq!(event.snapshot_as::<Armor>(), None);
        assert_eq!(event.entity(), Entity::new(2, 1));
    }
}
