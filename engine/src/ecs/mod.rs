//! A chunked archetype entity component store.
//!
//! Entities that share the same set of plain components and the same shared component values
//! belong to one [`Archetype`]. Each archetype stores its entities in fixed size blocks, one
//! contiguous column per component, so iterating a component is a linear walk over memory.
//!
//! - [`component`]: the [`Component`] and [`SharedComponent`] kinds and their registries.
//! - [`archetype`]: immutable, structurally compared archetype descriptions.
//! - [`storage`]: block allocator, blocks, block tables and the [`ComponentManager`].
//! - [`query`]: [`ComponentQuery`] and the [`BlockAccessor`] handed out per block.
//! - [`command`]: the [`EntityCommandBuffer`] for deferred structural changes.
//! - [`world`]: the [`World`], the public entry point.
//!
//! [`ComponentManager`]: storage::ComponentManager

pub mod archetype;
pub mod bitset;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod prefab;
pub mod query;
pub mod storage;
pub mod world;

pub use archetype::Archetype;
pub use bitset::BitSet256;
pub use command::{EntityCommandBuffer, Target};
pub use component::{Component, SharedComponent};
pub use entity::Entity;
pub use error::{AccessMode, Error, Error as EcsError, RegistryError, Result};
pub use event::{Event, Interest};
pub use prefab::{Prefab, PrefabBuilder};
pub use query::{BlockAccessor, ChangeFilter, ComponentQuery};
pub use storage::{Config, SizeClass};
pub use world::World;
