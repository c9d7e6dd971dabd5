//! Common component types used across benchmarks.
//!
//! These components are representative of real game components in terms of size and access
//! patterns. Call [`register`] once before building a world.

use bytemuck::{Pod, Zeroable};
use rusty_blocks::ecs::{
    Archetype, Result,
    component::{self, Descriptor},
};
use rusty_macros::{Component, SharedComponent};

// =============================================================================
// Transform Components (common in most games)
// =============================================================================

/// 3D position component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 3D velocity component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Rotation as euler angles (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 4x4 transformation matrix (64 bytes).
#[derive(Component, Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    pub matrix: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

// =============================================================================
// Gameplay Components
// =============================================================================

#[derive(Component, Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

/// Shared: entities of one team live in their own blocks.
#[derive(SharedComponent, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Team(pub u8);

// =============================================================================
// Fragmentation Markers
// =============================================================================

macro_rules! markers {
    ($($name:ident),*) => {
        $(
            #[derive(Component, Clone, Copy, Debug, Default, Pod, Zeroable)]
            #[repr(C)]
            pub struct $name(pub u32);
        )*
    };
}

markers!(A, B, C, D, E, F, G, H);

/// Register every benchmark component kind.
pub fn register() -> Result<()> {
    component::register_all(&[
        Descriptor::of::<Position>(),
        Descriptor::of::<Velocity>(),
        Descriptor::of::<Rotation>(),
        Descriptor::of::<Transform>(),
        Descriptor::of::<Health>(),
        Descriptor::of::<A>(),
        Descriptor::of::<B>(),
        Descriptor::of::<C>(),
        Descriptor::of::<D>(),
        Descriptor::of::<E>(),
        Descriptor::of::<F>(),
        Descriptor::of::<G>(),
        Descriptor::of::<H>(),
        Descriptor::shared::<Team>(),
    ])?;
    Ok(())
}

/// Position + Velocity.
pub fn moving() -> Result<Archetype> {
    Archetype::empty().add::<Position>()?.add::<Velocity>()
}

/// The four component archetype used by common ECS benchmark suites.
pub fn four() -> Result<Archetype> {
    moving()?.add::<Rotation>()?.add::<Transform>()
}

/// Position + Velocity plus the `i`th of eight marker components, for fragmented layouts.
pub fn fragment(i: usize) -> Result<Archetype> {
    let base = moving()?;
    match i % 8 {
        0 => base.add::<A>(),
        1 => base.add::<B>(),
        2 => base.add::<C>(),
        3 => base.add::<D>(),
        4 => base.add::<E>(),
        5 => base.add::<F>(),
        6 => base.add::<G>(),
        _ => base.add::<H>(),
    }
}
