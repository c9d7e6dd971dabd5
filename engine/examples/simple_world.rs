//! A walkthrough of the store: registration, archetypes, shared components, queries,
//! change filters, parallel iteration, command buffers and events.

use bytemuck::{Pod, Zeroable};
use rusty_blocks::ecs::{
    Archetype, ChangeFilter, ComponentQuery, EntityCommandBuffer, Interest, PrefabBuilder,
    Result, Target, World,
    component::{self, Descriptor},
};
use rusty_macros::{Component, SharedComponent};

#[derive(Component, Clone, Copy, Pod, Zeroable, Debug, Default)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Clone, Copy, Pod, Zeroable, Debug, Default)]
#[repr(C)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component, Clone, Copy, Pod, Zeroable, Debug, Default)]
#[repr(C)]
struct Lifetime(u32);

#[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
enum Team {
    Red,
    Blue,
}

fn main() -> Result<()> {
    component::register_all(&[
        Descriptor::of::<Position>(),
        Descriptor::of::<Velocity>(),
        Descriptor::of::<Lifetime>(),
        Descriptor::shared::<Team>(),
    ])?;

    let mut world = World::new();
    let lifecycle = world.subscribe(Interest::new().lifecycle());

    // Plain archetype, then a prefab with initial values and a shared team.
    let moving = Archetype::empty().add::<Position>()?.add::<Velocity>()?;
    for i in 0..1_000 {
        let entity = world.create_entity(&moving)?;
        world.set_component(entity, Velocity { dx: i as f32, dy: 1.0 })?;
    }
    let red_bullet = PrefabBuilder::new()
        .with(Velocity { dx: 0.0, dy: 10.0 })?
        .with(Lifetime(3))?
        .with_shared(Team::Red)?
        .build();
    let bullets = world.instantiate_many(&red_bullet, 100)?;
    world.add_shared_component(bullets[0], Team::Blue)?;

    println!(
        "{} entities in {} archetypes, {} blocks",
        world.entity_count(),
        world.components().archetype_count(),
        world.components().block_count()
    );

    // Integrate positions on worker threads.
    let since = world.version();
    let integrate = ComponentQuery::new()
        .include::<Velocity>()?
        .include_mut::<Position>()?;
    world.par_for_each_block(&integrate, |block| {
        let Ok(velocities) = block.components::<Velocity>() else {
            return;
        };
        let Ok(positions) = block.components_mut::<Position>() else {
            return;
        };
        for (p, v) in positions.iter_mut().zip(velocities) {
            p.x += v.dx;
            p.y += v.dy;
        }
    })?;

    let changed = ComponentQuery::new().include::<Position>()?;
    let moved: usize = world
        .blocks_changed(&changed, ChangeFilter::changed::<Position>(since)?)?
        .map(|block| block.len())
        .sum();
    println!("{moved} entities in blocks written since version {since}");

    // Age bullets, recording expiries into a command buffer.
    let mut commands = EntityCommandBuffer::new();
    let aging = ComponentQuery::new()
        .include_mut::<Lifetime>()?
        .include_shared::<Team>()?;
    for block in world.blocks(&aging)? {
        let team = format!("{:?}", block.shared::<Team>()?);
        let lifetimes = block.components_mut::<Lifetime>()?;
        for (entity, lifetime) in block.entities().iter().zip(lifetimes.iter_mut()) {
            lifetime.0 = lifetime.0.saturating_sub(3);
            if lifetime.0 == 0 {
                commands.destroy_entity(*entity);
            }
        }
        println!("aged {} {team} bullets", block.len());
    }
    commands.create_entity(&moving);
    commands.set_component(Target::LastCreated, Position { x: -1.0, y: -1.0 })?;
    let created = commands.playback(&mut world)?;

    println!(
        "{} entities left, {} created by playback, {} lifecycle events",
        world.entity_count(),
        created.len(),
        lifecycle.try_iter().count()
    );
    Ok(())
}
