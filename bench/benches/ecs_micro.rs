//! Store microbenchmarks using Criterion.
//!
//! These benchmarks measure individual store operations in isolation:
//! - Entity create/destroy
//! - Column iteration, sequential and parallel
//! - Fragmented iteration across many archetypes
//! - Component add/remove (structural moves)
//! - Shared component splitting

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::seq::SliceRandom;
use rusty_bench::components::{self, *};
use rusty_blocks::ecs::{ChangeFilter, ComponentQuery, Entity, World};

fn world_with(archetype: &rusty_blocks::ecs::Archetype, n: usize) -> (World, Vec<Entity>) {
    let mut world = World::new();
    let entities = world.create_entities(archetype, n).unwrap();
    (world, entities)
}

// =============================================================================
// Create Benchmarks
// =============================================================================

fn bench_create(c: &mut Criterion) {
    components::register().unwrap();
    let moving = components::moving().unwrap();
    let four = components::four().unwrap();
    let mut group = c.benchmark_group("create");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("two_components", count), &count, |b, &n| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..n {
                    black_box(world.create_entity(&moving).unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("four_components", count), &count, |b, &n| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..n {
                    black_box(world.create_entity(&four).unwrap());
                }
            });
        });
    }

    group.finish();
}

// =============================================================================
// Iteration Benchmarks
// =============================================================================

fn bench_simple_iter(c: &mut Criterion) {
    components::register().unwrap();
    let moving = components::moving().unwrap();
    let query = ComponentQuery::new()
        .include::<Velocity>()
        .unwrap()
        .include_mut::<Position>()
        .unwrap();
    let mut group = c.benchmark_group("simple_iter");

    for count in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("pos_vel", count), &count, |b, &n| {
            let (mut world, entities) = world_with(&moving, n);
            for entity in entities {
                world
                    .set_component(entity, Velocity { x: 1.0, y: 0.0, z: 0.0 })
                    .unwrap();
            }

            b.iter(|| {
                for block in world.blocks(&query).unwrap() {
                    let velocities = block.components::<Velocity>().unwrap();
                    let positions = block.components_mut::<Position>().unwrap();
                    for (pos, vel) in positions.iter_mut().zip(velocities) {
                        pos.x += vel.x;
                        pos.y += vel.y;
                        pos.z += vel.z;
                    }
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("pos_vel_parallel", count), &count, |b, &n| {
            let (mut world, _) = world_with(&moving, n);

            b.iter(|| {
                world
                    .par_for_each_block(&query, |block| {
                        let velocities = block.components::<Velocity>().unwrap();
                        let positions = block.components_mut::<Position>().unwrap();
                        for (pos, vel) in positions.iter_mut().zip(velocities) {
                            pos.x += vel.x;
                        }
                    })
                    .unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("unchanged_filtered", count), &count, |b, &n| {
            let (mut world, _) = world_with(&moving, n);
            let read = ComponentQuery::new().include::<Position>().unwrap();

            b.iter(|| {
                let since = world.version();
                let filter = ChangeFilter::changed::<Position>(since).unwrap();
                black_box(world.blocks_changed(&read, filter).unwrap().count());
            });
        });
    }

    group.finish();
}

// =============================================================================
// Fragmented Iteration Benchmarks
// =============================================================================

fn bench_fragmented_iter(c: &mut Criterion) {
    components::register().unwrap();
    let mut group = c.benchmark_group("fragmented_iter");

    // Eight archetypes with 20 entities each, one marker apart.
    let entities_per_archetype = 20;
    group.throughput(Throughput::Elements(8 * entities_per_archetype as u64));

    group.bench_function("8_archetypes", |b| {
        let mut world = World::new();
        for i in 0..8 {
            world
                .create_entities(&components::fragment(i).unwrap(), entities_per_archetype)
                .unwrap();
        }
        let query = ComponentQuery::new().include_mut::<Position>().unwrap();

        b.iter(|| {
            for block in world.blocks(&query).unwrap() {
                for pos in block.components_mut::<Position>().unwrap() {
                    pos.x *= 2.0;
                }
            }
        });
    });

    group.finish();
}

// =============================================================================
// Structural Move Benchmarks
// =============================================================================

fn bench_add_remove(c: &mut Criterion) {
    components::register().unwrap();
    let moving = components::moving().unwrap();
    let mut group = c.benchmark_group("add_remove");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("add_component", count), &count, |b, &n| {
            b.iter_batched(
                || world_with(&moving, n),
                |(mut world, entities)| {
                    for entity in entities {
                        world.add_component(entity, Health::default()).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("remove_component", count), &count, |b, &n| {
            b.iter_batched(
                || world_with(&moving, n),
                |(mut world, entities)| {
                    for entity in entities {
                        world.remove_component::<Velocity>(entity).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("shared_split", count), &count, |b, &n| {
            b.iter_batched(
                || world_with(&moving, n),
                |(mut world, entities)| {
                    for (i, entity) in entities.into_iter().enumerate() {
                        world.add_shared_component(entity, Team((i % 4) as u8)).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// =============================================================================
// Destroy Benchmarks
// =============================================================================

fn bench_destroy(c: &mut Criterion) {
    components::register().unwrap();
    let four = components::four().unwrap();
    let mut group = c.benchmark_group("destroy");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("in_order", count), &count, |b, &n| {
            b.iter_batched(
                || world_with(&four, n),
                |(mut world, entities)| {
                    for entity in entities {
                        world.destroy_entity(entity).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("shuffled", count), &count, |b, &n| {
            b.iter_batched(
                || {
                    let (world, mut entities) = world_with(&four, n);
                    entities.shuffle(&mut rand::thread_rng());
                    (world, entities)
                },
                |(mut world, entities)| {
                    for entity in entities {
                        world.destroy_entity(entity).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    benches,
    bench_create,
    bench_simple_iter,
    bench_fragmented_iter,
    bench_add_remove,
    bench_destroy
);
criterion_main!(benches);
