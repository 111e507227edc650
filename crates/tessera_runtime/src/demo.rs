//! Headless particle demo
//!
//! Half of the particles only have a position and never move. The other
//! half live in the `position_velocity` archetype and drift across the
//! arena, wrapping around at the edges.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tessera_core::ecs::{
    system_fn, ArchetypeHandle, ComponentHandle, Entity, EntityAllocator, Field, System, World,
    WorldBuilder,
};
use tessera_core::{define_component, CommandSender, Frame};
use tessera_metrics::Counter;

use crate::settings::DemoSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
define_component!(Position, "position");

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}
define_component!(Velocity, "velocity");

/// Handles for the demo's component layout.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub position: ComponentHandle<Position>,
    pub velocity: ComponentHandle<Velocity>,
    pub moving: ArchetypeHandle,
    moving_position: Field<Position>,
    moving_velocity: Field<Velocity>,
}

/// Register the demo components and build an empty world.
pub fn build_world() -> Result<(World, Layout)> {
    let mut builder = WorldBuilder::new();
    let position = builder.register::<Position>()?;
    let velocity = builder.register::<Velocity>()?;
    let moving = builder.archetype("position_velocity", &[position.id(), velocity.id()])?;
    let world = builder.build();

    let (Some(moving_position), Some(moving_velocity)) = (
        world.field(moving, position),
        world.field(moving, velocity),
    ) else {
        anyhow::bail!("archetype is missing its members");
    };
    let layout = Layout {
        position,
        velocity,
        moving,
        moving_position,
        moving_velocity,
    };
    Ok((world, layout))
}

#[derive(Clone, Copy, Debug)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Arena {
    pub fn from_settings(settings: &DemoSettings) -> Self {
        Self {
            width: settings.arena_width,
            height: settings.arena_height,
        }
    }

    /// Move by `velocity * delta`, reappearing on the opposite edge when
    /// leaving the arena.
    pub fn step(&self, position: Position, velocity: Velocity, delta: f32) -> Position {
        Position {
            x: wrap(position.x + velocity.x * delta, self.width),
            y: wrap(position.y + velocity.y * delta, self.height),
        }
    }

    pub fn random_position(&self, rng: &mut impl Rng) -> Position {
        Position {
            x: rng.gen::<f32>() * self.width,
            y: rng.gen::<f32>() * self.height,
        }
    }
}

fn wrap(value: f32, limit: f32) -> f32 {
    if value > limit {
        0.0
    } else if value < 0.0 {
        limit
    } else {
        value
    }
}

pub fn random_velocity(rng: &mut impl Rng) -> Velocity {
    Velocity {
        x: (rng.gen::<f32>() - 0.5) * 10.0,
        y: (rng.gen::<f32>() - 0.5) * 10.0,
    }
}

pub fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Spawn the initial particles: first half stationary, second half moving.
pub fn populate(
    world: &mut World,
    layout: &Layout,
    settings: &DemoSettings,
    rng: &mut StdRng,
) -> Result<()> {
    let arena = Arena::from_settings(settings);
    let entities = world.entity_allocator().allocate_many(settings.entity_count);
    let (stationary, moving) = entities.split_at(settings.entity_count / 2);

    world.add_all(stationary, &[layout.position.id()])?;
    world.add_all(moving, &[layout.moving.id()])?;

    world.for_each(layout.position, |_, position| {
        *position = arena.random_position(&mut *rng);
    });
    world.for_each(layout.velocity, |_, velocity| {
        *velocity = random_velocity(&mut *rng);
    });

    tracing::info!(
        stationary = stationary.len(),
        moving = moving.len(),
        "particles spawned"
    );
    Ok(())
}

/// Advance every moving particle, in parallel.
pub fn motion_system(layout: Layout, arena: Arena) -> impl System {
    let kind = layout.moving.id();
    let position = layout.moving_position;
    let velocity = layout.moving_velocity;
    system_fn("motion", move |world: &mut World, delta: f32| {
        world.par_for_each_record(kind, |_, mut record| {
            let v = record.read(velocity);
            record.update(position, |p| *p = arena.step(*p, v, delta));
        });
    })
}

/// Consumer-side churn: queue new moving particles and remove random ones.
pub struct Churn {
    allocator: EntityAllocator,
    layout: Layout,
    arena: Arena,
    spawn_batch: usize,
    despawn_batch: usize,
    rng: StdRng,
    counts: Counter,
}

impl Churn {
    pub fn new(
        allocator: EntityAllocator,
        layout: Layout,
        settings: &DemoSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            allocator,
            layout,
            arena: Arena::from_settings(settings),
            spawn_batch: settings.spawn_batch,
            despawn_batch: settings.despawn_batch,
            rng,
            counts: Counter::new(),
        }
    }

    /// Particles requested for spawning and removal so far.
    pub fn counts(&self) -> &Counter {
        &self.counts
    }

    /// Queue a batch of new moving particles with random state.
    pub fn spawn(&mut self, commands: &CommandSender) -> Result<()> {
        let batch = self.allocator.allocate_many(self.spawn_batch);
        let initial: Vec<(Entity, Position, Velocity)> = batch
            .iter()
            .map(|&entity| {
                (
                    entity,
                    self.arena.random_position(&mut self.rng),
                    random_velocity(&mut self.rng),
                )
            })
            .collect();
        let layout = self.layout;
        self.counts.add("spawn_requested", batch.len() as u64);

        commands.send(move |world| {
            if let Err(err) = world.add_all(&batch, &[layout.moving.id()]) {
                tracing::warn!(error = %err, "spawn command rejected");
                return;
            }
            for (entity, position, velocity) in initial {
                world.set(entity, layout.position, position);
                world.set(entity, layout.velocity, velocity);
            }
        })?;
        Ok(())
    }

    /// Queue removal of random particles seen in `frame`.
    pub fn despawn(&mut self, frame: &Frame, commands: &CommandSender) -> Result<()> {
        let mut visible = Vec::new();
        frame.for_each(self.layout.position, |entity, _| visible.push(entity));
        let doomed: Vec<Entity> = visible
            .choose_multiple(&mut self.rng, self.despawn_batch)
            .copied()
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        self.counts.add("despawn_requested", doomed.len() as u64);

        commands.send(move |world| {
            let removed = world.remove_all(&doomed);
            tracing::trace!(removed, "despawn command applied");
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Simulation, SimulationConfig, StopSignal, TickOutcome};

    #[test]
    fn positions_wrap_at_edges() {
        let arena = Arena {
            width: 100.0,
            height: 50.0,
        };
        let right = arena.step(Position { x: 99.0, y: 10.0 }, Velocity { x: 4.0, y: 0.0 }, 1.0);
        assert_eq!(right, Position { x: 0.0, y: 10.0 });

        let below = arena.step(Position { x: 10.0, y: 1.0 }, Velocity { x: 0.0, y: -4.0 }, 1.0);
        assert_eq!(below, Position { x: 10.0, y: 50.0 });

        let inside = arena.step(Position { x: 10.0, y: 10.0 }, Velocity { x: 2.0, y: 2.0 }, 0.5);
        assert_eq!(inside, Position { x: 11.0, y: 11.0 });
    }

    #[test]
    fn populate_splits_between_stores() {
        let (mut world, layout) = build_world().unwrap();
        let settings = DemoSettings {
            entity_count: 100,
            ..DemoSettings::default()
        };
        populate(&mut world, &layout, &settings, &mut rng_from(Some(7))).unwrap();

        assert_eq!(world.store(layout.position.id()).unwrap().len(), 50);
        assert_eq!(world.store(layout.moving.id()).unwrap().len(), 50);
        world.for_each(layout.position, |_, p| {
            assert!((0.0..=1280.0).contains(&p.x) && (0.0..=1024.0).contains(&p.y));
        });
    }

    #[test]
    fn motion_only_moves_archetype_members() {
        let (mut world, layout) = build_world().unwrap();
        let settings = DemoSettings {
            entity_count: 20,
            ..DemoSettings::default()
        };
        populate(&mut world, &layout, &settings, &mut rng_from(Some(1))).unwrap();
        let stationary = world.store(layout.position.id()).unwrap().entities()[0];
        let before = world.get(stationary, layout.position);

        let (mut sim, _commands, frames) =
            Simulation::new(world, SimulationConfig::default()).unwrap();
        sim.add_system(motion_system(layout, Arena::from_settings(&settings)))
            .unwrap();
        assert_eq!(
            sim.tick(&StopSignal::new()).unwrap(),
            TickOutcome::Published(1)
        );

        assert_eq!(sim.world().get(stationary, layout.position), before);
        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.extract(layout.moving).map(|e| e.len()), Some(10));
    }

    #[test]
    fn churn_commands_add_and_remove() {
        let (mut world, layout) = build_world().unwrap();
        let settings = DemoSettings {
            entity_count: 4,
            spawn_batch: 3,
            despawn_batch: 2,
            ..DemoSettings::default()
        };
        populate(&mut world, &layout, &settings, &mut rng_from(Some(3))).unwrap();
        let allocator = world.entity_allocator();

        let (mut sim, commands, frames) =
            Simulation::new(world, SimulationConfig::default()).unwrap();
        let stop = StopSignal::new();
        let mut churn = Churn::new(allocator, layout, &settings, rng_from(Some(4)));

        churn.spawn(&commands).unwrap();
        sim.tick(&stop).unwrap();
        assert_eq!(sim.world().entity_count(), 7);

        let frame = frames.try_recv().unwrap();
        churn.despawn(&frame, &commands).unwrap();
        frame.mark_rendered();
        sim.tick(&stop).unwrap();
        assert_eq!(sim.world().entity_count(), 5);
        assert_eq!(churn.counts().get("spawn_requested"), 3);
        assert_eq!(churn.counts().get("despawn_requested"), 2);
    }
}
