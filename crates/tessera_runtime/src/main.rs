//! Tessera Runtime
//!
//! Headless demo binary: the simulation thread moves particles while the
//! main thread plays the render consumer, reading every frame and signalling
//! completion. Usage: `tessera [settings.json]`.

mod demo;
mod settings;

use anyhow::Result;
use demo::{Arena, Churn, Layout, Position};
use settings::RuntimeSettings;
use tessera_core::{Frame, Simulation};
use tessera_metrics::TickTimer;
use tracing_subscriber::EnvFilter;

/// Frames between consumer-side progress logs.
const LOG_EVERY_FRAMES: u64 = 120;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    tracing::info!("Tessera v{}", tessera_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(%path, "loading settings");
            RuntimeSettings::load(&path)?
        }
        None => RuntimeSettings::default(),
    };

    let (mut world, layout) = demo::build_world()?;
    let mut rng = demo::rng_from(settings.demo.seed);
    demo::populate(&mut world, &layout, &settings.demo, &mut rng)?;
    let allocator = world.entity_allocator();

    let (mut simulation, commands, frames) = Simulation::new(world, settings.simulation.clone())?;
    simulation.add_system(demo::motion_system(
        layout,
        Arena::from_settings(&settings.demo),
    ))?;
    let handle = simulation.spawn()?;

    let churn_seed = settings.demo.seed.map(|seed| seed.wrapping_add(1));
    let mut churn = Churn::new(allocator, layout, &settings.demo, demo::rng_from(churn_seed));
    let churn_every = settings.demo.churn_every_frames;

    let mut timer = TickTimer::new(LOG_EVERY_FRAMES as usize);
    let mut rendered = 0u64;
    while rendered < settings.demo.frames {
        timer.begin();
        let Some(frame) = frames.recv() else {
            tracing::warn!(rendered, "simulation ended before the last frame");
            break;
        };

        let (visible, centroid) = render(&frame, &layout);
        if churn_every > 0 && (rendered + 1) % churn_every == 0 {
            churn.spawn(&commands)?;
            churn.despawn(&frame, &commands)?;
        }
        frame.mark_rendered();
        rendered += 1;
        timer.end();

        if rendered % LOG_EVERY_FRAMES == 0 {
            tracing::info!(
                tick = frame.tick(),
                visible,
                centroid_x = centroid.x,
                centroid_y = centroid.y,
                fps = timer.ticks_per_second(),
                "rendered"
            );
        }
    }

    tracing::info!(
        rendered,
        spawn_requested = churn.counts().get("spawn_requested"),
        despawn_requested = churn.counts().get("despawn_requested"),
        "consumer finished"
    );
    let report = handle.stop_and_join()?;
    tracing::info!(report = %serde_json::to_string(&report)?, "simulation finished");
    Ok(())
}

/// Stand-in for drawing: walk every position in the frame.
fn render(frame: &Frame, layout: &Layout) -> (usize, Position) {
    let mut count = 0usize;
    let mut sum = Position::default();
    frame.for_each(layout.position, |_, position| {
        count += 1;
        sum.x += position.x;
        sum.y += position.y;
    });
    if count == 0 {
        return (0, sum);
    }
    let centroid = Position {
        x: sum.x / count as f32,
        y: sum.y / count as f32,
    };
    (count, centroid)
}
