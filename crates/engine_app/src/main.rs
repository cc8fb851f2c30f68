//! # engine_app
//!
//! Runs the object runtime inside a fixed-timestep frame loop.
//!
//! ## Startup Sequence
//!
//! 1. Read the frame configuration (`ENGINE_TICK_RATE`, `ENGINE_MAX_TICKS`).
//! 2. Create the game object system and build the demo scene.
//! 3. Initialize all systems, run the frame loop, then shut down in reverse
//!    priority order.

mod config;
mod demo;
mod tick;

use std::sync::Arc;

use anyhow::Result;
use engine_object::{GameObjectSystem, GameObjectSystemConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::FrameConfig;
use demo::{Launcher, SceneStats};
use tick::FrameLoop;

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("engine_app=info".parse()?)
                .add_directive("engine_object=info".parse()?),
        )
        .init();

    let config = FrameConfig::from_env();
    info!(tick_rate = config.tick_rate, max_ticks = config.max_ticks, "engine starting");

    let stats = Arc::new(SceneStats::default());
    let objects = GameObjectSystem::with_config(stats.clone(), GameObjectSystemConfig::default());
    let registrar = objects.registrar();
    let scene = demo::build_scene(&registrar)?;

    let mut frame_loop = FrameLoop::new(config);
    frame_loop.add_system(Box::new(Launcher::new(
        scene.probe_template.clone(),
        registrar,
        20,
    )));
    frame_loop.add_system(Box::new(objects));
    info!(order = ?frame_loop.system_names(), "systems registered");
    frame_loop.initialize()?;
    frame_loop.run();
    frame_loop.shutdown();

    let (added, removed) = stats.totals();
    info!(
        added,
        removed,
        ticks = frame_loop.tick_id(),
        ship = %scene.ship.transform().position(),
        turret = %scene.turret.transform().position(),
        "engine shut down"
    );
    Ok(())
}
