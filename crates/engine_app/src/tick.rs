//! Fixed-timestep frame loop.
//!
//! Each tick runs [`System::update`] on every system in ascending priority
//! order. Systems are initialized in the same order before the first tick
//! and cleaned up in reverse order on shutdown.

use std::time::{Duration, Instant};

use anyhow::Context;
use engine_object::System;
use tracing::{debug, info, warn};

use crate::config::FrameConfig;

/// The frame loop state.
pub struct FrameLoop {
    /// Current tick counter.
    tick_id: u64,
    /// Loop configuration.
    config: FrameConfig,
    /// Systems, sorted by priority.
    systems: Vec<Box<dyn System>>,
}

impl FrameLoop {
    /// Create an empty frame loop with the given configuration.
    #[must_use]
    pub fn new(config: FrameConfig) -> Self {
        Self {
            tick_id: 0,
            config,
            systems: Vec::new(),
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Adds a system. Systems with equal priority run in insertion order.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        let priority = system.priority();
        let index = self
            .systems
            .partition_point(|existing| existing.priority() <= priority);
        debug!(system = system.name(), priority, index, "system added");
        self.systems.insert(index, system);
    }

    /// Names of the systems in execution order.
    #[must_use]
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Initializes every system in execution order.
    ///
    /// # Errors
    ///
    /// Returns the first initialization failure, naming the system.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        for system in &mut self.systems {
            let name = system.name().to_string();
            system
                .initialize()
                .with_context(|| format!("failed to initialize system `{name}`"))?;
            info!(system = name, priority = system.priority(), "system initialized");
        }
        Ok(())
    }

    /// Run one tick: every system's `update`, in priority order.
    pub fn tick(&mut self) {
        self.tick_id += 1;
        debug!(tick_id = self.tick_id, systems = self.systems.len(), "tick start");
        for system in &mut self.systems {
            system.update();
        }
    }

    /// Run the loop for the configured number of ticks, or indefinitely,
    /// pacing ticks at the configured rate.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting frame loop"
        );

        loop {
            let start = Instant::now();
            self.tick();

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "frame loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }

    /// Cleans up every system in reverse execution order.
    pub fn shutdown(&mut self) {
        for system in self.systems.iter_mut().rev() {
            system.clean_up();
            info!(system = system.name(), "system cleaned up");
        }
    }
}
