//! Runtime settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::SimulationConfig;

/// Everything the `tessera` binary can be configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub simulation: SimulationConfig,
    pub demo: DemoSettings,
}

/// Shape of the headless particle demo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Initial particles; half stationary, half moving.
    pub entity_count: usize,
    pub arena_width: f32,
    pub arena_height: f32,
    /// Frames the consumer renders before shutting down.
    pub frames: u64,
    /// Every this many frames the consumer spawns and removes particles.
    pub churn_every_frames: u64,
    pub spawn_batch: usize,
    pub despawn_batch: usize,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            entity_count: 120_000,
            arena_width: 1280.0,
            arena_height: 1024.0,
            frames: 600,
            churn_every_frames: 60,
            spawn_batch: 10,
            despawn_batch: 11,
            seed: None,
        }
    }
}

impl RuntimeSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing settings from {}", path.display()))?;
        settings.simulation.validate()?;
        Ok(settings)
    }
}
