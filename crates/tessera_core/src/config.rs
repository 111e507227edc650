//! Simulation configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted delta floor, in seconds.
pub const MAX_MIN_DELTA_SECONDS: f32 = 3600.0;

/// Tunables for the simulation loop and frame pipeline.
///
/// Every field has a default, so a config file only needs the values it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Frames published but not yet rendered before the producer blocks.
    pub max_frames_in_flight: usize,
    /// Commands that can queue before senders block.
    pub inbox_capacity: usize,
    /// Smallest delta handed to systems, in seconds.
    pub min_delta_seconds: f32,
    /// How long the producer waits on the oldest frame before giving up.
    pub render_timeout_ms: u64,
    /// Records per chunk for parallel queries.
    pub parallel_chunk_size: usize,
    /// Target tick rate; `None` runs as fast as the consumer allows.
    pub tick_rate_hz: Option<u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 3,
            inbox_capacity: 10,
            min_delta_seconds: 0.001,
            render_timeout_ms: 5000,
            parallel_chunk_size: 1024,
            tick_rate_hz: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 {
            return Err(invalid("max_frames_in_flight", "must be at least 1"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("inbox_capacity", "must be at least 1"));
        }
        if !self.min_delta_seconds.is_finite() || self.min_delta_seconds < 0.0 {
            return Err(invalid(
                "min_delta_seconds",
                "must be a finite, non-negative number",
            ));
        }
        if self.min_delta_seconds > MAX_MIN_DELTA_SECONDS
            || Duration::try_from_secs_f32(self.min_delta_seconds).is_err()
        {
            return Err(invalid(
                "min_delta_seconds",
                &format!("must be at most {MAX_MIN_DELTA_SECONDS} seconds"),
            ));
        }
        if self.render_timeout_ms == 0 {
            return Err(invalid("render_timeout_ms", "must be at least 1"));
        }
        if self.parallel_chunk_size == 0 {
            return Err(invalid("parallel_chunk_size", "must be at least 1"));
        }
        if self.tick_rate_hz == Some(0) {
            return Err(invalid("tick_rate_hz", "must be positive when set"));
        }
        Ok(())
    }

    /// The delta floor. Out-of-range values clamp into `0..=MAX_MIN_DELTA_SECONDS`.
    pub fn min_delta(&self) -> Duration {
        let seconds = self.min_delta_seconds.clamp(0.0, MAX_MIN_DELTA_SECONDS);
        Duration::try_from_secs_f32(seconds).unwrap_or_default()
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
