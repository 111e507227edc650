//! Per-system rolling timings

use super::ring_buffer::RingBuffer;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct SystemTimings {
    capacity: usize,
    order: Vec<String>,
    windows: HashMap<String, RingBuffer<Duration>>,
}

impl SystemTimings {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            windows: HashMap::new(),
        }
    }

    /// Run `f`, charging its wall time to `name`.
    pub fn time<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        if !self.windows.contains_key(name) {
            self.order.push(name.to_string());
            self.windows
                .insert(name.to_string(), RingBuffer::new(self.capacity));
        }
        if let Some(window) = self.windows.get_mut(name) {
            window.push(elapsed);
        }
        result
    }

    pub fn mean_ms(&self, name: &str) -> f64 {
        self.windows
            .get(name)
            .map(|window| window.average().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    /// Mean time per system, in first-seen order.
    pub fn summary(&self) -> Vec<(String, f64)> {
        self.order
            .iter()
            .map(|name| (name.clone(), self.mean_ms(name)))
            .collect()
    }
}

impl Default for SystemTimings {
    fn default() -> Self {
        Self::new(120)
    }
}
