//! Rolling tick timing

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

pub struct TickTimer {
    started: Instant,
    samples: RingBuffer<Duration>,
    total: u64,
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            samples: RingBuffer::new(capacity),
            total: 0,
        }
    }

    pub fn begin(&mut self) {
        self.started = Instant::now();
    }

    /// Close the current tick and return its duration.
    pub fn end(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.record(elapsed);
        elapsed
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.samples.push(elapsed);
        self.total += 1;
    }

    /// Ticks recorded since creation, not just those still in the window.
    pub fn total_ticks(&self) -> u64 {
        self.total
    }

    pub fn ticks_per_second(&self) -> f64 {
        let mean = self.samples.average().as_secs_f64();
        if mean > 0.0 {
            1.0 / mean
        } else {
            0.0
        }
    }

    pub fn mean_ms(&self) -> f64 {
        self.samples.average().as_secs_f64() * 1000.0
    }

    pub fn range_ms(&self) -> (f64, f64) {
        let (min, max) = self.samples.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}
