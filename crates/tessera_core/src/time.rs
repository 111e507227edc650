//! Simulation time
//!
//! Ticks are variable length: each tick measures the wall time since the
//! previous one, never reporting less than a configured floor.

use std::time::{Duration, Instant};

/// Tracks tick count and per-tick delta for the simulation thread.
#[derive(Debug)]
pub struct SimulationClock {
    floor: Duration,
    last: Option<Instant>,
    tick_count: u64,
    total: Duration,
}

impl SimulationClock {
    pub fn new(floor: Duration) -> Self {
        Self {
            floor,
            last: None,
            tick_count: 0,
            total: Duration::ZERO,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Sum of all deltas handed out so far.
    pub fn total_time(&self) -> Duration {
        self.total
    }

    /// Start a tick now and return its delta in seconds.
    pub fn advance(&mut self) -> f32 {
        self.advance_at(Instant::now())
    }

    /// Start a tick at `now`. The first tick gets the floor.
    pub fn advance_at(&mut self, now: Instant) -> f32 {
        let elapsed = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        let delta = elapsed.max(self.floor);
        self.last = Some(now);
        self.tick_count += 1;
        self.total += delta;
        delta.as_secs_f32()
    }
}

/// Optional fixed-rate throttle. Without a rate, `wait` returns at once.
#[derive(Debug)]
pub struct TickPacer {
    interval: Option<Duration>,
    deadline: Option<Instant>,
}

impl TickPacer {
    pub fn new(tick_rate_hz: Option<u32>) -> Self {
        Self {
            interval: tick_rate_hz
                .filter(|&hz| hz > 0)
                .map(|hz| Duration::from_secs_f64(1.0 / f64::from(hz))),
            deadline: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Sleep out whatever remains of the current tick interval.
    pub fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let deadline = self.deadline.unwrap_or(now + interval);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Never schedule a deadline in the past.
        self.deadline = Some(deadline.max(now) + interval);
    }
}
