//! Tessera Metrics - Tick timing and counters for the simulation loop
//!
//! Everything here vanishes when the `metrics` feature is off: the same
//! types exist as empty stubs so callers never need their own `cfg`s.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tessera_metrics::TickTimer;
//!
//! let mut timer = TickTimer::new(120);
//! timer.begin();
//! // ... run one tick ...
//! timer.end();
//! println!("{:.1} ticks/s", timer.ticks_per_second());
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod ring_buffer;
#[cfg(feature = "metrics")]
mod system_timings;
#[cfg(feature = "metrics")]
mod tick_timer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;
#[cfg(feature = "metrics")]
pub use system_timings::SystemTimings;
#[cfg(feature = "metrics")]
pub use tick_timer::TickTimer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct TickTimer;

#[cfg(not(feature = "metrics"))]
impl TickTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn record(&mut self, _elapsed: std::time::Duration) {}
    pub fn total_ticks(&self) -> u64 { 0 }
    pub fn ticks_per_second(&self) -> f64 { 0.0 }
    pub fn mean_ms(&self) -> f64 { 0.0 }
    pub fn range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn add(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
}

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct SystemTimings;

#[cfg(not(feature = "metrics"))]
impl SystemTimings {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn time<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn mean_ms(&self, _name: &str) -> f64 { 0.0 }
    pub fn summary(&self) -> Vec<(String, f64)> { Vec::new() }
}
