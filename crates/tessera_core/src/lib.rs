//! Tessera Core
//!
//! Contains the two coupled halves of the simulation core:
//! - Entity Component System with byte-described, archetype-aware storage
//! - Frame pipeline between the simulation thread and a render consumer

pub mod config;
pub mod ecs;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod time;

pub use config::SimulationConfig;
pub use error::{
    CommandError, ConfigError, FrameRecvError, PipelineError, RegistrationError, WorldError,
};
pub use frame::{Extract, Frame, FrameState};
pub use time::{SimulationClock, TickPacer};
pub use pipeline::{
    Command, CommandSender, FrameReceiver, RejectedCommand, Simulation, SimulationHandle,
    SimulationReport, StopSignal, TickOutcome,
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
