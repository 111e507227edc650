// error.rs - Error types for registration, routing, configuration and the pipeline

use crate::ecs::ComponentId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while describing components, archetypes and systems.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("component '{name}' has zero size")]
    ZeroSized { name: String },

    #[error("archetype '{archetype}' references unknown component {component}")]
    UnknownMember {
        archetype: String,
        component: ComponentId,
    },

    #[error("archetype '{archetype}' cannot contain archetype '{member}'")]
    NestedArchetype { archetype: String, member: String },

    #[error("archetype '{archetype}' lists component '{member}' more than once")]
    DuplicateMember { archetype: String, member: String },

    #[error("archetype '{archetype}' needs at least two members, got {count}")]
    TooFewMembers { archetype: String, count: usize },

    #[error("'{requested}' covers the same component set as '{existing}'")]
    DuplicateComponentSet { requested: String, existing: String },

    #[error("system '{name}' is already registered")]
    DuplicateSystem { name: String },
}

/// Errors raised by [`crate::ecs::World`] mutations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("unsupported set of components, no store for [{}]", components.join(", "))]
    UnsupportedComponentSet { components: Vec<String> },

    #[error("component {component} is not registered")]
    UnknownComponent { component: ComponentId },
}

/// Errors raised while loading or validating a [`crate::SimulationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors that end the simulation loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame {tick} was not rendered within {timeout_ms} ms")]
    RenderTimeout { tick: u64, timeout_ms: u64 },

    #[error("simulation thread panicked")]
    SimulationPanicked,

    #[error("failed to spawn simulation thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// Errors returned when submitting work to the simulation inbox.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command inbox is full")]
    Full,

    #[error("simulation has shut down")]
    Disconnected,
}

/// Why [`FrameReceiver::recv_timeout`](crate::FrameReceiver::recv_timeout) returned no frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameRecvError {
    #[error("no frame arrived in time")]
    Timeout,

    #[error("simulation has shut down")]
    Disconnected,
}
