//! Entity Component System core types.
//!
//! Every registered descriptor owns exactly one dense [`EntityStore`]:
//! a list of entity ids plus a byte buffer of fixed-size records. Simple
//! descriptors hold one component per record; archetypes pack several
//! simple components back to back. An entity lives in the single store
//! whose component set equals its own.
//!
//! Registration happens once through [`WorldBuilder`]; the resulting
//! [`ComponentRegistry`] is frozen and shared with every [`crate::Frame`].

mod archetype;
mod builder;
mod component;
mod entity;
mod record;
mod registry;
mod storage;
mod system;
mod world;

pub use archetype::ComponentSet;
pub use builder::WorldBuilder;
pub use component::{
    ArchetypeHandle, ArchetypeMember, Component, ComponentHandle, ComponentId, ComponentKind,
    ComponentMeta, Field,
};
pub use entity::{Entity, EntityAllocator};
pub use record::{ChunkMut, Record, RecordMut};
pub use registry::{ComponentRegistry, QueryTarget};
pub use storage::EntityStore;
pub use system::{system_fn, FnSystem, System, SystemHandle, SystemRegistry};
pub use world::World;
