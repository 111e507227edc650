// builder.rs - Registration phase for a World
//
// Components and archetypes are registered here, then `build` freezes the
// registry and creates one store per descriptor. Nothing can be registered
// on a built World.

use crate::ecs::{
    ArchetypeHandle, Component, ComponentHandle, ComponentId, ComponentRegistry, ComponentSet,
    World,
};
use crate::error::RegistrationError;
use std::collections::HashMap;
use std::mem::size_of;

/// Chunk size a fresh world uses until a `Simulation` applies its config.
const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Collects descriptors before the world is built.
#[derive(Debug)]
pub struct WorldBuilder {
    registry: ComponentRegistry,
    routes: HashMap<ComponentSet, ComponentId>,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            routes: HashMap::new(),
        }
    }

    /// Register a Rust component; its record layout is the type's layout.
    pub fn register<T: Component>(&mut self) -> Result<ComponentHandle<T>, RegistrationError> {
        let id = self.register_raw(T::NAME, size_of::<T>())?;
        Ok(ComponentHandle::new(id))
    }

    /// Register a byte-only component of `size` bytes.
    pub fn register_raw(&mut self, name: &str, size: usize) -> Result<ComponentId, RegistrationError> {
        let id = self.registry.push_simple(name, size)?;
        self.routes
            .insert(ComponentSet::from_components(vec![id]), id);
        tracing::debug!(component = name, %id, size, "registered component");
        Ok(id)
    }

    /// Register an archetype packing `components` back to back.
    ///
    /// Entities carrying exactly this set of components are stored here
    /// rather than in the individual component stores.
    pub fn archetype(
        &mut self,
        name: &str,
        components: &[ComponentId],
    ) -> Result<ArchetypeHandle, RegistrationError> {
        let set = ComponentSet::from_components(components.to_vec());
        // Sets that collapsed duplicates are rejected by the registry instead.
        if let Some(&existing) = self.routes.get(&set).filter(|_| set.len() == components.len()) {
            return Err(RegistrationError::DuplicateComponentSet {
                requested: name.to_string(),
                existing: self
                    .registry
                    .name_of(existing)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let id = self.registry.push_archetype(name, components)?;
        self.routes.insert(set, id);
        if let Some(meta) = self.registry.get(id) {
            tracing::debug!(
                archetype = name,
                %id,
                size = meta.size,
                members = components.len(),
                "registered archetype"
            );
        }
        Ok(ArchetypeHandle::new(id))
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Freeze registration and create the world.
    pub fn build(self) -> World {
        World::from_parts(self.registry, self.routes, DEFAULT_CHUNK_SIZE)
    }
}
