// system.rs - Per-tick systems run by the simulation loop

use crate::ecs::World;
use crate::error::RegistrationError;
use std::collections::HashMap;
use std::fmt;
use tessera_metrics::SystemTimings;

/// Logic run once per tick with exclusive access to the world.
pub trait System: Send {
    fn name(&self) -> &str;

    fn update(&mut self, world: &mut World, delta_seconds: f32);
}

/// [`System`] backed by a closure.
pub struct FnSystem<F> {
    name: String,
    run: F,
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, f32) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, world: &mut World, delta_seconds: f32) {
        (self.run)(world, delta_seconds)
    }
}

/// Wrap a closure as a named system.
pub fn system_fn<F>(name: impl Into<String>, run: F) -> FnSystem<F>
where
    F: FnMut(&mut World, f32) + Send,
{
    FnSystem {
        name: name.into(),
        run,
    }
}

/// Handle assigned to each registered system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SystemHandle(u32);

impl SystemHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the raw index backing this handle.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Systems in registration order.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<Box<dyn System>>,
    name_lookup: HashMap<String, SystemHandle>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: Box<dyn System>) -> Result<SystemHandle, RegistrationError> {
        let name = system.name().to_string();
        if self.name_lookup.contains_key(&name) {
            return Err(RegistrationError::DuplicateSystem { name });
        }

        let handle = SystemHandle::new(self.systems.len() as u32);
        self.name_lookup.insert(name, handle);
        self.systems.push(system);
        Ok(handle)
    }

    pub fn lookup(&self, name: &str) -> Option<SystemHandle> {
        self.name_lookup.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|system| system.name())
    }

    /// Run every system once, in registration order.
    pub fn run_all(&mut self, world: &mut World, delta_seconds: f32, timings: &mut SystemTimings) {
        for system in &mut self.systems {
            let name = system.name().to_string();
            timings.time(&name, || system.update(world, delta_seconds));
        }
    }
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
