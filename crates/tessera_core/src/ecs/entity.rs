//! Entity handles and id allocation
//!
//! Entities are plain 64-bit ids. They carry no data and no generation:
//! ids are handed out by a monotonic counter and never reused, so a stale
//! handle can only ever refer to nothing, never to a different entity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Entity handle (opaque ID)
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u64);

impl Entity {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Shared id generator owned by a [`crate::ecs::World`].
///
/// Clones share one counter, so threads outside the simulation can mint
/// ids for entities they are about to submit through the command inbox.
/// Ids are never reclaimed.
#[derive(Clone, Debug, Default)]
pub struct EntityAllocator {
    next: Arc<AtomicU64>,
}

impl EntityAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> Entity {
        Entity(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate `count` consecutive ids in one step.
    pub fn allocate_many(&self, count: usize) -> Vec<Entity> {
        let first = self.next.fetch_add(count as u64, Ordering::Relaxed);
        (first..first + count as u64).map(Entity).collect()
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
