// archetype.rs - Component sets used for routing entities to stores
//
// A component set is the exact combination of simple components an
// entity carries. Stores are looked up by exact set equality.

use crate::ecs::ComponentId;

/// Sorted, deduplicated list of simple component ids.
///
/// Kept sorted so that equality and hashing do not depend on the order
/// in which components were requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet {
    components: Vec<ComponentId>,
}

impl ComponentSet {
    /// Create a set from a list of component ids.
    ///
    /// The input will be sorted and deduplicated.
    pub fn from_components(mut comps: Vec<ComponentId>) -> Self {
        comps.sort_unstable();
        comps.dedup();
        Self { components: comps }
    }

    /// Check if this set contains a specific component.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.components.binary_search(&id).is_ok()
    }

    /// Union of two sets.
    pub fn union(&self, other: &ComponentSet) -> ComponentSet {
        let mut merged = Vec::with_capacity(self.components.len() + other.components.len());
        merged.extend_from_slice(&self.components);
        merged.extend_from_slice(&other.components);
        Self::from_components(merged)
    }

    pub fn as_slice(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl FromIterator<ComponentId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        Self::from_components(iter.into_iter().collect())
    }
}
