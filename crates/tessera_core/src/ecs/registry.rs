// registry.rs - Frozen table of component descriptors
//
// Descriptors are appended during the builder phase and never change after
// `WorldBuilder::build`. The registry also precomputes, for every kind, the
// stores a query for that kind must visit and where inside their records
// the kind lives.

use crate::ecs::{
    ArchetypeMember, Component, ComponentHandle, ComponentId, ComponentKind, ComponentMeta,
    ComponentSet, Field,
};
use crate::error::RegistrationError;
use std::collections::{HashMap, HashSet};

/// One store a query has to visit, and the slice of each record to expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryTarget {
    pub store: ComponentId,
    pub offset: usize,
    pub size: usize,
}

/// Registered descriptors, indexed by [`ComponentId`].
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    metas: Vec<ComponentMeta>,
    targets: HashMap<ComponentId, Vec<QueryTarget>>,
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentMeta> {
        self.metas.get(id.slot())
    }

    pub fn name_of(&self, id: ComponentId) -> Option<&str> {
        self.get(id).map(|meta| meta.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.metas.iter()
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Set of simple components carried by a record of `id`.
    ///
    /// A simple descriptor maps to itself; an archetype to its members.
    pub fn component_set(&self, id: ComponentId) -> Option<ComponentSet> {
        let meta = self.get(id)?;
        Some(meta.slots().into_iter().map(|slot| slot.component).collect())
    }

    /// Field for `handle`'s component inside records of `owner`.
    ///
    /// Returns `None` when `owner` does not carry that component.
    pub fn field<T: Component>(
        &self,
        owner: ComponentId,
        handle: ComponentHandle<T>,
    ) -> Option<Field<T>> {
        let slot = self.get(owner)?.slot_of(handle.id())?;
        Some(Field::new(owner, slot.offset))
    }

    /// Stores visited by a query for `kind`, exact store first.
    pub fn targets(&self, kind: ComponentId) -> &[QueryTarget] {
        self.targets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Human-readable names for a component set, used in error messages.
    pub(crate) fn names(&self, set: &ComponentSet) -> Vec<String> {
        set.iter()
            .map(|id| match self.name_of(id) {
                Some(name) => name.to_string(),
                None => id.to_string(),
            })
            .collect()
    }

    pub(crate) fn push_simple(
        &mut self,
        name: &str,
        size: usize,
    ) -> Result<ComponentId, RegistrationError> {
        if size == 0 {
            return Err(RegistrationError::ZeroSized {
                name: name.to_string(),
            });
        }
        let id = self.next_id();
        self.metas.push(ComponentMeta {
            id,
            name: name.to_string(),
            size,
            kind: ComponentKind::Simple,
        });
        self.rebuild_targets();
        Ok(id)
    }

    pub(crate) fn push_archetype(
        &mut self,
        name: &str,
        components: &[ComponentId],
    ) -> Result<ComponentId, RegistrationError> {
        if components.len() < 2 {
            return Err(RegistrationError::TooFewMembers {
                archetype: name.to_string(),
                count: components.len(),
            });
        }

        let mut seen = HashSet::with_capacity(components.len());
        let mut members = Vec::with_capacity(components.len());
        let mut offset = 0;
        for &component in components {
            let meta = self
                .get(component)
                .ok_or_else(|| RegistrationError::UnknownMember {
                    archetype: name.to_string(),
                    component,
                })?;
            if meta.is_composite() {
                return Err(RegistrationError::NestedArchetype {
                    archetype: name.to_string(),
                    member: meta.name.clone(),
                });
            }
            if !seen.insert(component) {
                return Err(RegistrationError::DuplicateMember {
                    archetype: name.to_string(),
                    member: meta.name.clone(),
                });
            }
            members.push(ArchetypeMember {
                component,
                offset,
                size: meta.size,
            });
            offset += meta.size;
        }

        let id = self.next_id();
        self.metas.push(ComponentMeta {
            id,
            name: name.to_string(),
            size: offset,
            kind: ComponentKind::Composite(members),
        });
        self.rebuild_targets();
        Ok(id)
    }

    fn next_id(&self) -> ComponentId {
        ComponentId::new(self.metas.len() as u32)
    }

    fn rebuild_targets(&mut self) {
        let mut targets: HashMap<ComponentId, Vec<QueryTarget>> = HashMap::new();
        for meta in &self.metas {
            targets.entry(meta.id).or_default().insert(
                0,
                QueryTarget {
                    store: meta.id,
                    offset: 0,
                    size: meta.size,
                },
            );
            for member in meta.members() {
                targets.entry(member.component).or_default().push(QueryTarget {
                    store: meta.id,
                    offset: member.offset,
                    size: member.size,
                });
            }
        }
        self.targets = targets;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archetype_offsets_concatenate_members() {
        let mut registry = ComponentRegistry::new();
        let a = registry.push_simple("a", 8).unwrap();
        let b = registry.push_simple("b", 12).unwrap();
        let ab = registry.push_archetype("ab", &[a, b]).unwrap();

        let meta = registry.get(ab).unwrap();
        assert_eq!(meta.size, 20);
        assert_eq!(meta.slot_of(b).map(|m| m.offset), Some(8));
        assert_eq!(
            registry.component_set(ab),
            Some(ComponentSet::from_components(vec![a, b]))
        );
    }

    #[test]
    fn targets_list_exact_store_then_archetypes() {
        let mut registry = ComponentRegistry::new();
        let a = registry.push_simple("a", 8).unwrap();
        let b = registry.push_simple("b", 8).unwrap();
        let ab = registry.push_archetype("ab", &[a, b]).unwrap();

        let targets = registry.targets(b);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].store, b);
        assert_eq!(
            targets[1],
            QueryTarget {
                store: ab,
                offset: 8,
                size: 8
            }
        );

        // An archetype query only visits the archetype store itself.
        assert_eq!(registry.targets(ab).len(), 1);
    }

    #[test]
    fn invalid_archetypes_are_rejected() {
        let mut registry = ComponentRegistry::new();
        let a = registry.push_simple("a", 4).unwrap();
        let b = registry.push_simple("b", 4).unwrap();
        let ab = registry.push_archetype("ab", &[a, b]).unwrap();

        assert!(matches!(
            registry.push_archetype("solo", &[a]),
            Err(RegistrationError::TooFewMembers { count: 1, .. })
        ));
        assert!(matches!(
            registry.push_archetype("twice", &[a, a]),
            Err(RegistrationError::DuplicateMember { .. })
        ));
        assert!(matches!(
            registry.push_archetype("nested", &[ab, a]),
            Err(RegistrationError::NestedArchetype { .. })
        ));
        assert!(matches!(
            registry.push_archetype("ghost", &[a, ComponentId::new(42)]),
            Err(RegistrationError::UnknownMember { .. })
        ));
        assert!(matches!(
            registry.push_simple("empty", 0),
            Err(RegistrationError::ZeroSized { .. })
        ));
        assert_eq!(registry.len(), 3);
    }
}
