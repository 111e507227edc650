// world.rs - Entity routing and queries across stores
//
// An entity's component set decides which single store holds it. Queries
// for a component visit the store registered for exactly that component
// plus every archetype store that contains it, exposing only the matching
// slice of each archetype record.

use crate::ecs::{
    ArchetypeHandle, Component, ComponentHandle, ComponentId, ComponentRegistry, ComponentSet,
    Entity, EntityAllocator, EntityStore, Field, RecordMut,
};
use crate::error::WorldError;
use crate::frame::Extract;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Where one entity of an `add_all` batch ends up.
enum Placement {
    Fresh,
    Move(ComponentId),
    Stay,
}

/// All stores plus the frozen registry that describes them.
pub struct World {
    registry: Arc<ComponentRegistry>,
    stores: Vec<EntityStore>,
    routes: HashMap<ComponentSet, ComponentId>,
    entities: HashMap<Entity, ComponentSet>,
    allocator: EntityAllocator,
    chunk_size: usize,
}

impl World {
    pub(crate) fn from_parts(
        registry: ComponentRegistry,
        routes: HashMap<ComponentSet, ComponentId>,
        chunk_size: usize,
    ) -> Self {
        let stores = registry
            .iter()
            .map(|meta| EntityStore::new(meta.id, meta.size))
            .collect();
        Self {
            registry: Arc::new(registry),
            stores,
            routes,
            entities: HashMap::new(),
            allocator: EntityAllocator::new(),
            chunk_size,
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Shared id generator; clones can be sent to other threads.
    pub fn entity_allocator(&self) -> EntityAllocator {
        self.allocator.clone()
    }

    /// Allocate a fresh id. The entity holds no components until added.
    pub fn spawn(&mut self) -> Entity {
        self.allocator.allocate()
    }

    /// Records per chunk for parallel queries, set from
    /// `SimulationConfig::parallel_chunk_size` when a simulation takes the world.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    /// Number of entities currently placed in a store.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn components_of(&self, entity: Entity) -> Option<&ComponentSet> {
        self.entities.get(&entity)
    }

    pub fn store(&self, id: ComponentId) -> Option<&EntityStore> {
        self.stores.get(id.slot())
    }

    pub fn stores(&self) -> &[EntityStore] {
        &self.stores
    }

    /// Field of `handle`'s component inside `archetype` records.
    pub fn field<T: Component>(
        &self,
        archetype: ArchetypeHandle,
        handle: ComponentHandle<T>,
    ) -> Option<Field<T>> {
        self.registry.field(archetype.id(), handle)
    }

    /// Give `entity` the listed components on top of the ones it has.
    ///
    /// Archetype ids stand for all of their members. The entity ends up in
    /// the store whose component set equals the union; if it was already
    /// stored elsewhere its existing component values move with it. Fails
    /// without changing anything when no store matches the union.
    pub fn add(&mut self, entity: Entity, kinds: &[ComponentId]) -> Result<(), WorldError> {
        let requested = self.resolve(kinds)?;
        let (target, destination) = self.plan(entity, &requested)?;

        match self.placement(entity, destination) {
            Placement::Stay => return Ok(()),
            Placement::Fresh => {
                self.stores[destination.slot()].add(entity);
            }
            Placement::Move(source) => self.migrate(entity, source, destination),
        }
        self.entities.insert(entity, target);
        Ok(())
    }

    /// Batch form of [`World::add`].
    ///
    /// Each entity is routed on its own, so entities that already carry
    /// different components may land in different stores. Entities new to
    /// the world are appended with one buffer growth per destination.
    pub fn add_all(&mut self, batch: &[Entity], kinds: &[ComponentId]) -> Result<(), WorldError> {
        let requested = self.resolve(kinds)?;

        let mut seen = HashSet::with_capacity(batch.len());
        let mut plans = Vec::with_capacity(batch.len());
        for &entity in batch {
            if seen.insert(entity) {
                let (target, destination) = self.plan(entity, &requested)?;
                plans.push((entity, target, destination));
            }
        }

        let mut fresh: BTreeMap<ComponentId, Vec<Entity>> = BTreeMap::new();
        for (entity, target, destination) in plans {
            match self.placement(entity, destination) {
                Placement::Stay => continue,
                Placement::Fresh => fresh.entry(destination).or_default().push(entity),
                Placement::Move(source) => self.migrate(entity, source, destination),
            }
            self.entities.insert(entity, target);
        }

        for (destination, entities) in fresh {
            let added = self.stores[destination.slot()].add_all(&entities);
            tracing::trace!(store = %destination, added = added.len(), "batch added");
        }
        Ok(())
    }

    /// Remove entities from whichever store holds them.
    ///
    /// Returns the number of records removed. Ids are not recycled.
    pub fn remove_all(&mut self, batch: &[Entity]) -> usize {
        let removed = self
            .stores
            .iter_mut()
            .map(|store| store.remove_all(batch))
            .sum();
        for entity in batch {
            self.entities.remove(entity);
        }
        removed
    }

    /// Copy out `entity`'s value of `handle`'s component.
    pub fn get<T: Component>(&self, entity: Entity, handle: ComponentHandle<T>) -> Option<T> {
        let store = self.store_of(entity)?;
        let field = self.registry.field(store, handle)?;
        let record = self.stores[store.slot()].record(entity)?;
        Some(record.read(field))
    }

    /// Overwrite `entity`'s value of `handle`'s component.
    ///
    /// Returns `false` when the entity does not carry the component.
    pub fn set<T: Component>(&mut self, entity: Entity, handle: ComponentHandle<T>, value: T) -> bool {
        let Some(store) = self.store_of(entity) else {
            return false;
        };
        let Some(field) = self.registry.field(store, handle) else {
            return false;
        };
        match self.stores[store.slot()].record_mut(entity) {
            Some(mut record) => {
                record.write(field, value);
                true
            }
            None => false,
        }
    }

    /// Visit every entity carrying `handle`'s component.
    pub fn for_each<T: Component>(
        &mut self,
        handle: ComponentHandle<T>,
        mut f: impl FnMut(Entity, &mut T),
    ) {
        let field = handle.field();
        self.for_each_record(handle.id(), |entity, mut record| {
            record.update(field, |value| f(entity, value));
        });
    }

    /// Parallel form of [`World::for_each`].
    ///
    /// Each chunk reuses one scratch value; writes land when `f` returns.
    pub fn par_for_each<T, F>(&mut self, handle: ComponentHandle<T>, f: F)
    where
        T: Component,
        F: Fn(Entity, &mut T) + Sync + Send,
    {
        let kind = handle.id();
        for &target in self.registry.targets(kind) {
            let store = &mut self.stores[target.store.slot()];
            store.par_for_each_chunk(self.chunk_size, |mut chunk| {
                let mut scratch: T = bytemuck::Zeroable::zeroed();
                for (entity, record) in chunk.iter_mut() {
                    let mut member = record.narrow(kind, target.offset, target.size);
                    bytemuck::bytes_of_mut(&mut scratch).copy_from_slice(member.bytes());
                    f(entity, &mut scratch);
                    member.bytes_mut().copy_from_slice(bytemuck::bytes_of(&scratch));
                }
            });
        }
    }

    /// Visit the `kind` sub-record of every entity carrying it.
    ///
    /// `kind` may be a simple component or an archetype; the views handed
    /// to `f` are always labelled with `kind`.
    pub fn for_each_record(&mut self, kind: ComponentId, mut f: impl FnMut(Entity, RecordMut<'_>)) {
        for &target in self.registry.targets(kind) {
            self.stores[target.store.slot()].for_each(|entity, record| {
                f(entity, record.narrow(kind, target.offset, target.size));
            });
        }
    }

    pub fn par_for_each_record<F>(&mut self, kind: ComponentId, f: F)
    where
        F: Fn(Entity, RecordMut<'_>) + Sync + Send,
    {
        for &target in self.registry.targets(kind) {
            self.stores[target.store.slot()].par_for_each(self.chunk_size, |entity, record| {
                f(entity, record.narrow(kind, target.offset, target.size));
            });
        }
    }

    /// Copy every store for a frame.
    pub(crate) fn extract_all(&self) -> HashMap<ComponentId, Extract> {
        self.stores
            .iter()
            .map(|store| (store.descriptor(), store.extract()))
            .collect()
    }

    fn store_of(&self, entity: Entity) -> Option<ComponentId> {
        let set = self.entities.get(&entity)?;
        self.routes.get(set).copied()
    }

    fn resolve(&self, kinds: &[ComponentId]) -> Result<ComponentSet, WorldError> {
        let mut members = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let set = self
                .registry
                .component_set(kind)
                .ok_or(WorldError::UnknownComponent { component: kind })?;
            members.extend(set.iter());
        }
        Ok(ComponentSet::from_components(members))
    }

    /// Target set and destination store for adding `requested` to `entity`.
    fn plan(
        &self,
        entity: Entity,
        requested: &ComponentSet,
    ) -> Result<(ComponentSet, ComponentId), WorldError> {
        let target = match self.entities.get(&entity) {
            Some(current) => current.union(requested),
            None => requested.clone(),
        };
        match self.routes.get(&target) {
            Some(&destination) => Ok((target, destination)),
            None => Err(WorldError::UnsupportedComponentSet {
                components: self.registry.names(&target),
            }),
        }
    }

    fn placement(&self, entity: Entity, destination: ComponentId) -> Placement {
        match self.store_of(entity) {
            None => Placement::Fresh,
            Some(source) if source == destination => Placement::Stay,
            Some(source) => Placement::Move(source),
        }
    }

    /// Move `entity` between stores, carrying over the components both share.
    fn migrate(&mut self, entity: Entity, source: ComponentId, destination: ComponentId) {
        let Some(old) = self.stores[source.slot()].take_record(entity) else {
            return;
        };
        self.stores[destination.slot()].add(entity);

        let (Some(from), Some(to)) = (self.registry.get(source), self.registry.get(destination))
        else {
            return;
        };
        if let Some(mut record) = self.stores[destination.slot()].record_mut(entity) {
            let bytes = record.bytes_mut();
            for slot in from.slots() {
                if let Some(target) = to.slot_of(slot.component) {
                    bytes[target.offset..target.offset + target.size]
                        .copy_from_slice(&old[slot.offset..slot.offset + slot.size]);
                }
            }
        }
        tracing::trace!(%entity, from = %source, to = %destination, "entity migrated");
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("components", &self.registry.len())
            .field("entities", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::WorldBuilder;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }
    crate::define_component!(Position, "position");

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    crate::define_component!(Velocity, "velocity");

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Tag(u32);
    crate::define_component!(Tag, "tag");

    struct Fixture {
        world: World,
        position: ComponentHandle<Position>,
        velocity: ComponentHandle<Velocity>,
        tag: ComponentHandle<Tag>,
        moving: ArchetypeHandle,
    }

    fn fixture() -> Fixture {
        let mut builder = WorldBuilder::new();
        let position = builder.register::<Position>().unwrap();
        let velocity = builder.register::<Velocity>().unwrap();
        let tag = builder.register::<Tag>().unwrap();
        let moving = builder
            .archetype("moving", &[position.id(), velocity.id()])
            .unwrap();
        let mut world = builder.build();
        world.set_chunk_size(4);
        Fixture {
            world,
            position,
            velocity,
            tag,
            moving,
        }
    }

    fn store_len(world: &World, id: impl Into<ComponentId>) -> usize {
        world.store(id.into()).map(EntityStore::len).unwrap_or(0)
    }

    #[test]
    fn adding_components_separately_lands_in_archetype() {
        let Fixture {
            mut world,
            position,
            velocity,
            moving,
            ..
        } = fixture();
        let e = world.spawn();

        world.add(e, &[position.id()]).unwrap();
        assert_eq!(store_len(&world, position), 1);

        world.add(e, &[velocity.id()]).unwrap();
        assert_eq!(store_len(&world, position), 0);
        assert_eq!(store_len(&world, velocity), 0);
        assert_eq!(store_len(&world, moving), 1);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn migration_keeps_existing_values() {
        let Fixture {
            mut world,
            position,
            velocity,
            ..
        } = fixture();
        let e = world.spawn();
        world.add(e, &[position.id()]).unwrap();
        assert!(world.set(e, position, Position { x: 3.0, y: 4.0 }));

        world.add(e, &[velocity.id()]).unwrap();
        assert_eq!(world.get(e, position), Some(Position { x: 3.0, y: 4.0 }));
        assert_eq!(world.get(e, velocity), Some(Velocity { dx: 0.0, dy: 0.0 }));
    }

    #[test]
    fn unsupported_set_fails_without_side_effects() {
        let Fixture {
            mut world,
            position,
            tag,
            ..
        } = fixture();
        let e = world.spawn();
        world.add(e, &[position.id()]).unwrap();

        let err = world.add(e, &[tag.id()]).unwrap_err();
        match err {
            WorldError::UnsupportedComponentSet { components } => {
                assert_eq!(components, vec!["position".to_string(), "tag".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store_len(&world, position), 1);
        assert_eq!(store_len(&world, tag), 0);
    }

    #[test]
    fn add_is_idempotent_for_present_components() {
        let Fixture {
            mut world,
            position,
            ..
        } = fixture();
        let e = world.spawn();
        world.add(e, &[position.id()]).unwrap();
        world.set(e, position, Position { x: 1.0, y: 2.0 });
        world.add(e, &[position.id()]).unwrap();

        assert_eq!(store_len(&world, position), 1);
        assert_eq!(world.get(e, position), Some(Position { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn add_all_routes_each_entity() {
        let Fixture {
            mut world,
            position,
            velocity,
            moving,
            ..
        } = fixture();
        let stationary = world.spawn();
        world.add(stationary, &[position.id()]).unwrap();

        // One entity already has a position, the others are new.
        let mut batch = world.entity_allocator().allocate_many(5);
        batch.push(stationary);
        world.add_all(&batch, &[velocity.id()]).unwrap();

        assert_eq!(store_len(&world, velocity), 5);
        assert_eq!(store_len(&world, moving), 1);
        assert_eq!(store_len(&world, position), 0);
    }

    #[test]
    fn archetype_ids_expand_to_members() {
        let Fixture {
            mut world,
            moving,
            ..
        } = fixture();
        let batch = world.entity_allocator().allocate_many(3);
        world.add_all(&batch, &[moving.id()]).unwrap();
        assert_eq!(store_len(&world, moving), 3);
        assert_eq!(world.components_of(batch[0]).map(ComponentSet::len), Some(2));
    }

    #[test]
    fn queries_visit_exact_and_archetype_stores() {
        let Fixture {
            mut world,
            position,
            moving,
            ..
        } = fixture();
        let alone = world.spawn();
        world.add(alone, &[position.id()]).unwrap();
        let packed = world.entity_allocator().allocate_many(3);
        world.add_all(&packed, &[moving.id()]).unwrap();

        let mut visited = Vec::new();
        world.for_each(position, |entity, p| {
            p.x = entity.id() as f32;
            visited.push(entity);
        });
        visited.sort();
        assert_eq!(visited.len(), 4);

        for entity in packed.iter().copied().chain([alone]) {
            assert_eq!(world.get(entity, position).map(|p| p.x), Some(entity.id() as f32));
        }

        // Only the position half of archetype records was written.
        let field = world.field(moving, position).unwrap();
        assert_eq!(field.offset(), 0);
        let store = world.store(moving.id()).unwrap();
        assert!(store.bytes().chunks(16).all(|r| r[8..].iter().all(|&b| b == 0)));
    }

    #[test]
    fn parallel_query_matches_sequential() {
        let Fixture {
            mut world,
            position,
            velocity,
            moving,
            ..
        } = fixture();
        let simple = world.entity_allocator().allocate_many(10);
        world.add_all(&simple, &[position.id()]).unwrap();
        let packed = world.entity_allocator().allocate_many(13);
        world.add_all(&packed, &[moving.id()]).unwrap();

        world.for_each(velocity, |entity, v| v.dx = entity.id() as f32);
        world.par_for_each(position, |entity, p| {
            p.x += 1.0;
            p.y = entity.id() as f32 * 2.0;
        });

        for entity in simple.iter().chain(&packed).copied() {
            let p = world.get(entity, position).unwrap();
            assert_eq!(p, Position { x: 1.0, y: entity.id() as f32 * 2.0 });
        }
        for entity in packed {
            assert_eq!(world.get(entity, velocity).map(|v| v.dx), Some(entity.id() as f32));
        }
    }

    #[test]
    fn remove_all_forgets_entities() {
        let Fixture {
            mut world,
            position,
            moving,
            ..
        } = fixture();
        let a = world.spawn();
        let b = world.spawn();
        world.add(a, &[position.id()]).unwrap();
        world.add(b, &[moving.id()]).unwrap();

        let never_added = world.spawn();

        assert_eq!(world.remove_all(&[a, b, never_added]), 2);
        assert_eq!(world.entity_count(), 0);
        assert!(world.components_of(a).is_none());

        // A removed entity can be re-added from scratch.
        world.add(a, &[moving.id()]).unwrap();
        assert_eq!(store_len(&world, moving), 1);
    }
}
