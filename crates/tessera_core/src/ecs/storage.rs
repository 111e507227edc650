// storage.rs - Dense byte storage for one descriptor
//
// Each registered descriptor owns one store: a list of entity ids and a
// byte buffer holding one fixed-size record per entity, in the same order.
// Removal swaps the last record into the hole, so storage stays dense and
// the entity -> row index has to be patched for the displaced entity.

use crate::ecs::{ChunkMut, ComponentId, Entity, Record, RecordMut};
use crate::frame::Extract;
use rayon::prelude::*;
use std::collections::HashMap;

/// Dense store of `record_size`-byte records keyed by entity.
#[derive(Debug)]
pub struct EntityStore {
    descriptor: ComponentId,
    record_size: usize,
    entities: Vec<Entity>,
    rows: HashMap<Entity, usize>,
    bytes: Vec<u8>,
}

impl EntityStore {
    pub fn new(descriptor: ComponentId, record_size: usize) -> Self {
        debug_assert!(record_size > 0, "records must not be zero-sized");
        Self {
            descriptor,
            record_size,
            entities: Vec::new(),
            rows: HashMap::new(),
            bytes: Vec::new(),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> ComponentId {
        self.descriptor
    }

    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Entity ids in storage order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The raw record buffer, `len() * record_size()` bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append `entity` with a zeroed record.
    ///
    /// Returns `false` and leaves the store untouched if it is already here.
    pub fn add(&mut self, entity: Entity) -> bool {
        if self.rows.contains_key(&entity) {
            return false;
        }
        self.rows.insert(entity, self.entities.len());
        self.entities.push(entity);
        self.bytes.resize(self.bytes.len() + self.record_size, 0);
        true
    }

    /// Append every entity not already present, growing the buffer once.
    ///
    /// Duplicates inside `batch` count once. Returns the entities that were
    /// actually added, in batch order.
    pub fn add_all(&mut self, batch: &[Entity]) -> Vec<Entity> {
        let mut added = Vec::with_capacity(batch.len());
        for &entity in batch {
            if self.rows.contains_key(&entity) {
                continue;
            }
            self.rows.insert(entity, self.entities.len());
            self.entities.push(entity);
            added.push(entity);
        }
        self.bytes.resize(self.entities.len() * self.record_size, 0);
        added
    }

    /// Remove every listed entity that is present.
    ///
    /// O(1) per entity; the order of the remaining records is not kept.
    pub fn remove_all(&mut self, batch: &[Entity]) -> usize {
        let mut removed = 0;
        for &entity in batch {
            if let Some(row) = self.rows.remove(&entity) {
                self.swap_remove_row(row);
                removed += 1;
            }
        }
        removed
    }

    /// Remove `entity` and hand back a copy of its record.
    pub fn take_record(&mut self, entity: Entity) -> Option<Vec<u8>> {
        let row = self.rows.remove(&entity)?;
        let start = row * self.record_size;
        let record = self.bytes[start..start + self.record_size].to_vec();
        self.swap_remove_row(row);
        Some(record)
    }

    fn swap_remove_row(&mut self, row: usize) {
        let last = self.entities.len() - 1;
        let size = self.record_size;
        if row != last {
            let moved = self.entities[last];
            self.entities[row] = moved;
            self.bytes.copy_within(last * size..(last + 1) * size, row * size);
            self.rows.insert(moved, row);
        }
        self.entities.truncate(last);
        self.bytes.truncate(last * size);
    }

    pub fn record(&self, entity: Entity) -> Option<Record<'_>> {
        let row = *self.rows.get(&entity)?;
        let start = row * self.record_size;
        Some(Record::new(
            self.descriptor,
            &self.bytes[start..start + self.record_size],
        ))
    }

    pub fn record_mut(&mut self, entity: Entity) -> Option<RecordMut<'_>> {
        let row = *self.rows.get(&entity)?;
        let start = row * self.record_size;
        Some(RecordMut::new(
            self.descriptor,
            &mut self.bytes[start..start + self.record_size],
        ))
    }

    /// Visit every record in storage order.
    pub fn for_each(&mut self, mut f: impl FnMut(Entity, RecordMut<'_>)) {
        let descriptor = self.descriptor;
        for (&entity, bytes) in self
            .entities
            .iter()
            .zip(self.bytes.chunks_exact_mut(self.record_size))
        {
            f(entity, RecordMut::new(descriptor, bytes));
        }
    }

    pub fn for_each_ref(&self, mut f: impl FnMut(Entity, Record<'_>)) {
        for (&entity, bytes) in self
            .entities
            .iter()
            .zip(self.bytes.chunks_exact(self.record_size))
        {
            f(entity, Record::new(self.descriptor, bytes));
        }
    }

    /// Split the store into `chunk_size`-record chunks and process them on
    /// the rayon pool. Returns once every chunk is done.
    pub fn par_for_each_chunk<F>(&mut self, chunk_size: usize, f: F)
    where
        F: Fn(ChunkMut<'_>) + Sync + Send,
    {
        let chunk_size = chunk_size.max(1);
        let descriptor = self.descriptor;
        let record_size = self.record_size;
        self.bytes
            .par_chunks_mut(chunk_size * record_size)
            .zip(self.entities.par_chunks(chunk_size))
            .for_each(|(bytes, entities)| {
                f(ChunkMut::new(descriptor, record_size, entities, bytes));
            });
    }

    /// Parallel form of [`EntityStore::for_each`]; visit order is unspecified.
    pub fn par_for_each<F>(&mut self, chunk_size: usize, f: F)
    where
        F: Fn(Entity, RecordMut<'_>) + Sync + Send,
    {
        self.par_for_each_chunk(chunk_size, |mut chunk| {
            for (entity, record) in chunk.iter_mut() {
                f(entity, record);
            }
        });
    }

    /// Copy ids and bytes into memory owned by a frame.
    pub fn extract(&self) -> Extract {
        Extract::new(
            self.descriptor,
            self.record_size,
            self.entities.clone(),
            self.bytes.clone(),
        )
    }
}
