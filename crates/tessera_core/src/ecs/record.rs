// record.rs - Borrowed views of single records
//
// Views are only handed out by store iteration, so the byte slice always
// spans exactly one record (or one member of an archetype record). Typed
// access copies `size_of::<T>()` bytes in or out; no alignment is assumed.

use crate::ecs::{Component, ComponentId, Entity, Field};
use std::mem::size_of;

/// Read-only view of one record.
#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
    owner: ComponentId,
    bytes: &'a [u8],
}

impl<'a> Record<'a> {
    pub(crate) fn new(owner: ComponentId, bytes: &'a [u8]) -> Self {
        Self { owner, bytes }
    }

    /// Descriptor whose layout these bytes follow.
    #[inline]
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Copy the value of `field` out of the record.
    #[inline]
    pub fn read<T: Component>(&self, field: Field<T>) -> T {
        debug_assert_eq!(field.owner(), self.owner, "field used on a foreign record");
        let start = field.offset();
        bytemuck::pod_read_unaligned(&self.bytes[start..start + size_of::<T>()])
    }

    /// View of the member at `offset`, re-labelled as `owner`.
    pub(crate) fn narrow(self, owner: ComponentId, offset: usize, size: usize) -> Record<'a> {
        Record {
            owner,
            bytes: &self.bytes[offset..offset + size],
        }
    }
}

/// Mutable view of one record.
#[derive(Debug)]
pub struct RecordMut<'a> {
    owner: ComponentId,
    bytes: &'a mut [u8],
}

impl<'a> RecordMut<'a> {
    pub(crate) fn new(owner: ComponentId, bytes: &'a mut [u8]) -> Self {
        Self { owner, bytes }
    }

    #[inline]
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    #[inline]
    pub fn as_record(&self) -> Record<'_> {
        Record::new(self.owner, &*self.bytes)
    }

    #[inline]
    pub fn read<T: Component>(&self, field: Field<T>) -> T {
        self.as_record().read(field)
    }

    /// Overwrite the bytes of `field` with `value`.
    #[inline]
    pub fn write<T: Component>(&mut self, field: Field<T>, value: T) {
        debug_assert_eq!(field.owner(), self.owner, "field used on a foreign record");
        let start = field.offset();
        self.bytes[start..start + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Read, modify and write back `field` in one step.
    #[inline]
    pub fn update<T: Component, R>(&mut self, field: Field<T>, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.read(field);
        let out = f(&mut value);
        self.write(field, value);
        out
    }

    pub(crate) fn narrow(self, owner: ComponentId, offset: usize, size: usize) -> RecordMut<'a> {
        let RecordMut { bytes, .. } = self;
        RecordMut {
            owner,
            bytes: &mut bytes[offset..offset + size],
        }
    }
}

/// A contiguous run of records handed to one parallel worker.
#[derive(Debug)]
pub struct ChunkMut<'a> {
    owner: ComponentId,
    record_size: usize,
    entities: &'a [Entity],
    bytes: &'a mut [u8],
}

impl<'a> ChunkMut<'a> {
    pub(crate) fn new(
        owner: ComponentId,
        record_size: usize,
        entities: &'a [Entity],
        bytes: &'a mut [u8],
    ) -> Self {
        debug_assert_eq!(entities.len() * record_size, bytes.len());
        Self {
            owner,
            record_size,
            entities,
            bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        self.entities
    }

    /// Iterate the chunk's records in storage order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, RecordMut<'_>)> + '_ {
        let owner = self.owner;
        self.entities
            .iter()
            .copied()
            .zip(self.bytes.chunks_exact_mut(self.record_size))
            .map(move |(entity, bytes)| (entity, RecordMut::new(owner, bytes)))
    }
}
