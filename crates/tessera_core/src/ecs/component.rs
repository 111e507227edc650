// component.rs - Component descriptors and typed handles
//
// Components are identified by ids handed out at registration, not Rust
// TypeIds. A descriptor is either a simple fixed-size record or a composite
// (archetype) that concatenates several simple records.

use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;

/// Stable identifier assigned at registration, in registration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the raw index backing this id.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Trait for Rust-defined POD components.
///
/// The byte layout of the type is the layout of its record: `Pod`
/// guarantees there is no padding and that any bit pattern is valid, so
/// records can be copied in and out of raw storage without `unsafe`.
pub trait Component: Pod + Send + Sync + 'static {
    /// Human-readable name for debugging and error messages.
    const NAME: &'static str;
}

/// Helper macro to implement the Component trait.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, "position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
        }
    };
}

/// One simple component packed inside a composite record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeMember {
    pub component: ComponentId,
    pub offset: usize,
    pub size: usize,
}

/// Shape of a descriptor's record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    Simple,
    /// Members in declaration order; offsets are the running sum of sizes.
    Composite(Vec<ArchetypeMember>),
}

/// Metadata describing a descriptor's memory layout.
///
/// Equality is by identity: two descriptors with identical layouts are
/// still different kinds.
#[derive(Clone, Debug)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: String,
    pub size: usize,
    pub kind: ComponentKind,
}

impl ComponentMeta {
    #[inline]
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ComponentKind::Composite(_))
    }

    /// Member list of a composite; empty for simple descriptors.
    pub fn members(&self) -> &[ArchetypeMember] {
        match &self.kind {
            ComponentKind::Simple => &[],
            ComponentKind::Composite(members) => members,
        }
    }

    /// Where `component` sits inside this descriptor's record, if anywhere.
    pub fn slot_of(&self, component: ComponentId) -> Option<ArchetypeMember> {
        if component == self.id && !self.is_composite() {
            return Some(ArchetypeMember {
                component,
                offset: 0,
                size: self.size,
            });
        }
        self.members()
            .iter()
            .find(|member| member.component == component)
            .copied()
    }

    /// Every simple component carried by a record of this descriptor.
    pub(crate) fn slots(&self) -> Vec<ArchetypeMember> {
        match &self.kind {
            ComponentKind::Simple => vec![ArchetypeMember {
                component: self.id,
                offset: 0,
                size: self.size,
            }],
            ComponentKind::Composite(members) => members.clone(),
        }
    }
}

impl PartialEq for ComponentMeta {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentMeta {}

/// Typed handle returned by registering a Rust component.
pub struct ComponentHandle<T> {
    id: ComponentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentHandle<T> {
    pub(crate) fn new(id: ComponentId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn id(self) -> ComponentId {
        self.id
    }

    /// Field covering a whole record of this component.
    #[inline]
    pub fn field(self) -> Field<T> {
        Field::new(self.id, 0)
    }
}

impl<T> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentHandle<T> {}

impl<T> PartialEq for ComponentHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ComponentHandle<T> {}

impl<T> fmt::Debug for ComponentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> From<ComponentHandle<T>> for ComponentId {
    fn from(handle: ComponentHandle<T>) -> Self {
        handle.id
    }
}

/// Location of a `T` inside the records of one descriptor.
///
/// Fields can only be created from a [`ComponentHandle`] or by asking the
/// registry for an archetype member, so the offset always lies within the
/// owning record.
pub struct Field<T> {
    owner: ComponentId,
    offset: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Field<T> {
    pub(crate) fn new(owner: ComponentId, offset: usize) -> Self {
        Self {
            owner,
            offset,
            _marker: PhantomData,
        }
    }

    /// Descriptor whose records this field indexes into.
    #[inline]
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("owner", &self.owner)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Handle returned by registering an archetype.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeHandle {
    id: ComponentId,
}

impl ArchetypeHandle {
    pub(crate) fn new(id: ComponentId) -> Self {
        Self { id }
    }

    #[inline]
    pub fn id(self) -> ComponentId {
        self.id
    }
}

impl From<ArchetypeHandle> for ComponentId {
    fn from(handle: ArchetypeHandle) -> Self {
        handle.id
    }
}
