//! Frames handed from the simulation thread to the render consumer
//!
//! A frame owns copies of every store taken at the end of a tick, so the
//! consumer reads it without touching live storage. Each frame carries a
//! completion signal shared with the producer; the consumer flips it to
//! `Rendered` exactly once, which is what lets the producer retire it.

use crate::ecs::{Component, ComponentHandle, ComponentId, ComponentRegistry, Entity, Record};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a frame. Only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameState {
    Created,
    Populated,
    Published,
    Rendered,
    Closed,
}

#[derive(Debug)]
struct FrameSignal {
    state: Mutex<FrameState>,
    changed: Condvar,
}

impl FrameSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(FrameState::Created),
            changed: Condvar::new(),
        }
    }

    fn state(&self) -> FrameState {
        *self.state.lock()
    }

    /// Move `from -> to` if the frame is currently in `from`.
    fn advance(&self, from: FrameState, to: FrameState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        self.changed.notify_all();
        true
    }

    /// Block until the frame has been rendered or `timeout` elapses.
    fn wait_rendered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state < FrameState::Rendered {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state >= FrameState::Rendered;
            }
        }
        true
    }
}

/// Copy of one store: entity ids plus their records, bit for bit.
#[derive(Clone, Debug)]
pub struct Extract {
    descriptor: ComponentId,
    record_size: usize,
    entities: Vec<Entity>,
    bytes: Vec<u8>,
}

impl Extract {
    pub(crate) fn new(
        descriptor: ComponentId,
        record_size: usize,
        entities: Vec<Entity>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            descriptor,
            record_size,
            entities,
            bytes,
        }
    }

    pub fn descriptor(&self) -> ComponentId {
        self.descriptor
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Raw records, laid out as described by the registry.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn records(&self) -> impl Iterator<Item = (Entity, Record<'_>)> + '_ {
        self.entities
            .iter()
            .copied()
            .zip(self.bytes.chunks_exact(self.record_size))
            .map(|(entity, bytes)| (entity, Record::new(self.descriptor, bytes)))
    }
}

/// Snapshot of the world after one tick.
#[derive(Debug)]
pub struct Frame {
    tick: u64,
    delta_seconds: f32,
    registry: Arc<ComponentRegistry>,
    extracts: HashMap<ComponentId, Extract>,
    signal: Arc<FrameSignal>,
}

impl Frame {
    /// Assemble a populated frame and the producer's handle on it.
    pub(crate) fn populate(
        tick: u64,
        delta_seconds: f32,
        registry: Arc<ComponentRegistry>,
        extracts: HashMap<ComponentId, Extract>,
    ) -> (Frame, FrameCompletion) {
        let signal = Arc::new(FrameSignal::new());
        signal.advance(FrameState::Created, FrameState::Populated);
        let completion = FrameCompletion {
            tick,
            signal: Arc::clone(&signal),
        };
        let frame = Frame {
            tick,
            delta_seconds,
            registry,
            extracts,
            signal,
        };
        (frame, completion)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta_seconds
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn extract(&self, id: impl Into<ComponentId>) -> Option<&Extract> {
        self.extracts.get(&id.into())
    }

    pub fn extracts(&self) -> impl Iterator<Item = &Extract> {
        self.extracts.values()
    }

    /// Total entities across all extracts.
    pub fn entity_count(&self) -> usize {
        self.extracts.values().map(Extract::len).sum()
    }

    /// Read `handle`'s component for every entity carrying it, whether it
    /// sits in its own store or inside an archetype.
    pub fn for_each<T: Component>(&self, handle: ComponentHandle<T>, mut f: impl FnMut(Entity, T)) {
        let field = handle.field();
        self.for_each_record(handle.id(), |entity, record| f(entity, record.read(field)));
    }

    pub fn for_each_record(&self, kind: ComponentId, mut f: impl FnMut(Entity, Record<'_>)) {
        for target in self.registry.targets(kind) {
            let Some(extract) = self.extracts.get(&target.store) else {
                continue;
            };
            for (entity, record) in extract.records() {
                f(entity, record.narrow(kind, target.offset, target.size));
            }
        }
    }

    pub fn state(&self) -> FrameState {
        self.signal.state()
    }

    pub fn is_rendered(&self) -> bool {
        self.state() >= FrameState::Rendered
    }

    /// Signal that the consumer is done with this frame.
    ///
    /// Only the first call on a published frame succeeds; later calls
    /// return `false` and change nothing.
    pub fn mark_rendered(&self) -> bool {
        self.signal
            .advance(FrameState::Published, FrameState::Rendered)
    }
}

/// Producer-side handle used to publish, await and retire a frame.
#[derive(Debug)]
pub(crate) struct FrameCompletion {
    tick: u64,
    signal: Arc<FrameSignal>,
}

impl FrameCompletion {
    pub(crate) fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn state(&self) -> FrameState {
        self.signal.state()
    }

    pub(crate) fn publish(&self) -> bool {
        self.signal
            .advance(FrameState::Populated, FrameState::Published)
    }

    pub(crate) fn is_rendered(&self) -> bool {
        self.state() == FrameState::Rendered
    }

    pub(crate) fn wait_rendered(&self, timeout: Duration) -> bool {
        self.signal.wait_rendered(timeout)
    }

    /// Retire a rendered frame. Fails if it has not been rendered yet.
    pub(crate) fn close(&self) -> bool {
        self.signal
            .advance(FrameState::Rendered, FrameState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::WorldBuilder;
    use bytemuck::{Pod, Zeroable};
    use std::thread;

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

    fn empty_frame(tick: u64) -> (Frame, FrameCompletion) {
        Frame::populate(tick, 0.016, Arc::new(ComponentRegistry::new()), HashMap::new())
    }

    #[test]
    fn rendered_is_reached_exactly_once() {
        let (frame, completion) = empty_frame(1);
        assert_eq!(frame.state(), FrameState::Populated);

        // Not published yet: the consumer cannot complete it.
        assert!(!frame.mark_rendered());
        assert!(!completion.close());

        assert!(completion.publish());
        assert!(frame.mark_rendered());
        assert!(!frame.mark_rendered());
        assert!(frame.is_rendered());

        assert!(completion.close());
        assert_eq!(frame.state(), FrameState::Closed);
        assert!(!frame.mark_rendered());
    }

    #[test]
    fn producer_wakes_when_consumer_renders() {
        let (frame, completion) = empty_frame(7);
        completion.publish();

        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            frame.mark_rendered()
        });

        assert!(completion.wait_rendered(Duration::from_secs(5)));
        assert!(consumer.join().unwrap());
        assert_eq!(completion.tick(), 7);
    }

    #[test]
    fn wait_times_out_without_consumer() {
        let (_frame, completion) = empty_frame(3);
        completion.publish();
        assert!(!completion.wait_rendered(Duration::from_millis(10)));
        assert_eq!(completion.state(), FrameState::Published);
    }

    #[test]
    fn frame_queries_read_archetype_members() {
        let mut builder = WorldBuilder::new();
        let position = builder.register::<Position>().unwrap();
        let velocity = builder.register::<Velocity>().unwrap();
        let moving = builder
            .archetype("moving", &[position.id(), velocity.id()])
            .unwrap();
        let mut world = builder.build();

        let still = world.spawn();
        world.add(still, &[position.id()]).unwrap();
        world.set(still, position, Position { x: 1.0, y: 1.0 });
        let runner = world.spawn();
        world.add(runner, &[moving.id()]).unwrap();
        world.set(runner, position, Position { x: 2.0, y: 2.0 });
        world.set(runner, velocity, Velocity { dx: 5.0, dy: 5.0 });

        let (frame, _completion) =
            Frame::populate(1, 0.016, Arc::clone(world.registry()), world.extract_all());

        // Live edits after extraction do not reach the frame.
        world.set(runner, position, Position { x: 99.0, y: 99.0 });

        let mut seen = Vec::new();
        frame.for_each(position, |entity, p| seen.push((entity, p.x)));
        seen.sort_by_key(|(entity, _)| *entity);
        assert_eq!(seen, vec![(still, 1.0), (runner, 2.0)]);

        let extract = frame.extract(moving).unwrap();
        assert_eq!(extract.len(), 1);
        assert_eq!(extract.record_size(), 16);
        assert_eq!(frame.entity_count(), 2);
    }
}
