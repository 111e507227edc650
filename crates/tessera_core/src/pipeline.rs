//! Simulation loop and the channels around it
//!
//! The simulation thread is the only mutator of the world. Other threads
//! talk to it through a bounded command inbox and receive finished frames
//! through a bounded frame channel. At most `max_frames_in_flight` frames
//! may be published and not yet rendered; past that the loop blocks on the
//! oldest frame's completion signal.

use crate::config::SimulationConfig;
use crate::ecs::{System, SystemHandle, SystemRegistry, World};
use crate::error::{CommandError, ConfigError, FrameRecvError, PipelineError, RegistrationError};
use crate::frame::{Frame, FrameCompletion};
use crate::time::{SimulationClock, TickPacer};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tessera_metrics::{SystemTimings, TickTimer};

/// Work queued for the simulation thread, run before the next tick's systems.
pub type Command = Box<dyn FnOnce(&mut World) + Send + 'static>;

/// Longest single condvar wait while blocked on a frame, so a stop request
/// is noticed promptly.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Ticks between periodic timing summaries in the log.
const SUMMARY_INTERVAL: u64 = 600;

/// Producer end of the command inbox. Cheap to clone.
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Queue a command, blocking while the inbox is full.
    pub fn send<F>(&self, command: F) -> Result<(), CommandError>
    where
        F: FnOnce(&mut World) + Send + 'static,
    {
        self.sender
            .send(Box::new(command))
            .map_err(|_| CommandError::Disconnected)
    }

    /// Queue a command without blocking. On failure the command is handed back.
    pub fn try_send(&self, command: Command) -> Result<(), RejectedCommand> {
        self.sender.try_send(command).map_err(|err| match err {
            TrySendError::Full(command) => RejectedCommand {
                reason: CommandError::Full,
                command,
            },
            TrySendError::Disconnected(command) => RejectedCommand {
                reason: CommandError::Disconnected,
                command,
            },
        })
    }

    /// Commands waiting to run.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

impl fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSender")
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// A command that could not be queued, and why.
pub struct RejectedCommand {
    pub reason: CommandError,
    pub command: Command,
}

impl fmt::Debug for RejectedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedCommand")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Consumer end of the frame channel.
#[derive(Debug)]
pub struct FrameReceiver {
    receiver: Receiver<Frame>,
}

impl FrameReceiver {
    /// Block for the next frame. `None` once the simulation has ended.
    pub fn recv(&self) -> Option<Frame> {
        self.receiver.recv().ok()
    }

    /// Like [`FrameReceiver::recv`] but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, FrameRecvError> {
        self.receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FrameRecvError::Timeout,
            RecvTimeoutError::Disconnected => FrameRecvError::Disconnected,
        })
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Frames published and not yet received.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Shared flag asking the simulation loop to stop.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of a single [`Simulation::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame for this tick was published.
    Published(u64),
    Stopped,
    /// The frame receiver was dropped; nothing will render again.
    ConsumerDisconnected,
}

/// Totals gathered over a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub ticks: u64,
    pub frames_published: u64,
    pub frames_retired: u64,
    pub peak_in_flight: usize,
    pub mean_tick_ms: f64,
}

/// The simulation loop: owns the world, its systems, and the producer
/// side of both channels.
pub struct Simulation {
    world: World,
    config: SimulationConfig,
    systems: SystemRegistry,
    inbox: Receiver<Command>,
    commands: CommandSender,
    frames: Sender<Frame>,
    in_flight: VecDeque<FrameCompletion>,
    clock: SimulationClock,
    pacer: TickPacer,
    timer: TickTimer,
    timings: SystemTimings,
    report: SimulationReport,
    busy: Duration,
}

impl Simulation {
    /// Create the loop together with the inbox sender and frame receiver.
    pub fn new(
        mut world: World,
        config: SimulationConfig,
    ) -> Result<(Self, CommandSender, FrameReceiver), ConfigError> {
        config.validate()?;
        world.set_chunk_size(config.parallel_chunk_size);

        let (command_tx, command_rx) = bounded(config.inbox_capacity);
        let (frame_tx, frame_rx) = bounded(config.max_frames_in_flight);
        let commands = CommandSender { sender: command_tx };

        let simulation = Self {
            world,
            clock: SimulationClock::new(config.min_delta()),
            pacer: TickPacer::new(config.tick_rate_hz),
            systems: SystemRegistry::new(),
            inbox: command_rx,
            commands: commands.clone(),
            frames: frame_tx,
            in_flight: VecDeque::with_capacity(config.max_frames_in_flight),
            timer: TickTimer::new(120),
            timings: SystemTimings::new(120),
            report: SimulationReport::default(),
            busy: Duration::ZERO,
            config,
        };
        Ok((simulation, commands, FrameReceiver { receiver: frame_rx }))
    }

    /// Register a system; systems run in registration order.
    pub fn add_system(
        &mut self,
        system: impl System + 'static,
    ) -> Result<SystemHandle, RegistrationError> {
        let name = system.name().to_string();
        let handle = self.systems.register(Box::new(system))?;
        tracing::debug!(%handle, system = %name, "system registered");
        Ok(handle)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Frames published and not yet retired.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn report(&self) -> &SimulationReport {
        &self.report
    }

    /// Run one tick: commands, systems, extraction, backpressure, publish.
    pub fn tick(&mut self, stop: &StopSignal) -> Result<TickOutcome, PipelineError> {
        if stop.is_stopped() {
            return Ok(TickOutcome::Stopped);
        }
        let started = Instant::now();
        self.timer.begin();

        let mut commands = 0usize;
        while let Ok(command) = self.inbox.try_recv() {
            command(&mut self.world);
            commands += 1;
        }
        if commands > 0 {
            tracing::trace!(commands, "drained command inbox");
        }

        let delta = self.clock.advance();
        let tick = self.clock.tick_count();
        self.systems
            .run_all(&mut self.world, delta, &mut self.timings);

        let (frame, completion) = Frame::populate(
            tick,
            delta,
            Arc::clone(self.world.registry()),
            self.world.extract_all(),
        );

        self.retire_rendered();
        while self.in_flight.len() >= self.config.max_frames_in_flight {
            if !self.await_oldest(stop)? {
                return Ok(TickOutcome::Stopped);
            }
        }

        completion.publish();
        if self.frames.send(frame).is_err() {
            tracing::warn!(tick, "frame receiver dropped, stopping simulation");
            return Ok(TickOutcome::ConsumerDisconnected);
        }
        self.in_flight.push_back(completion);
        self.report.peak_in_flight = self.report.peak_in_flight.max(self.in_flight.len());

        self.report.ticks += 1;
        self.report.frames_published += 1;
        self.busy += started.elapsed();
        self.timer.end();
        tracing::debug!(
            tick,
            delta,
            commands,
            entities = self.world.entity_count(),
            in_flight = self.in_flight.len(),
            "tick published"
        );
        if tick % SUMMARY_INTERVAL == 0 {
            self.log_summary();
        }

        self.pacer.wait();
        Ok(TickOutcome::Published(tick))
    }

    /// Tick until stopped or the consumer goes away.
    pub fn run(mut self, stop: StopSignal) -> Result<SimulationReport, PipelineError> {
        tracing::info!(
            systems = self.systems.len(),
            max_frames_in_flight = self.config.max_frames_in_flight,
            tick_rate_hz = ?self.config.tick_rate_hz,
            "simulation started"
        );

        let outcome = loop {
            match self.tick(&stop) {
                Ok(TickOutcome::Published(_)) => continue,
                Ok(outcome) => break Ok(outcome),
                Err(err) => break Err(err),
            }
        };
        self.retire_rendered();
        let report = self.finish();

        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    ?outcome,
                    ticks = report.ticks,
                    mean_tick_ms = report.mean_tick_ms,
                    "simulation stopped"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(error = %err, ticks = report.ticks, "simulation aborted");
                Err(err)
            }
        }
    }

    /// Run the loop on a dedicated thread named `simulation`.
    pub fn spawn(self) -> Result<SimulationHandle, PipelineError> {
        let stop = StopSignal::new();
        let commands = self.commands.clone();
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("simulation".into())
            .spawn(move || self.run(thread_stop))
            .map_err(PipelineError::ThreadSpawn)?;
        Ok(SimulationHandle {
            commands,
            stop,
            thread,
        })
    }

    /// Close and drop every rendered frame at the front of the queue.
    fn retire_rendered(&mut self) {
        while self
            .in_flight
            .front()
            .is_some_and(FrameCompletion::is_rendered)
        {
            self.retire_front();
        }
    }

    fn retire_front(&mut self) {
        if let Some(completion) = self.in_flight.pop_front() {
            completion.close();
            self.report.frames_retired += 1;
            tracing::trace!(tick = completion.tick(), "frame retired");
        }
    }

    /// Block until the oldest in-flight frame is rendered, then retire it.
    ///
    /// Returns `Ok(false)` if a stop was requested while waiting.
    fn await_oldest(&mut self, stop: &StopSignal) -> Result<bool, PipelineError> {
        let Some(oldest) = self.in_flight.front() else {
            return Ok(true);
        };
        let timeout = self.config.render_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            if stop.is_stopped() {
                return Ok(false);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    tick = oldest.tick(),
                    timeout_ms = self.config.render_timeout_ms,
                    "frame not rendered in time"
                );
                return Err(PipelineError::RenderTimeout {
                    tick: oldest.tick(),
                    timeout_ms: self.config.render_timeout_ms,
                });
            }
            if oldest.wait_rendered((deadline - now).min(STOP_CHECK_INTERVAL)) {
                break;
            }
        }
        self.retire_front();
        Ok(true)
    }

    fn log_summary(&self) {
        let (min_ms, max_ms) = self.timer.range_ms();
        tracing::debug!(
            ticks = self.timer.total_ticks(),
            ticks_per_second = self.timer.ticks_per_second(),
            mean_ms = self.timer.mean_ms(),
            min_ms,
            max_ms,
            "tick timing"
        );
        for (system, mean_ms) in self.timings.summary() {
            tracing::trace!(system = %system, mean_ms, "system timing");
        }
    }

    fn finish(&self) -> SimulationReport {
        let mut report = self.report.clone();
        if report.ticks > 0 {
            report.mean_tick_ms = self.busy.as_secs_f64() * 1000.0 / report.ticks as f64;
        }
        report
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("world", &self.world)
            .field("systems", &self.systems)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a simulation running on its own thread.
#[derive(Debug)]
pub struct SimulationHandle {
    commands: CommandSender,
    stop: StopSignal,
    thread: JoinHandle<Result<SimulationReport, PipelineError>>,
}

impl SimulationHandle {
    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Ask the loop to stop after the current tick.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to end and return its report.
    pub fn join(self) -> Result<SimulationReport, PipelineError> {
        self.thread
            .join()
            .map_err(|_| PipelineError::SimulationPanicked)?
    }

    pub fn stop_and_join(self) -> Result<SimulationReport, PipelineError> {
        self.stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{system_fn, WorldBuilder};
    use crate::FrameState;
    use parking_lot::Mutex;

    fn config(max_in_flight: usize, timeout_ms: u64) -> SimulationConfig {
        SimulationConfig {
            max_frames_in_flight: max_in_flight,
            render_timeout_ms: timeout_ms,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn commands_run_before_systems() {
        let mut builder = WorldBuilder::new();
        let marker = builder.register_raw("marker", 4).unwrap();
        let (mut sim, commands, frames) = Simulation::new(builder.build(), config(3, 1000)).unwrap();
        let stop = StopSignal::new();

        let entity = sim.world().entity_allocator().allocate();
        commands
            .send(move |world| world.add(entity, &[marker]).unwrap())
            .unwrap();

        let seen = Arc::new(AtomicBool::new(false));
        let seen_by_system = Arc::clone(&seen);
        sim.add_system(system_fn("observe", move |world, delta| {
            assert!(delta > 0.0);
            seen_by_system.store(world.entity_count() == 1, Ordering::SeqCst);
        }))
        .unwrap();

        assert_eq!(sim.tick(&stop).unwrap(), TickOutcome::Published(1));
        assert!(seen.load(Ordering::SeqCst));
        assert_eq!(commands.pending(), 0);

        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.tick(), 1);
        assert_eq!(frame.state(), FrameState::Published);
        assert_eq!(frame.extract(marker).map(|e| e.len()), Some(1));
    }

    #[test]
    fn queued_commands_run_in_send_order() {
        let (mut sim, commands, _frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..5 {
            let order = Arc::clone(&order);
            commands
                .send(move |_: &mut World| order.lock().push(index))
                .unwrap();
        }

        sim.tick(&StopSignal::new()).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(commands.pending(), 0);
    }

    #[test]
    fn blocking_send_resumes_once_inbox_drains() {
        let (mut sim, commands, _frames) = Simulation::new(
            WorldBuilder::new().build(),
            SimulationConfig {
                inbox_capacity: 2,
                ..config(3, 1000)
            },
        )
        .unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..2 {
            let order = Arc::clone(&order);
            commands
                .send(move |_: &mut World| order.lock().push(index))
                .unwrap();
        }

        let sender = commands.clone();
        let late = Arc::clone(&order);
        let blocked = thread::spawn(move || sender.send(move |_: &mut World| late.lock().push(2)));
        thread::sleep(Duration::from_millis(30));
        assert!(!blocked.is_finished(), "send returned while the inbox was full");
        assert_eq!(commands.pending(), 2);

        let stop = StopSignal::new();
        sim.tick(&stop).unwrap();
        blocked.join().unwrap().unwrap();
        sim.tick(&stop).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(commands.pending(), 0);
    }

    #[test]
    fn config_sets_parallel_chunk_size() {
        let (sim, _commands, _frames) = Simulation::new(
            WorldBuilder::new().build(),
            SimulationConfig {
                parallel_chunk_size: 7,
                ..SimulationConfig::default()
            },
        )
        .unwrap();
        assert_eq!(sim.world().chunk_size(), 7);
    }

    #[test]
    fn undelivered_frame_is_not_counted_in_flight() {
        let (mut sim, _commands, frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        drop(frames);

        assert_eq!(
            sim.tick(&StopSignal::new()).unwrap(),
            TickOutcome::ConsumerDisconnected
        );
        assert_eq!(sim.in_flight(), 0);
        assert_eq!(sim.report().peak_in_flight, 0);
        assert_eq!(sim.report().frames_published, 0);
    }

    #[test]
    fn recv_timeout_tells_slow_from_finished() {
        let (mut sim, _commands, frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        assert_eq!(
            frames.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            FrameRecvError::Timeout
        );

        sim.tick(&StopSignal::new()).unwrap();
        assert_eq!(frames.recv_timeout(Duration::from_millis(5)).unwrap().tick(), 1);

        drop(sim);
        assert_eq!(
            frames.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            FrameRecvError::Disconnected
        );
    }

    #[test]
    fn try_send_hands_back_command_when_full() {
        let (_sim, commands, _frames) = Simulation::new(
            WorldBuilder::new().build(),
            SimulationConfig {
                inbox_capacity: 1,
                ..SimulationConfig::default()
            },
        )
        .unwrap();

        commands.try_send(Box::new(|_: &mut World| {})).unwrap();
        let rejected = commands.try_send(Box::new(|_: &mut World| {})).unwrap_err();
        assert_eq!(rejected.reason, CommandError::Full);
    }

    #[test]
    fn duplicate_system_names_are_rejected() {
        let (mut sim, _commands, _frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        sim.add_system(system_fn("motion", |_, _| {})).unwrap();
        assert!(sim.add_system(system_fn("motion", |_, _| {})).is_err());
    }

    #[test]
    fn stop_is_observed_before_ticking() {
        let (mut sim, _commands, _frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        let stop = StopSignal::new();
        stop.stop();
        assert_eq!(sim.tick(&stop).unwrap(), TickOutcome::Stopped);
        assert_eq!(sim.report().ticks, 0);
    }

    #[test]
    fn dropped_receiver_ends_the_loop() {
        let (sim, _commands, frames) =
            Simulation::new(WorldBuilder::new().build(), config(3, 1000)).unwrap();
        drop(frames);
        let report = sim.run(StopSignal::new()).unwrap();
        assert_eq!(report.frames_published, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Simulation::new(WorldBuilder::new().build(), config(0, 1000)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let huge_floor = SimulationConfig {
            min_delta_seconds: 1e30,
            ..SimulationConfig::default()
        };
        let err = Simulation::new(WorldBuilder::new().build(), huge_floor).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "min_delta_seconds",
                ..
            }
        ));
    }
}
