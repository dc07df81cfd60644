//! Focus engine
//!
//! One task owns the state machine and evaluates every event in arrival
//! order: commands from handles, clock signals and motion signals all share
//! a single queue. Signals from an arming that has since been cancelled are
//! dropped before they reach the machine, so a disarm takes effect the moment
//! the evaluator performs it.
//!
//! The engine tears itself down once the session is terminal. The record
//! write it dispatched is awaited and returned in the `EngineOutcome`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::{ClockEvent, ClockSignal, ClockSource};
use crate::error::{FocusError, FocusResult};
use crate::machine::{Command, Effect, EngineTimings, Event, SessionMachine};
use crate::motion::{MotionEvent, MotionFeed, MotionMonitor, MotionSignal};
use crate::notifier::{Alert, Notifier};
use crate::recorder::{PendingWrite, SessionRecorder, SessionSink};
use crate::session::{SessionRecord, SessionStatus, Snapshot};

const QUEUE_DEPTH: usize = 64;

type Reply = oneshot::Sender<FocusResult<Snapshot>>;

/// Items on the engine's single event queue
#[derive(Debug)]
pub enum EngineEvent {
    Command { command: Command, reply: Reply },
    Clock(ClockSignal),
    Motion(MotionSignal),
}

impl From<ClockSignal> for EngineEvent {
    fn from(signal: ClockSignal) -> Self {
        EngineEvent::Clock(signal)
    }
}

impl From<MotionSignal> for EngineEvent {
    fn from(signal: MotionSignal) -> Self {
        EngineEvent::Motion(signal)
    }
}

/// External collaborators wired into an engine
pub struct Collaborators {
    pub sink: Arc<dyn SessionSink>,
    pub notifier: Arc<dyn Notifier>,
    /// Accelerometer samples; `None` runs without disturbance detection
    pub motion: Option<MotionFeed>,
}

/// Final state of an engine that tore down
#[derive(Debug)]
pub struct EngineOutcome {
    pub snapshot: Snapshot,
    /// Result of the record write, if the session reached a terminal state
    pub record: Option<FocusResult<SessionRecord>>,
}

pub struct Engine {
    machine: SessionMachine,
    clock: ClockSource<EngineEvent>,
    motion: MotionMonitor,
    recorder: SessionRecorder,
    notifier: Arc<dyn Notifier>,
    events: mpsc::Receiver<EngineEvent>,
    snapshot: watch::Sender<Snapshot>,
    pending: Option<PendingWrite>,
}

impl Engine {
    /// Start an idle engine on the current runtime
    pub fn spawn(
        timings: EngineTimings,
        collaborators: Collaborators,
    ) -> (EngineHandle, JoinHandle<EngineOutcome>) {
        let (tx, events) = mpsc::channel(QUEUE_DEPTH);

        let machine = SessionMachine::new(timings);
        let motion = MotionMonitor::new(collaborators.motion, tx.clone());
        let (snapshot, snapshot_rx) =
            watch::channel(Snapshot::of(machine.session(), motion.capability()));

        let engine = Self {
            machine,
            clock: ClockSource::new(tx.clone()),
            motion,
            recorder: SessionRecorder::new(collaborators.sink, Arc::clone(&collaborators.notifier)),
            notifier: collaborators.notifier,
            events,
            snapshot,
            pending: None,
        };

        let handle = EngineHandle {
            events: tx,
            snapshot: snapshot_rx,
        };
        (handle, tokio::spawn(engine.run()))
    }

    async fn run(mut self) -> EngineOutcome {
        loop {
            let idle = self.machine.status() == SessionStatus::Idle;
            let event = tokio::select! {
                event = self.events.recv() => event,
                // Nobody left to start it
                _ = self.snapshot.closed(), if idle => None,
            };
            let Some(event) = event else {
                debug!("Engine abandoned before a session finished");
                break;
            };
            if self.dispatch(event) {
                break;
            }
        }

        self.events.close();
        self.clock.disarm();
        self.motion.disarm();

        let record = match self.pending.take() {
            Some(write) => Some(write.await.unwrap_or_else(|e| {
                Err(FocusError::Persistence(format!("record writer failed: {}", e)))
            })),
            None => None,
        };

        EngineOutcome {
            snapshot: *self.snapshot.borrow(),
            record,
        }
    }

    /// Evaluate one event. Returns true once the engine should shut down.
    fn dispatch(&mut self, event: EngineEvent) -> bool {
        let now = Instant::now();
        match event {
            EngineEvent::Command { command, reply } => {
                let result = self.machine.handle(Event::Command(command), now);
                let (shutdown, outcome) = match result {
                    Ok(effects) => {
                        let shutdown = self.apply(effects);
                        (shutdown, Ok(self.current()))
                    }
                    Err(e) => {
                        warn!("{:?} rejected: {}", command, e);
                        (false, Err(e))
                    }
                };
                let _ = reply.send(outcome);
                shutdown
            }
            EngineEvent::Clock(signal) => {
                if !self.clock.accepts(&signal) {
                    debug!(generation = signal.generation, "Stale clock signal dropped");
                    return false;
                }
                let event = match signal.event {
                    ClockEvent::Tick { elapsed, .. } => Event::Tick(elapsed),
                    ClockEvent::Finished => Event::Finished,
                };
                self.evaluate(event, now)
            }
            EngineEvent::Motion(signal) => match signal.event {
                MotionEvent::FeedLost => {
                    if self.motion.lose_feed() {
                        warn!("Motion detection lost for the rest of this session");
                        self.snapshot.send_replace(self.current());
                    }
                    false
                }
                MotionEvent::Disturbance { magnitude } => {
                    if !self.motion.accepts(&signal) {
                        debug!(generation = signal.generation, "Stale motion signal dropped");
                        return false;
                    }
                    self.evaluate(Event::Disturbance { magnitude }, now)
                }
            },
        }
    }

    fn evaluate(&mut self, event: Event, now: Instant) -> bool {
        match self.machine.handle(event, now) {
            Ok(effects) => self.apply(effects),
            Err(e) => {
                warn!("{:?} rejected: {}", event, e);
                false
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) -> bool {
        let timings = *self.machine.timings();
        let mut shutdown = false;

        for effect in effects {
            match effect {
                Effect::ArmClock { remaining } => self.clock.arm(remaining, timings.tick_interval),
                Effect::DisarmClock => self.clock.disarm(),
                Effect::ArmMotion { at } => {
                    self.motion.arm(at, timings.grace_period, timings.sensitivity)
                }
                Effect::DisarmMotion => self.motion.disarm(),
                Effect::Record { session, completed } => {
                    if self.pending.is_some() {
                        warn!("Session already recorded; ignoring second record");
                    } else {
                        self.pending = Some(self.recorder.record(&session, completed));
                    }
                }
                Effect::Notify(alert) => self.notify(alert),
                Effect::Publish => {
                    self.snapshot.send_replace(self.current());
                }
                Effect::Shutdown => shutdown = true,
            }
        }

        shutdown
    }

    fn notify(&self, alert: Alert) {
        let notifier = Arc::clone(&self.notifier);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notifier.notify(&alert) {
                warn!("Failed to send notification: {:#}", e);
            }
        });
    }

    fn current(&self) -> Snapshot {
        Snapshot::of(self.machine.session(), self.motion.capability())
    }
}

/// Cloneable control and observation handle
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
    snapshot: watch::Receiver<Snapshot>,
}

impl EngineHandle {
    /// Start a new session, or resume a paused one
    pub async fn start(&self, duration: Option<Duration>) -> FocusResult<Snapshot> {
        self.send(Command::Start(duration)).await
    }

    pub async fn pause(&self) -> FocusResult<Snapshot> {
        self.send(Command::Pause).await
    }

    pub async fn stop(&self) -> FocusResult<Snapshot> {
        self.send(Command::Stop).await
    }

    pub async fn send(&self, command: Command) -> FocusResult<Snapshot> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(EngineEvent::Command { command, reply })
            .await
            .map_err(|_| FocusError::EngineClosed)?;
        response.await.map_err(|_| FocusError::EngineClosed)?
    }

    /// Watch every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        *self.snapshot.borrow()
    }

    pub fn remaining(&self) -> Duration {
        self.snapshot().remaining()
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.snapshot().is_paused()
    }

    pub fn is_failed(&self) -> bool {
        self.snapshot().is_failed()
    }

    pub fn is_succeeded(&self) -> bool {
        self.snapshot().is_succeeded()
    }

    /// Whether the engine has torn down
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}
