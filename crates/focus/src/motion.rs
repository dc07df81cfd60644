//! Motion monitoring
//!
//! Watches an accelerometer feed and raises one disturbance per arming when
//! the acceleration magnitude crosses the sensitivity threshold after the
//! grace period. Placing the device down right after pressing start produces
//! a spike of its own, which the grace period absorbs.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::session::Capability;

/// One raw accelerometer reading (m/s²)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Receiving end of a sensor backend
pub type MotionFeed = mpsc::Receiver<MotionSample>;

/// Parameters of one arming
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arming {
    pub at: Instant,
    pub grace: Duration,
    pub threshold: f64,
}

/// Threshold logic, independent of channels and tasks
#[derive(Debug, Default)]
pub struct DisturbanceDetector {
    arming: Option<Arming>,
    fired: bool,
}

impl DisturbanceDetector {
    pub fn arm(&mut self, arming: Arming) {
        self.arming = Some(arming);
        self.fired = false;
    }

    pub fn disarm(&mut self) {
        self.arming = None;
    }

    pub fn is_observing(&self) -> bool {
        self.arming.is_some() && !self.fired
    }

    /// Returns the magnitude when this sample counts as a disturbance.
    /// Fires at most once per arming.
    pub fn observe(&mut self, sample: MotionSample, now: Instant) -> Option<f64> {
        let arming = self.arming?;
        if self.fired || now.saturating_duration_since(arming.at) < arming.grace {
            return None;
        }

        let magnitude = sample.magnitude();
        if magnitude > arming.threshold {
            self.fired = true;
            Some(magnitude)
        } else {
            None
        }
    }
}

/// Events emitted by the sample-watching task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionEvent {
    Disturbance { magnitude: f64 },
    /// The sample feed ended; no further disturbances can be detected
    FeedLost,
}

/// A motion event stamped with the arming it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSignal {
    pub generation: u64,
    pub event: MotionEvent,
}

/// Owns the sample-watching task and its arming state
pub struct MotionMonitor {
    control: watch::Sender<Option<(u64, Arming)>>,
    generation: u64,
    armed: bool,
    capability: Capability,
    task: Option<JoinHandle<()>>,
}

impl MotionMonitor {
    /// Start watching `feed`, reporting into `tx`. Without a feed the
    /// monitor is inert and reports the capability as absent.
    pub fn new<E>(feed: Option<MotionFeed>, tx: mpsc::Sender<E>) -> Self
    where
        E: From<MotionSignal> + Send + 'static,
    {
        let (control, control_rx) = watch::channel(None);

        let (capability, task) = match feed {
            Some(feed) => (
                Capability::Available,
                Some(tokio::spawn(watch_samples(feed, control_rx, tx))),
            ),
            None => {
                warn!("No motion sensor attached; disturbances will not be detected");
                (Capability::Absent, None)
            }
        };

        Self {
            control,
            generation: 0,
            armed: false,
            capability,
            task,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether a disturbance belongs to the live arming
    pub fn accepts(&self, signal: &MotionSignal) -> bool {
        self.armed && signal.generation == self.generation
    }

    /// Record that the feed is gone. Returns true if this changed the
    /// reported capability.
    pub fn lose_feed(&mut self) -> bool {
        self.task = None;
        let changed = self.capability != Capability::Absent;
        self.capability = Capability::Absent;
        changed
    }

    pub fn arm(&mut self, at: Instant, grace: Duration, threshold: f64) {
        self.generation += 1;
        self.armed = true;
        self.control.send_replace(Some((
            self.generation,
            Arming {
                at,
                grace,
                threshold,
            },
        )));
        debug!(generation = self.generation, "Motion monitor armed");
    }

    /// Stop observing. Signals already queued from the previous arming are
    /// rejected by `accepts` from here on.
    pub fn disarm(&mut self) {
        if self.armed {
            self.armed = false;
            self.control.send_replace(None);
            debug!(generation = self.generation, "Motion monitor disarmed");
        }
    }
}

impl Drop for MotionMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn watch_samples<E: From<MotionSignal>>(
    mut feed: MotionFeed,
    mut control: watch::Receiver<Option<(u64, Arming)>>,
    tx: mpsc::Sender<E>,
) {
    let mut detector = DisturbanceDetector::default();
    let mut generation = 0;

    loop {
        tokio::select! {
            biased;

            changed = control.changed() => {
                if changed.is_err() {
                    return;
                }
                match *control.borrow_and_update() {
                    Some((g, arming)) => {
                        generation = g;
                        detector.arm(arming);
                    }
                    None => detector.disarm(),
                }
            }

            sample = feed.recv() => {
                let Some(sample) = sample else {
                    warn!("Motion feed closed; disturbances will not be detected");
                    let signal = MotionSignal { generation, event: MotionEvent::FeedLost };
                    let _ = tx.send(signal.into()).await;
                    return;
                };
                if let Some(magnitude) = detector.observe(sample, Instant::now()) {
                    let signal = MotionSignal {
                        generation,
                        event: MotionEvent::Disturbance { magnitude },
                    };
                    if tx.send(signal.into()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
