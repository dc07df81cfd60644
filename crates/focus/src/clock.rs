//! Countdown clock
//!
//! While armed, a background task reports elapsed time at a fixed interval
//! and signals when the countdown reaches its deadline. Every arming gets a
//! fresh generation number; events carry it so the evaluator can drop
//! anything still queued from an arming it has since cancelled.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Events emitted by an armed clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Interval boundary; `elapsed` is real time since the previous event
    Tick { elapsed: Duration, remaining: Duration },
    /// Deadline reached; no further events for this arming
    Finished,
}

/// A clock event stamped with the arming it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSignal {
    pub generation: u64,
    pub event: ClockEvent,
}

/// Periodic countdown source.
///
/// Generic over the queue item so the clock can feed the engine's single
/// event queue directly.
pub struct ClockSource<E: From<ClockSignal> + Send + 'static> {
    tx: mpsc::Sender<E>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl<E: From<ClockSignal> + Send + 'static> ClockSource<E> {
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self {
            tx,
            task: None,
            generation: 0,
        }
    }

    /// Generation of the current (or most recent) arming
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Whether a signal belongs to the live arming
    pub fn accepts(&self, signal: &ClockSignal) -> bool {
        self.task.is_some() && signal.generation == self.generation
    }

    /// Start counting down `duration`, replacing any earlier arming
    pub fn arm(&mut self, duration: Duration, interval: Duration) {
        self.disarm();
        self.generation += 1;

        let generation = self.generation;
        let tx = self.tx.clone();
        let interval = interval.max(Duration::from_millis(1));
        debug!(generation, duration_ms = duration.as_millis() as u64, "Clock armed");

        self.task = Some(tokio::spawn(run_countdown(
            generation, duration, interval, tx,
        )));
    }

    /// Cancel the countdown. Signals already queued from this arming are
    /// rejected by `accepts` from here on.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "Clock disarmed");
        }
    }
}

impl<E: From<ClockSignal> + Send + 'static> Drop for ClockSource<E> {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_countdown<E: From<ClockSignal>>(
    generation: u64,
    duration: Duration,
    interval: Duration,
    tx: mpsc::Sender<E>,
) {
    let start = Instant::now();
    let Some(deadline) = start.checked_add(duration) else {
        warn!(generation, "Countdown too long to schedule; clock not started");
        return;
    };
    let mut last = start;

    loop {
        let next = (last + interval).min(deadline);
        sleep_until(next).await;

        let now = Instant::now();
        let event = if now >= deadline {
            ClockEvent::Finished
        } else {
            ClockEvent::Tick {
                elapsed: now - last,
                remaining: deadline - now,
            }
        };
        last = now;

        if tx.send(ClockSignal { generation, event }.into()).await.is_err() {
            return;
        }
        if event == ClockEvent::Finished {
            return;
        }
    }
}
