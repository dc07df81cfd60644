//! Session state machine
//!
//! All timer, sensor, and recorder behavior is a function of the current
//! session and one event. The machine never touches a clock or a channel:
//! the evaluator hands it the current instant and carries out the returned
//! effects in order.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{FocusError, FocusResult};
use crate::notifier::{Alert, FailReason};
use crate::session::{Session, SessionStatus};

/// Longest accepted session (whole minutes must fit a `u32`)
pub const MAX_DURATION: Duration = Duration::from_secs(u32::MAX as u64 * 60);

/// Timing and sensitivity parameters fixed for one engine lifetime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineTimings {
    /// Clock tick period (UI smoothness only)
    pub tick_interval: Duration,
    /// Window after every (re)start in which disturbances are ignored
    pub grace_period: Duration,
    /// Acceleration magnitude above which the device counts as moved
    pub sensitivity: f64,
    /// Used when the first start carries no duration
    pub fallback_duration: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            grace_period: Duration::from_millis(1500),
            sensitivity: 5.0,
            fallback_duration: Duration::from_secs(25 * 60),
        }
    }
}

/// Commands accepted from the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start a new session, or resume a paused one
    Start(Option<Duration>),
    Pause,
    Stop,
}

/// Everything the evaluator can feed into the machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Command(Command),
    /// Clock progress since the previous tick
    Tick(Duration),
    /// Clock reached its deadline
    Finished,
    /// Motion monitor fired
    Disturbance { magnitude: f64 },
}

/// Side effects requested by a transition, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ArmClock { remaining: Duration },
    DisarmClock,
    ArmMotion { at: Instant },
    DisarmMotion,
    /// Hand a terminal session to the recorder
    Record { session: Session, completed: bool },
    Notify(Alert),
    /// Observable state changed
    Publish,
    /// Session is terminal; tear the engine down
    Shutdown,
}

/// Owner of the single live session
#[derive(Debug)]
pub struct SessionMachine {
    session: Session,
    timings: EngineTimings,
    /// Instant the running countdown would hit zero
    deadline: Option<Instant>,
    /// Set by the first accepted start of this machine's lifetime
    started_once: bool,
}

impl SessionMachine {
    pub fn new(timings: EngineTimings) -> Self {
        Self {
            session: Session::default(),
            timings,
            deadline: None,
            started_once: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn timings(&self) -> &EngineTimings {
        &self.timings
    }

    /// Return a terminal machine to Idle for another session.
    ///
    /// Later starts must name their duration: the fallback only covers the
    /// first start of the machine's lifetime.
    pub fn reset(&mut self) {
        if self.session.status.is_terminal() {
            self.session = Session::default();
            self.deadline = None;
        }
    }

    /// Apply one event.
    ///
    /// Commands that make no sense in the current state are no-ops and yield
    /// no effects. The only error is a rejected start, which leaves the
    /// session untouched.
    pub fn handle(&mut self, event: Event, now: Instant) -> FocusResult<Vec<Effect>> {
        let effects = match event {
            Event::Command(Command::Start(duration)) => self.start(duration, now)?,
            Event::Command(Command::Pause) => self.pause(now),
            Event::Command(Command::Stop) => self.stop(),
            Event::Tick(elapsed) => self.tick(elapsed),
            Event::Finished => self.tick(self.session.remaining),
            Event::Disturbance { magnitude } => self.disturb(magnitude, now),
        };
        Ok(effects)
    }

    fn start(&mut self, requested: Option<Duration>, now: Instant) -> FocusResult<Vec<Effect>> {
        match self.session.status {
            SessionStatus::Idle => {
                let planned = self.resolve_duration(requested, now)?;
                self.started_once = true;
                self.session.planned = planned;
                self.session.remaining = planned;
                info!(planned_secs = planned.as_secs(), "Focus session started");
                Ok(self.run_from(now))
            }
            SessionStatus::Paused => {
                if requested.is_some() {
                    debug!("Duration is fixed once started; ignoring it on resume");
                }
                if self.session.remaining < self.timings.tick_interval {
                    self.session.remaining = self.session.planned;
                }
                info!(
                    remaining_ms = self.session.remaining.as_millis() as u64,
                    "Focus session resumed"
                );
                Ok(self.run_from(now))
            }
            status => {
                debug!(status = status.as_str(), "Start ignored");
                Ok(Vec::new())
            }
        }
    }

    fn resolve_duration(&self, requested: Option<Duration>, now: Instant) -> FocusResult<Duration> {
        let planned = match requested {
            Some(duration) if duration.is_zero() => Err(FocusError::InvalidDuration(
                "duration must be positive".to_string(),
            )),
            Some(duration) => Ok(duration),
            None if self.started_once => Err(FocusError::InvalidDuration(
                "a duration is required after the first session".to_string(),
            )),
            None if self.timings.fallback_duration.is_zero() => Err(
                FocusError::InvalidDuration("configured default duration is zero".to_string()),
            ),
            None => Ok(self.timings.fallback_duration),
        }?;

        if planned > MAX_DURATION || now.checked_add(planned).is_none() {
            return Err(FocusError::InvalidDuration(format!(
                "{} minutes is too long",
                planned.as_secs() / 60
            )));
        }
        Ok(planned)
    }

    /// Enter Running from Idle or Paused with `remaining` already settled
    fn run_from(&mut self, now: Instant) -> Vec<Effect> {
        self.session.status = SessionStatus::Running;
        self.session.started_at = Some(now);
        self.deadline = now.checked_add(self.session.remaining);

        vec![
            Effect::ArmClock {
                remaining: self.session.remaining,
            },
            Effect::ArmMotion { at: now },
            Effect::Notify(Alert::Running {
                remaining: self.session.remaining,
            }),
            Effect::Publish,
        ]
    }

    fn tick(&mut self, elapsed: Duration) -> Vec<Effect> {
        if self.session.status != SessionStatus::Running {
            return Vec::new();
        }

        self.session.remaining = self.session.remaining.saturating_sub(elapsed);
        if self.session.remaining.is_zero() {
            info!("Focus session completed");
            self.finish(SessionStatus::Succeeded, None)
        } else {
            vec![Effect::Publish]
        }
    }

    fn disturb(&mut self, magnitude: f64, now: Instant) -> Vec<Effect> {
        if self.session.status != SessionStatus::Running {
            return Vec::new();
        }

        if self.session.running_for(now) < self.timings.grace_period {
            debug!(magnitude, "Disturbance inside grace period ignored");
            return Vec::new();
        }

        info!(magnitude, "Device moved, focus session failed");
        self.finish(SessionStatus::Failed, Some(FailReason::Disturbed))
    }

    fn pause(&mut self, now: Instant) -> Vec<Effect> {
        if self.session.status != SessionStatus::Running {
            debug!(status = self.session.status.as_str(), "Pause ignored");
            return Vec::new();
        }

        let left = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(self.session.remaining);
        self.session.remaining = self.session.remaining.min(left);
        self.session.status = SessionStatus::Paused;
        self.deadline = None;

        info!(
            remaining_ms = self.session.remaining.as_millis() as u64,
            "Focus session paused"
        );

        vec![
            Effect::DisarmClock,
            Effect::DisarmMotion,
            Effect::Notify(Alert::Paused {
                remaining: self.session.remaining,
            }),
            Effect::Publish,
        ]
    }

    fn stop(&mut self) -> Vec<Effect> {
        match self.session.status {
            SessionStatus::Running | SessionStatus::Paused => {
                info!("Focus session stopped early");
                self.finish(SessionStatus::Failed, Some(FailReason::Stopped))
            }
            status => {
                debug!(status = status.as_str(), "Stop ignored");
                Vec::new()
            }
        }
    }

    /// The one path into a terminal state
    fn finish(&mut self, outcome: SessionStatus, reason: Option<FailReason>) -> Vec<Effect> {
        let completed = outcome == SessionStatus::Succeeded;
        self.session.status = outcome;
        self.deadline = None;

        let ended = self.session.clone();
        let minutes = ended.planned_minutes();
        let alert = match reason {
            Some(reason) if !completed => Alert::Failed { minutes, reason },
            _ => Alert::Succeeded { minutes },
        };

        // Display only; the record already carries the planned length
        if !completed {
            self.session.remaining = self.session.planned;
        }

        vec![
            Effect::Record {
                session: ended,
                completed,
            },
            Effect::Notify(alert),
            Effect::DisarmClock,
            Effect::DisarmMotion,
            Effect::Publish,
            Effect::Shutdown,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);
    const SECOND: Duration = Duration::from_secs(1);

    fn machine() -> SessionMachine {
        SessionMachine::new(EngineTimings::default())
    }

    fn records(effects: &[Effect]) -> Vec<(u32, bool)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Record { session, completed } => {
                    Some((session.planned_minutes(), *completed))
                }
                _ => None,
            })
            .collect()
    }

    fn start(m: &mut SessionMachine, d: Option<Duration>, now: Instant) -> Vec<Effect> {
        m.handle(Event::Command(Command::Start(d)), now).unwrap()
    }

    #[test]
    fn test_start_arms_sources() {
        let mut m = machine();
        let t0 = Instant::now();
        let effects = start(&mut m, Some(10 * MINUTE), t0);

        assert_eq!(m.status(), SessionStatus::Running);
        assert_eq!(m.session().remaining, 10 * MINUTE);
        assert_eq!(m.session().started_at, Some(t0));
        assert!(effects.contains(&Effect::ArmClock {
            remaining: 10 * MINUTE
        }));
        assert!(effects.contains(&Effect::ArmMotion { at: t0 }));
        assert!(records(&effects).is_empty());
    }

    #[test]
    fn test_scenario_a_full_countdown_succeeds() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);

        let mut all = Vec::new();
        let mut previous = m.session().remaining;
        for i in 1..=1500u32 {
            let effects = m.handle(Event::Tick(SECOND), t0 + SECOND * i).unwrap();
            assert!(m.session().remaining <= previous);
            previous = m.session().remaining;
            if i < 1500 {
                assert_eq!(m.status(), SessionStatus::Running);
                assert!(!m.session().remaining.is_zero());
            }
            all.extend(effects);
        }

        assert_eq!(m.status(), SessionStatus::Succeeded);
        assert_eq!(m.session().remaining, Duration::ZERO);
        assert_eq!(records(&all), vec![(25, true)]);
        assert!(all.contains(&Effect::Shutdown));
    }

    #[test]
    fn test_scenario_b_disturbance_fails_session() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);

        let effects = m
            .handle(Event::Disturbance { magnitude: 9.0 }, t0 + 2 * SECOND)
            .unwrap();
        assert_eq!(m.status(), SessionStatus::Failed);
        assert_eq!(records(&effects), vec![(25, false)]);

        for i in 0..10u32 {
            let later = m.handle(Event::Tick(SECOND), t0 + SECOND * (3 + i)).unwrap();
            assert!(later.is_empty());
        }
        assert_eq!(m.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_scenario_c_stop_while_paused() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);

        let paused = m.handle(Event::Command(Command::Pause), t0 + 10 * MINUTE).unwrap();
        assert_eq!(m.status(), SessionStatus::Paused);
        assert_eq!(m.session().remaining, 15 * MINUTE);
        assert!(paused.contains(&Effect::DisarmClock));
        assert!(paused.contains(&Effect::DisarmMotion));

        let stopped = m.handle(Event::Command(Command::Stop), t0 + 11 * MINUTE).unwrap();
        assert_eq!(m.status(), SessionStatus::Failed);
        assert_eq!(records(&stopped), vec![(25, false)]);
        // Display resets to the planned length
        assert_eq!(m.session().remaining, 25 * MINUTE);
    }

    #[test]
    fn test_scenario_d_first_start_uses_default() {
        let mut m = machine();
        start(&mut m, None, Instant::now());
        assert_eq!(m.session().planned, 25 * MINUTE);
        assert_eq!(m.status(), SessionStatus::Running);
    }

    #[test]
    fn test_fallback_comes_from_timings() {
        let mut m = SessionMachine::new(EngineTimings {
            fallback_duration: 40 * MINUTE,
            ..EngineTimings::default()
        });
        start(&mut m, None, Instant::now());
        assert_eq!(m.session().planned, 40 * MINUTE);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut m = machine();
        let result = m.handle(
            Event::Command(Command::Start(Some(Duration::ZERO))),
            Instant::now(),
        );
        assert!(matches!(result, Err(FocusError::InvalidDuration(_))));
        assert_eq!(m.status(), SessionStatus::Idle);
    }

    #[test]
    fn test_oversized_duration_rejected() {
        let mut m = machine();
        let t0 = Instant::now();
        for duration in [Duration::MAX, MAX_DURATION + SECOND] {
            let result = m.handle(Event::Command(Command::Start(Some(duration))), t0);
            assert!(matches!(result, Err(FocusError::InvalidDuration(_))));
            assert_eq!(m.status(), SessionStatus::Idle);
        }

        start(&mut m, Some(MAX_DURATION), t0);
        assert_eq!(m.status(), SessionStatus::Running);
        assert_eq!(m.session().planned_minutes(), u32::MAX);
    }

    #[test]
    fn test_missing_duration_after_first_session_rejected() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(MINUTE), t0);
        m.handle(Event::Command(Command::Stop), t0).unwrap();

        m.reset();
        assert_eq!(m.status(), SessionStatus::Idle);

        let result = m.handle(Event::Command(Command::Start(None)), t0);
        assert!(matches!(result, Err(FocusError::InvalidDuration(_))));
        assert_eq!(m.status(), SessionStatus::Idle);

        start(&mut m, Some(5 * MINUTE), t0);
        assert_eq!(m.status(), SessionStatus::Running);
    }

    #[test]
    fn test_reset_only_from_terminal() {
        let mut m = machine();
        start(&mut m, Some(MINUTE), Instant::now());
        m.reset();
        assert_eq!(m.status(), SessionStatus::Running);
    }

    #[test]
    fn test_grace_period_shielding() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);

        let early = m
            .handle(
                Event::Disturbance { magnitude: 50.0 },
                t0 + Duration::from_millis(1499),
            )
            .unwrap();
        assert!(early.is_empty());
        assert_eq!(m.status(), SessionStatus::Running);

        let late = m
            .handle(
                Event::Disturbance { magnitude: 50.0 },
                t0 + Duration::from_millis(1500),
            )
            .unwrap();
        assert_eq!(m.status(), SessionStatus::Failed);
        assert_eq!(records(&late).len(), 1);
    }

    #[test]
    fn test_resume_restarts_grace_period() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);
        m.handle(Event::Command(Command::Pause), t0 + MINUTE).unwrap();

        let t1 = t0 + 5 * MINUTE;
        start(&mut m, None, t1);
        assert_eq!(m.session().started_at, Some(t1));

        let shielded = m
            .handle(Event::Disturbance { magnitude: 50.0 }, t1 + SECOND)
            .unwrap();
        assert!(shielded.is_empty());
        assert_eq!(m.status(), SessionStatus::Running);
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(10 * MINUTE), t0);

        for i in 1..=240u32 {
            m.handle(Event::Tick(SECOND), t0 + SECOND * i).unwrap();
        }
        m.handle(Event::Command(Command::Pause), t0 + 4 * MINUTE).unwrap();
        let paused_at = m.session().remaining;
        assert_eq!(paused_at, 6 * MINUTE);

        let t1 = t0 + 60 * MINUTE;
        let resumed = start(&mut m, None, t1);
        assert!(resumed.contains(&Effect::ArmClock {
            remaining: 6 * MINUTE
        }));

        let mut all = Vec::new();
        for i in 1..=360u32 {
            if i < 360 {
                assert_eq!(m.status(), SessionStatus::Running);
            }
            all.extend(m.handle(Event::Tick(SECOND), t1 + SECOND * i).unwrap());
        }
        assert_eq!(m.status(), SessionStatus::Succeeded);
        assert_eq!(records(&all), vec![(10, true)]);
    }

    #[test]
    fn test_pause_clamps_to_zero_after_deadline() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(MINUTE), t0);

        m.handle(Event::Command(Command::Pause), t0 + 2 * MINUTE).unwrap();
        assert_eq!(m.status(), SessionStatus::Paused);
        assert_eq!(m.session().remaining, Duration::ZERO);

        // Below one tick: resume restarts the full length rather than finishing
        let effects = start(&mut m, None, t0 + 3 * MINUTE);
        assert_eq!(m.status(), SessionStatus::Running);
        assert!(effects.contains(&Effect::ArmClock { remaining: MINUTE }));
    }

    #[test]
    fn test_resume_ignores_new_duration() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(20 * MINUTE), t0);
        m.handle(Event::Command(Command::Pause), t0 + 5 * MINUTE).unwrap();

        start(&mut m, Some(45 * MINUTE), t0 + 6 * MINUTE);
        assert_eq!(m.session().planned, 20 * MINUTE);
        assert_eq!(m.session().remaining, 15 * MINUTE);
    }

    #[test]
    fn test_finished_event_succeeds() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(MINUTE), t0);
        m.handle(Event::Tick(10 * SECOND), t0 + 10 * SECOND).unwrap();

        let effects = m.handle(Event::Finished, t0 + MINUTE).unwrap();
        assert_eq!(m.status(), SessionStatus::Succeeded);
        assert_eq!(records(&effects), vec![(1, true)]);
    }

    #[test]
    fn test_termination_is_idempotent() {
        let mut m = machine();
        let t0 = Instant::now();
        let mut all = start(&mut m, Some(25 * MINUTE), t0);
        all.extend(m.handle(Event::Command(Command::Stop), t0 + MINUTE).unwrap());

        let followups = [
            Event::Command(Command::Stop),
            Event::Command(Command::Pause),
            Event::Command(Command::Start(None)),
            Event::Command(Command::Start(Some(MINUTE))),
            Event::Tick(SECOND),
            Event::Finished,
            Event::Disturbance { magnitude: 99.0 },
        ];
        for event in followups {
            let effects = m.handle(event, t0 + 2 * MINUTE).unwrap();
            assert!(effects.is_empty(), "{:?} produced effects", event);
            all.extend(effects);
        }

        assert_eq!(records(&all), vec![(25, false)]);
        assert_eq!(m.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_invalid_commands_are_noops() {
        let mut m = machine();
        let t0 = Instant::now();
        assert!(m.handle(Event::Command(Command::Pause), t0).unwrap().is_empty());
        assert!(m.handle(Event::Command(Command::Stop), t0).unwrap().is_empty());
        assert!(m.handle(Event::Tick(SECOND), t0).unwrap().is_empty());
        assert_eq!(m.status(), SessionStatus::Idle);

        start(&mut m, Some(MINUTE), t0);
        assert!(start(&mut m, Some(5 * MINUTE), t0).is_empty());
        assert_eq!(m.session().planned, MINUTE);

        m.handle(Event::Command(Command::Pause), t0 + SECOND).unwrap();
        assert!(m.handle(Event::Command(Command::Pause), t0).unwrap().is_empty());
        assert!(m.handle(Event::Tick(SECOND), t0).unwrap().is_empty());
        assert!(m
            .handle(Event::Disturbance { magnitude: 99.0 }, t0 + MINUTE)
            .unwrap()
            .is_empty());
        assert_eq!(m.status(), SessionStatus::Paused);
    }

    #[test]
    fn test_failure_alert_carries_reason() {
        let mut m = machine();
        let t0 = Instant::now();
        start(&mut m, Some(25 * MINUTE), t0);
        let effects = m
            .handle(Event::Disturbance { magnitude: 7.5 }, t0 + MINUTE)
            .unwrap();
        assert!(effects.contains(&Effect::Notify(Alert::Failed {
            minutes: 25,
            reason: FailReason::Disturbed,
        })));
    }
}
