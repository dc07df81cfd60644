//! Focus session types
//!
//! The live session owned by the state machine, the observable snapshot the
//! engine publishes, and the immutable record written when a session ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Preset session lengths offered by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Pomodoro: 25 min focus - sustainable rhythm
    #[default]
    Pomodoro,
    /// Deep: 90 min focus - maximum concentration
    Deep,
    /// Quick: 15 min focus - fast iteration
    Quick,
    /// Custom duration
    Custom,
}

impl SessionType {
    /// Get the default duration in minutes for this session type
    pub fn default_duration(&self) -> u32 {
        match self {
            SessionType::Pomodoro => 25,
            SessionType::Deep => 90,
            SessionType::Quick => 15,
            SessionType::Custom => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Pomodoro => "pomodoro",
            SessionType::Deep => "deep",
            SessionType::Quick => "quick",
            SessionType::Custom => "custom",
        }
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Succeeded,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Succeeded => "succeeded",
            SessionStatus::Failed => "failed",
        }
    }

    /// Succeeded and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Succeeded | SessionStatus::Failed)
    }
}

/// The single live session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Length chosen at start; fixed for the rest of the session
    pub planned: Duration,
    /// Countdown; never exceeds `planned`
    pub remaining: Duration,
    /// Last transition into Running
    pub started_at: Option<Instant>,
    pub status: SessionStatus,
}

impl Session {
    /// Planned length in whole minutes, rounded toward zero
    pub fn planned_minutes(&self) -> u32 {
        u32::try_from(self.planned.as_secs() / 60).unwrap_or(u32::MAX)
    }

    /// Time spent in Running since the last (re)start
    pub fn running_for(&self, now: Instant) -> Duration {
        self.started_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }
}

/// Whether an optional subsystem is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    #[default]
    Available,
    Absent,
}

/// Observable view of the session, published on every transition and tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub remaining_ms: u64,
    pub planned_ms: u64,
    /// Absent when no accelerometer feed was attached
    #[serde(default)]
    pub motion: Capability,
}

impl Snapshot {
    pub fn of(session: &Session, motion: Capability) -> Self {
        Self {
            status: session.status,
            remaining_ms: millis(session.remaining),
            planned_ms: millis(session.planned),
            motion,
        }
    }

    pub fn remaining(&self) -> Duration {
        Duration::from_millis(self.remaining_ms)
    }

    pub fn planned(&self) -> Duration {
        Duration::from_millis(self.planned_ms)
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    pub fn is_failed(&self) -> bool {
        self.status == SessionStatus::Failed
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == SessionStatus::Succeeded
    }

    /// Progress as a percentage (0-100)
    pub fn progress_percent(&self) -> u32 {
        if self.planned_ms == 0 {
            return 0;
        }
        let done = self.planned_ms.saturating_sub(self.remaining_ms);
        ((done * 100) / self.planned_ms).min(100) as u32
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A finished session (stored in the session logs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Planned duration in whole minutes, at least 1
    pub duration_minutes: u32,
    /// When the session ended
    pub occurred_at: DateTime<Utc>,
    /// True only when the countdown reached zero
    pub completed: bool,
}

impl SessionRecord {
    /// Create a record for a session ending now
    pub fn from_session(session: &Session, completed: bool) -> Self {
        Self::at(session, completed, Utc::now())
    }

    pub fn at(session: &Session, completed: bool, occurred_at: DateTime<Utc>) -> Self {
        Self {
            duration_minutes: session.planned_minutes().max(1),
            occurred_at,
            completed,
        }
    }
}
