//! User-visible alerts for session transitions
//!
//! The engine never waits on a notification: alerts are handed to a
//! blocking worker so a slow desktop backend cannot stall the evaluator.

use anyhow::{bail, Result};
use std::process::Command;
use std::time::Duration;

use daedalos_core::format;

/// Why a session ended without completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The motion monitor fired after the grace period
    Disturbed,
    /// Stopped from the control surface
    Stopped,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::Disturbed => "device moved",
            FailReason::Stopped => "stopped early",
        }
    }
}

/// An alert raised by a session transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Running { remaining: Duration },
    Paused { remaining: Duration },
    Succeeded { minutes: u32 },
    Failed { minutes: u32, reason: FailReason },
    /// The session record could not be written
    RecordNotSaved { error: String },
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Alert::Running { .. } => "Focus",
            Alert::Paused { .. } => "Focus paused",
            Alert::Succeeded { .. } => "Focus complete",
            Alert::Failed { .. } => "Focus failed",
            Alert::RecordNotSaved { .. } => "Focus history",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Alert::Running { remaining } => {
                format!("Timer running: {} remaining", format::countdown(*remaining))
            }
            Alert::Paused { remaining } => {
                format!("Timer paused with {} remaining", format::countdown(*remaining))
            }
            Alert::Succeeded { minutes } => {
                format!("{} minute session completed. Take a break!", minutes)
            }
            Alert::Failed { minutes, reason } => {
                format!("{} minute session failed: {}", minutes, reason.as_str())
            }
            Alert::RecordNotSaved { error } => format!("Session was not saved: {}", error),
        }
    }

    /// Progress alerts are routine; outcomes deserve attention
    pub fn is_urgent(&self) -> bool {
        matches!(self, Alert::Failed { .. } | Alert::RecordNotSaved { .. })
    }

    fn is_outcome(&self) -> bool {
        !matches!(self, Alert::Running { .. } | Alert::Paused { .. })
    }
}

/// Receives alerts for user-visible notification
pub trait Notifier: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Discards every alert
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _alert: &Alert) -> Result<()> {
        Ok(())
    }
}

/// Available desktop notification backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// macOS osascript
    Osascript,
    /// Linux notify-send
    NotifySend,
    /// Fallback echo to stdout
    Echo,
}

impl Backend {
    /// Detect the best available backend for the current platform
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            return Self::Osascript;
        }
        if cfg!(target_os = "linux") && Self::command_exists("notify-send") {
            return Self::NotifySend;
        }
        Self::Echo
    }

    fn command_exists(cmd: &str) -> bool {
        Command::new("which")
            .arg(cmd)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Osascript => "osascript",
            Self::NotifySend => "notify-send",
            Self::Echo => "echo",
        }
    }

    fn send(&self, alert: &Alert) -> Result<()> {
        match self {
            Self::Osascript => Self::send_osascript(alert),
            Self::NotifySend => Self::send_notify_send(alert),
            Self::Echo => {
                println!("[{}] {}", alert.title(), alert.message());
                Ok(())
            }
        }
    }

    fn send_osascript(alert: &Alert) -> Result<()> {
        let title = alert.title().replace('"', r#"\""#);
        let message = alert.message().replace('"', r#"\""#);

        let mut script = format!(r#"display notification "{}" with title "{}""#, message, title);
        if alert.is_outcome() {
            script.push_str(r#" sound name "default""#);
        }

        let status = Command::new("osascript").args(["-e", &script]).status()?;
        if !status.success() {
            bail!("osascript failed with status: {}", status);
        }
        Ok(())
    }

    fn send_notify_send(alert: &Alert) -> Result<()> {
        let mut cmd = Command::new("notify-send");
        cmd.args([alert.title(), alert.message().as_str()]);

        if alert.is_urgent() {
            cmd.args(["--urgency", "critical"]);
        } else if !alert.is_outcome() {
            cmd.args(["--urgency", "low", "--expire-time", "3000"]);
        }

        let status = cmd.status()?;
        if !status.success() {
            bail!("notify-send failed with status: {}", status);
        }
        Ok(())
    }
}

/// Sends alerts through the platform notification backend
#[derive(Debug, Clone, Copy)]
pub struct DesktopNotifier {
    backend: Backend,
    /// Also show Running/Paused alerts, not just outcomes
    progress: bool,
}

impl DesktopNotifier {
    pub fn detect(progress: bool) -> Self {
        Self {
            backend: Backend::detect(),
            progress,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        if !self.progress && !alert.is_outcome() {
            return Ok(());
        }
        self.backend.send(alert)
    }
}
