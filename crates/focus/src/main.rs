//! focus - Motion-guarded focus timer
//!
//! Usage:
//!   focus start [MINS]          Start a focus session (default: 25 mins)
//!   focus start --deep          Start a 90-minute deep work session
//!   focus pause                 Pause the running session
//!   focus resume                Resume a paused session
//!   focus stop                  End the session early (counts as failed)
//!   focus status                Show focus session status
//!   focus history               List past sessions
//!   focus stats [DAYS]          Show focus statistics

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use daedalos_core::{format, Paths};
use focus::control::{ControlClient, ControlServer};
use focus::notifier::DesktopNotifier;
use focus::prefs::{FilePreferences, PreferenceStore};
use focus::sensor::SensorBackend;
use focus::{
    Collaborators, Engine, EngineHandle, EngineOutcome, FocusConfig, FocusStats, FocusStore,
    SessionStatus, SessionType, Snapshot,
};

/// Focus - Motion-guarded focus timer
#[derive(Parser)]
#[command(name = "focus")]
#[command(about = "Focus timer that fails the session when the device is moved")]
#[command(version)]
#[command(after_help = r#"WHEN TO USE:
    Put the device face down and start a session. Picking it up after the
    grace period fails the session. Completed and failed sessions are both
    recorded.

PRESETS:
    --pomodoro    25 min focus (default)
    --deep        90 min focus
    --quick       15 min focus

EXAMPLES:
    focus start                 # Start with the last chosen length
    focus start --deep          # Start 90-minute deep work session
    focus start 45              # Custom duration, remembered for next time
    focus pause                 # Hold the countdown
    focus resume                # Continue where it stopped
    focus stop                  # End session early
    focus stats 30              # Show 30-day statistics

CONFIG:
    ~/.config/daedalos/focus/config.json
    RUST_LOG=focus=debug for engine logs

ALIASES:
    focus s     # start
    focus st    # status
"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a focus session, or resume a paused one
    #[command(alias = "s")]
    Start {
        /// Duration in minutes (default: last chosen, or 25)
        #[arg(value_name = "MINS")]
        duration: Option<u32>,

        /// Use pomodoro preset (25 min)
        #[arg(long)]
        pomodoro: bool,

        /// Use deep work preset (90 min)
        #[arg(long)]
        deep: bool,

        /// Use quick preset (15 min)
        #[arg(long)]
        quick: bool,

        /// Run without the motion sensor
        #[arg(long)]
        no_motion: bool,
    },

    /// Pause the running session
    Pause,

    /// Resume a paused session
    Resume,

    /// Stop the current session early
    #[command(alias = "end")]
    Stop,

    /// Show current focus session status
    #[command(alias = "st")]
    Status,

    /// List past sessions, newest first
    History {
        /// Number of sessions to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show focus statistics
    #[command(alias = "statistics")]
    Stats {
        /// Number of days to show (default: 7)
        #[arg(default_value = "7")]
        days: u32,
    },
}

// ANSI color codes
const RED: &str = "\x1b[0;31m";
const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[0;33m";
const CYAN: &str = "\x1b[0;36m";
const MAGENTA: &str = "\x1b[0;35m";
const BOLD: &str = "\x1b[1m";
const NC: &str = "\x1b[0m";

/// Check if stdout is a TTY and colors should be used
fn use_colors() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Conditionally apply color
fn color(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{}{}{}", code, text, NC)
    } else {
        text.to_string()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = Paths::new();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_command(&paths, cli.command).await })
}

async fn run_command(paths: &Paths, command: Option<Commands>) -> Result<()> {
    let client = ControlClient::new(paths.socket("focus"));

    match command {
        Some(Commands::Start {
            duration,
            pomodoro,
            deep,
            quick,
            no_motion,
        }) => {
            let choice = choose_session(duration, pomodoro, deep, quick);
            cmd_start(paths, &client, choice, no_motion).await
        }
        Some(Commands::Pause) => cmd_pause(&client).await,
        Some(Commands::Resume) => cmd_resume(&client).await,
        Some(Commands::Stop) => cmd_stop(&client).await,
        Some(Commands::Status) | None => cmd_status(&client).await,
        Some(Commands::History { limit }) => cmd_history(paths, limit),
        Some(Commands::Stats { days }) => cmd_stats(paths, days),
    }
}

/// Explicit length from MINS or a preset flag; None leaves it to the engine
fn choose_session(
    duration: Option<u32>,
    pomodoro: bool,
    deep: bool,
    quick: bool,
) -> Option<(SessionType, u32)> {
    let session_type = if deep {
        SessionType::Deep
    } else if quick {
        SessionType::Quick
    } else if pomodoro {
        SessionType::Pomodoro
    } else if duration.is_some() {
        SessionType::Custom
    } else {
        return None;
    };
    Some((
        session_type,
        duration.unwrap_or_else(|| session_type.default_duration()),
    ))
}

/// Start a session in the foreground, or forward the start to a running one
async fn cmd_start(
    paths: &Paths,
    client: &ControlClient,
    choice: Option<(SessionType, u32)>,
    no_motion: bool,
) -> Result<()> {
    let minutes = choice.map(|(_, m)| m);
    if client.is_listening().await {
        let snapshot = client.start(minutes).await?;
        println!("{} Focus session {}", color(GREEN, "[ok]"), snapshot.status.as_str());
        print_snapshot(&snapshot);
        return Ok(());
    }

    let config = FocusConfig::load(&paths.config_file("focus", "config.json"))?;
    let prefs = FilePreferences::new(&paths.config_file("focus", "preferences.json"));
    if let Some(m) = minutes.filter(|m| *m > 0) {
        if let Err(e) = prefs.remember(m) {
            warn!("Failed to remember duration: {:#}", e);
        }
    }

    let store = FocusStore::new(&paths.state("focus"))?;
    let sensor = if no_motion {
        SensorBackend::Absent
    } else {
        config.sensor_backend()
    };
    let sensor_name = sensor.name();
    let motion = sensor.spawn(config.sensor_poll());
    let notifier = DesktopNotifier::detect(false);

    let (handle, engine) = Engine::spawn(
        config.timings(prefs.remembered_duration()),
        Collaborators {
            sink: Arc::new(store),
            notifier: Arc::new(notifier),
            motion,
        },
    );

    let interrupts = forward_interrupts()?;
    let server = ControlServer::bind(&paths.socket("focus"), handle.clone())?;
    let serving = tokio::spawn(server.serve());

    let started = match handle
        .start(minutes.map(|m| Duration::from_secs(u64::from(m) * 60)))
        .await
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            serving.abort();
            return Err(e.into());
        }
    };

    println!("{} Focus session started", color(GREEN, "[ok]"));
    println!();
    println!("{}", color(&format!("{}{}", BOLD, MAGENTA), "FOCUS MODE"));
    println!();
    println!(
        "  {}  {} minutes",
        color(CYAN, "Duration:"),
        started.planned().as_secs() / 60
    );
    if let Some((session_type, _)) = choice {
        println!("  {}      {}", color(CYAN, "Type:"), session_type.as_str());
    }
    println!("  {}    {}", color(CYAN, "Sensor:"), sensor_name);
    println!("  {}    {}", color(CYAN, "Alerts:"), notifier.backend().name());
    if started.motion == focus::Capability::Absent {
        println!(
            "  {}    {}",
            color(CYAN, "Motion:"),
            color(YELLOW, "no sensor, movement is not detected")
        );
    }
    println!();
    println!("Put the device down. Ctrl-C or 'focus stop' ends early.");
    println!();

    let outcome = watch_session(&handle, engine, interrupts).await;
    serving.abort();
    let _ = serving.await;
    report_outcome(&outcome?);

    Ok(())
}

/// Relay SIGINT for the rest of the process. Interrupts queue until the
/// countdown loop picks them up.
fn forward_interrupts() -> Result<mpsc::Receiver<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                return;
            }
        }
    });
    Ok(rx)
}

/// Render the countdown until the engine tears down. Each interrupt stops
/// the session.
async fn watch_session(
    handle: &EngineHandle,
    mut engine: JoinHandle<EngineOutcome>,
    mut interrupts: mpsc::Receiver<()>,
) -> Result<EngineOutcome> {
    let mut updates = handle.subscribe();
    let mut watching = true;
    let mut shown = String::new();

    loop {
        tokio::select! {
            outcome = &mut engine => {
                println!();
                return Ok(outcome?);
            }
            changed = updates.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let snapshot = *updates.borrow_and_update();
                let line = countdown_line(&snapshot);
                if line != shown {
                    print!("\r{}", line);
                    let _ = std::io::stdout().flush();
                    shown = line;
                }
            }
            Some(()) = interrupts.recv() => {
                if let Err(e) = handle.stop().await {
                    warn!("Stop failed: {}", e);
                }
            }
        }
    }
}

fn countdown_line(snapshot: &Snapshot) -> String {
    let state = match snapshot.status {
        SessionStatus::Running => color(GREEN, "running"),
        SessionStatus::Paused => color(YELLOW, "paused "),
        SessionStatus::Failed => color(RED, "failed "),
        status => status.as_str().to_string(),
    };
    format!(
        "  {} {}  {}",
        format::countdown(snapshot.remaining()),
        progress_bar(snapshot.progress_percent()),
        state
    )
}

fn progress_bar(progress: u32) -> String {
    let bar_width: usize = 30;
    let filled = (bar_width * (progress as usize)) / 100;
    let empty = bar_width - filled;
    format!("[{}{}]", "\u{2588}".repeat(filled), "\u{2591}".repeat(empty))
}

fn report_outcome(outcome: &EngineOutcome) {
    let minutes = outcome.snapshot.planned().as_secs() / 60;
    match outcome.snapshot.status {
        SessionStatus::Succeeded => {
            println!("{} {} minute session complete. Take a break!", color(GREEN, "[ok]"), minutes);
        }
        SessionStatus::Failed => {
            println!("{} {} minute session failed", color(RED, "[fail]"), minutes);
        }
        status => println!("Session ended while {}", status.as_str()),
    }

    if let Some(Err(e)) = &outcome.record {
        println!("{} Session was not saved: {}", color(YELLOW, "[warn]"), e);
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!();
    println!(
        "  {} [{}] {}%",
        color(CYAN, "Progress:"),
        progress_bar(snapshot.progress_percent()),
        snapshot.progress_percent()
    );
    println!(
        "  {} {}",
        color(CYAN, "Remaining:"),
        format::countdown(snapshot.remaining())
    );
    println!("  {}    {}", color(CYAN, "Status:"), snapshot.status.as_str());
}

async fn cmd_pause(client: &ControlClient) -> Result<()> {
    if !client.is_listening().await {
        println!("{} No active focus session", color(CYAN, "[info]"));
        return Ok(());
    }
    let snapshot = client.pause().await?;
    println!("{} Focus session {}", color(GREEN, "[ok]"), snapshot.status.as_str());
    print_snapshot(&snapshot);
    Ok(())
}

async fn cmd_resume(client: &ControlClient) -> Result<()> {
    if !client.is_listening().await {
        println!("{} No paused focus session", color(CYAN, "[info]"));
        return Ok(());
    }
    let snapshot = client.start(None).await?;
    println!("{} Focus session {}", color(GREEN, "[ok]"), snapshot.status.as_str());
    print_snapshot(&snapshot);
    Ok(())
}

async fn cmd_stop(client: &ControlClient) -> Result<()> {
    if !client.is_listening().await {
        println!("{} No active focus session", color(CYAN, "[info]"));
        return Ok(());
    }
    let snapshot = client.stop().await?;
    println!("{} Focus session ended early", color(GREEN, "[ok]"));
    println!("Recorded as failed: {} minutes planned", snapshot.planned().as_secs() / 60);
    Ok(())
}

async fn cmd_status(client: &ControlClient) -> Result<()> {
    if !client.is_listening().await {
        println!("No active focus session");
        println!();
        println!("Start one with: focus start");
        return Ok(());
    }

    let snapshot = client.status().await?;
    println!("{}", color(&format!("{}{}", BOLD, MAGENTA), "FOCUS MODE ACTIVE"));
    print_snapshot(&snapshot);
    if snapshot.motion == focus::Capability::Absent {
        println!("  {}    no sensor", color(CYAN, "Motion:"));
    }
    Ok(())
}

/// List past sessions
fn cmd_history(paths: &Paths, limit: usize) -> Result<()> {
    let store = FocusStore::new(&paths.state("focus"))?;
    let records = store.all_records()?;

    if records.is_empty() {
        println!("No focus sessions recorded yet");
        return Ok(());
    }

    println!("{}Focus History{}", BOLD, NC);
    println!();
    for record in records.iter().take(limit) {
        let mark = if record.completed {
            color(GREEN, "done  ")
        } else {
            color(RED, "failed")
        };
        println!(
            "  {}  {:>3} min  {}",
            mark,
            record.duration_minutes,
            format::relative_time(record.occurred_at)
        );
    }

    Ok(())
}

/// Show focus statistics
fn cmd_stats(paths: &Paths, days: u32) -> Result<()> {
    let store = FocusStore::new(&paths.state("focus"))?;
    let records = store.records_for_days(days)?;
    let stats = FocusStats::from_records(&records);

    let (hours, mins) = stats.total_time();

    println!("{}Focus Statistics (Last {} days){}", BOLD, days, NC);
    println!();
    println!("  {}    {}", color(CYAN, "Total Sessions:"), stats.total_sessions);
    println!(
        "  {}         {} ({}%)",
        color(CYAN, "Completed:"),
        stats.completed_sessions,
        stats.completion_rate
    );
    println!("  {}            {}", color(CYAN, "Failed:"), stats.failed_sessions);
    println!(
        "  {}  {}h {}m",
        color(CYAN, "Total Focus Time:"),
        hours,
        mins
    );

    if stats.completed_sessions > 0 {
        println!();
        println!(
            "  {}   {} minutes",
            color(CYAN, "Average Session:"),
            stats.average_duration
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_with_tty() {
        let result = color(RED, "test");
        assert!(result.contains("test"));
    }

    #[test]
    fn test_choose_session() {
        assert_eq!(choose_session(None, false, false, false), None);
        assert_eq!(
            choose_session(Some(45), false, false, false),
            Some((SessionType::Custom, 45))
        );
        assert_eq!(
            choose_session(None, false, true, false),
            Some((SessionType::Deep, 90))
        );
        assert_eq!(
            choose_session(None, false, false, true),
            Some((SessionType::Quick, 15))
        );
        assert_eq!(
            choose_session(Some(30), true, false, false),
            Some((SessionType::Pomodoro, 30))
        );
    }

    #[tokio::test]
    async fn test_queued_interrupt_stops_session() {
        use focus::notifier::SilentNotifier;
        use focus::recorder::MemorySink;

        let sink = Arc::new(MemorySink::default());
        let (handle, engine) = Engine::spawn(
            focus::EngineTimings::default(),
            Collaborators {
                sink: sink.clone(),
                notifier: Arc::new(SilentNotifier),
                motion: None,
            },
        );
        handle.start(Some(Duration::from_secs(60))).await.unwrap();

        // Delivered before the countdown loop starts polling
        let (tx, interrupts) = mpsc::channel(4);
        tx.send(()).await.unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            watch_session(&handle, engine, interrupts),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(outcome.snapshot.is_failed());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_progress_bar_width() {
        assert_eq!(progress_bar(0).chars().count(), 32);
        assert_eq!(progress_bar(100).chars().count(), 32);
    }
}
