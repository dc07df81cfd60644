//! focus - Motion-guarded focus timer
//!
//! "Put the device down and leave it there."
//!
//! A focus session counts down a chosen length. Moving the device after the
//! grace period fails the session, as does stopping it early. Every session
//! that ends leaves exactly one record behind.
//!
//! Layout:
//! - `machine`: pure session state machine producing effects
//! - `clock`, `motion`: event sources feeding the engine queue
//! - `engine`: single evaluator task plus the `EngineHandle`
//! - `recorder`, `store`: session records and their JSONL logs
//! - `control`: Unix socket for driving a running engine
//! - `config`, `prefs`, `sensor`, `notifier`: collaborators and settings

pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod machine;
pub mod motion;
pub mod notifier;
pub mod prefs;
pub mod recorder;
pub mod sensor;
pub mod session;
pub mod stats;
pub mod store;

pub use config::FocusConfig;
pub use engine::{Collaborators, Engine, EngineHandle, EngineOutcome};
pub use error::{FocusError, FocusResult};
pub use machine::{Command, EngineTimings};
pub use session::{Capability, SessionRecord, SessionStatus, SessionType, Snapshot};
pub use stats::FocusStats;
pub use store::FocusStore;
