//! Session recorder
//!
//! Turns a terminal session into a `SessionRecord` and hands it to the
//! persistence collaborator on a blocking worker. The worker owns its copy
//! of the record, so the write completes even if the engine has already
//! torn down. Failures are logged and surfaced as an alert; nothing is
//! retried and the session outcome stands either way.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{FocusError, FocusResult};
use crate::notifier::{Alert, Notifier};
use crate::session::{Session, SessionRecord};

/// Durable, append-only destination for session records
pub trait SessionSink: Send + Sync {
    fn append(&self, record: &SessionRecord) -> FocusResult<()>;
}

/// In-flight record write
pub type PendingWrite = JoinHandle<FocusResult<SessionRecord>>;

pub struct SessionRecorder {
    sink: Arc<dyn SessionSink>,
    notifier: Arc<dyn Notifier>,
}

impl SessionRecorder {
    pub fn new(sink: Arc<dyn SessionSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self { sink, notifier }
    }

    /// Build the record for `session` and dispatch the write
    pub fn record(&self, session: &Session, completed: bool) -> PendingWrite {
        let record = SessionRecord::from_session(session, completed);
        let sink = Arc::clone(&self.sink);
        let notifier = Arc::clone(&self.notifier);

        tokio::task::spawn_blocking(move || match sink.append(&record) {
            Ok(()) => {
                info!(
                    minutes = record.duration_minutes,
                    completed = record.completed,
                    "Session recorded"
                );
                Ok(record)
            }
            Err(e) => {
                warn!("Session record lost: {}", e);
                let alert = Alert::RecordNotSaved {
                    error: e.to_string(),
                };
                if let Err(notify_err) = notifier.notify(&alert) {
                    warn!("Failed to send notification: {:#}", notify_err);
                }
                Err(e)
            }
        })
    }
}

/// Keeps records in memory (embedding and tests)
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl SessionSink for MemorySink {
    fn append(&self, record: &SessionRecord) -> FocusResult<()> {
        self.records
            .lock()
            .map_err(|_| FocusError::Persistence("record buffer poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}
