//! Focus session storage
//!
//! Persists finished session records as daily JSON-lines logs:
//! - Session logs: ~/.local/share/daedalos/focus/sessions-YYYY-MM-DD.jsonl
//!
//! Records are only ever appended; nothing here rewrites or deletes them.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{FocusError, FocusResult};
use crate::recorder::SessionSink;
use crate::session::SessionRecord;

/// Focus session store
pub struct FocusStore {
    /// Base directory for focus data
    data_dir: PathBuf,
}

impl FocusStore {
    /// Create a new focus store with the given data directory
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create focus data directory: {}", data_dir.display())
        })?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the path to the session log for a specific date
    fn session_log_path(&self, date: &NaiveDate) -> PathBuf {
        self.data_dir.join(format!("sessions-{}.jsonl", date))
    }

    /// Append a finished session to the log for the day it ended
    pub fn record_session(&self, record: &SessionRecord) -> Result<()> {
        let date = record.occurred_at.date_naive();
        let path = self.session_log_path(&date);

        let line = serde_json::to_string(record).context("Failed to serialize session record")?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open session log: {}", path.display()))?;

        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write to session log: {}", path.display()))?;
        file.sync_data()
            .with_context(|| format!("Failed to sync session log: {}", path.display()))
    }

    /// Get all records for a specific date
    pub fn records_for_date(&self, date: &NaiveDate) -> Result<Vec<SessionRecord>> {
        let path = self.session_log_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_log(&path)
    }

    /// Get all records for the last N days, oldest first
    pub fn records_for_days(&self, days: u32) -> Result<Vec<SessionRecord>> {
        let today = Utc::now().date_naive();
        let mut records = Vec::new();

        for i in 0..days {
            let date = today - chrono::Duration::days(i as i64);
            records.extend(self.records_for_date(&date)?);
        }

        records.sort_by_key(|r| r.occurred_at);
        Ok(records)
    }

    /// Every stored record, newest first
    pub fn all_records(&self) -> Result<Vec<SessionRecord>> {
        let mut records = Vec::new();

        let entries = fs::read_dir(&self.data_dir).with_context(|| {
            format!("Failed to list focus data directory: {}", self.data_dir.display())
        })?;
        for entry in entries {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("sessions-") && n.ends_with(".jsonl"))
                .unwrap_or(false);
            if is_log {
                records.extend(Self::read_log(&path)?);
            }
        }

        records.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(records)
    }

    fn read_log(path: &Path) -> Result<Vec<SessionRecord>> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open session log: {}", path.display()))?;

        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("Failed to read line {} of session log", line_num + 1)
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Skip a torn or hand-edited line rather than losing the day
                    warn!(
                        "Failed to parse session on line {} of {}: {}",
                        line_num + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(records)
    }
}

impl SessionSink for FocusStore {
    fn append(&self, record: &SessionRecord) -> FocusResult<()> {
        self.record_session(record)
            .map_err(|e| FocusError::Persistence(format!("{:#}", e)))
    }
}
