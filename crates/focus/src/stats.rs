//! Focus statistics calculation
//!
//! Aggregates session records into what the history screen shows:
//! - Completed and failed counts
//! - Focus time from completed sessions
//! - Completion rate

use crate::session::SessionRecord;

/// Aggregated focus statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusStats {
    /// Total number of sessions
    pub total_sessions: u32,
    /// Sessions whose countdown reached zero
    pub completed_sessions: u32,
    /// Sessions stopped early or disturbed
    pub failed_sessions: u32,
    /// Focus time in minutes, completed sessions only
    pub total_minutes: u32,
    /// Completion rate as percentage (0-100)
    pub completion_rate: u32,
    /// Average completed session length in minutes
    pub average_duration: u32,
}

impl FocusStats {
    /// Calculate statistics from a list of session records
    pub fn from_records(records: &[SessionRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let total_sessions = records.len() as u32;
        let completed_sessions = records.iter().filter(|r| r.completed).count() as u32;
        let total_minutes: u32 = records
            .iter()
            .filter(|r| r.completed)
            .map(|r| r.duration_minutes)
            .sum();

        let average_duration = if completed_sessions > 0 {
            total_minutes / completed_sessions
        } else {
            0
        };

        Self {
            total_sessions,
            completed_sessions,
            failed_sessions: total_sessions - completed_sessions,
            total_minutes,
            completion_rate: (completed_sessions * 100) / total_sessions,
            average_duration,
        }
    }

    /// Get total hours and minutes as a tuple
    pub fn total_time(&self) -> (u32, u32) {
        let hours = self.total_minutes / 60;
        let mins = self.total_minutes % 60;
        (hours, mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_record(duration_minutes: u32, completed: bool) -> SessionRecord {
        SessionRecord {
            duration_minutes,
            occurred_at: Utc::now(),
            completed,
        }
    }

    #[test]
    fn test_empty_stats() {
        let stats = FocusStats::from_records(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_minutes, 0);
        assert_eq!(stats.completion_rate, 0);
    }

    #[test]
    fn test_stats_calculation() {
        let records = vec![
            make_record(25, true),
            make_record(25, true),
            make_record(15, false),
            make_record(45, true),
        ];

        let stats = FocusStats::from_records(&records);
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.completed_sessions, 3);
        assert_eq!(stats.failed_sessions, 1);
        assert_eq!(stats.total_minutes, 95); // failed session not counted
        assert_eq!(stats.completion_rate, 75);
        assert_eq!(stats.average_duration, 31);
    }

    #[test]
    fn test_all_failed() {
        let stats = FocusStats::from_records(&[make_record(25, false)]);
        assert_eq!(stats.failed_sessions, 1);
        assert_eq!(stats.total_minutes, 0);
        assert_eq!(stats.average_duration, 0);
        assert_eq!(stats.completion_rate, 0);
    }

    #[test]
    fn test_total_time() {
        let records = vec![make_record(90, true), make_record(45, true)];

        let stats = FocusStats::from_records(&records);
        assert_eq!(stats.total_time(), (2, 15));
    }
}
