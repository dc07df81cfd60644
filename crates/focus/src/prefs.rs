//! Remembered user preferences
//!
//! Only the last explicitly chosen session length is kept. The engine reads
//! it once, when it works out the fallback for a start without a duration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Source of the remembered session length
pub trait PreferenceStore: Send + Sync {
    fn remembered_duration(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Preferences kept in a small JSON file
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read preferences: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse preferences: {}", self.path.display()))
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write preferences: {}", self.path.display()))
    }

    /// Remember an explicitly chosen length
    pub fn remember(&self, minutes: u32) -> Result<()> {
        self.save(&Preferences {
            duration_minutes: Some(minutes),
        })
    }
}

impl PreferenceStore for FilePreferences {
    fn remembered_duration(&self) -> Option<Duration> {
        match self.load() {
            Ok(prefs) => prefs
                .duration_minutes
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(u64::from(m) * 60)),
            Err(e) => {
                warn!("Ignoring preferences: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nothing_remembered() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::new(&dir.path().join("preferences.json"));
        assert_eq!(prefs.remembered_duration(), None);
    }

    #[test]
    fn test_remember_round_trip() {
        let dir = TempDir::new().unwrap();
        let prefs = FilePreferences::new(&dir.path().join("focus").join("preferences.json"));
        prefs.remember(45).unwrap();
        assert_eq!(prefs.remembered_duration(), Some(Duration::from_secs(45 * 60)));
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(FilePreferences::new(&path).remembered_duration(), None);
    }
}
