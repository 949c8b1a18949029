//! Client-side record of requested movies.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::api::CompletedStatus;
use crate::error::StorageError;
use crate::worker::job::MovieStatus;

const HISTORY_FILE: &str = "movie-history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub token: String,
    pub date_requested: DateTime<Utc>,
    pub status: MovieStatus,
    pub progress: f64,
    /// Display name used in notifications, e.g. `AIA 171`.
    pub name: String,
    #[serde(default)]
    pub eta_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<CompletedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        id: impl Into<String>,
        token: impl Into<String>,
        date_requested: DateTime<Utc>,
        name: impl Into<String>,
        eta_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            date_requested,
            status: MovieStatus::Queued,
            progress: 0.0,
            name: name.into(),
            eta_seconds,
            completed: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Newest-first list of requested movies, bounded by `limit`.
#[derive(Debug, Clone)]
pub struct MovieHistory {
    entries: Vec<HistoryEntry>,
    limit: usize,
    path: Option<PathBuf>,
}

impl MovieHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: limit.max(1),
            path: None,
        }
    }

    /// `<data dir>/heliomovie/movie-history.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("heliomovie").join(HISTORY_FILE))
    }

    /// Loads the history saved at `path`. A missing file yields an empty
    /// history that will be saved there.
    pub fn load<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut history = Self::new(limit);
        history.path = Some(path.to_path_buf());

        if !path.exists() {
            debug!("No movie history at {}", path.display());
            return Ok(history);
        }

        let content = fs::read_to_string(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut entries: Vec<HistoryEntry> =
            serde_json::from_str(&content).map_err(|e| StorageError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        entries.sort_by(|a, b| b.date_requested.cmp(&a.date_requested));
        entries.truncate(history.limit);
        history.entries = entries;
        Ok(history)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the history to `path` as JSON.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            StorageError::Serialize {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        fs::write(path, json).map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Saves to the path the history was loaded from. In-memory histories
    /// are left alone.
    pub fn save(&self) -> Result<(), StorageError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    /// Saves and logs failures.
    pub fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save movie history: {}", e);
        }
    }

    /// Adds an entry at the front, replacing any entry with the same id.
    /// The oldest entries are dropped beyond the limit.
    pub fn add(&mut self, entry: HistoryEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.insert(0, entry);
        self.entries.truncate(self.limit);
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Removes a movie. A monitor for it stops at its next wake-up.
    pub fn remove(&mut self, id: &str) -> Option<HistoryEntry> {
        let position = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(position))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut HistoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Caches a non-terminal status. Finished entries are not touched.
    pub fn update_status(&mut self, id: &str, status: MovieStatus, progress: f64) -> bool {
        match self.get_mut(id) {
            Some(entry) if !entry.is_finished() => {
                entry.status = status;
                entry.progress = progress.clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }

    pub fn record_completed(&mut self, id: &str, completed: CompletedStatus) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.status = MovieStatus::Completed;
                entry.progress = 1.0;
                entry.completed = Some(completed);
                entry.error = None;
                true
            }
            None => false,
        }
    }

    pub fn record_failed(&mut self, id: &str, error: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.status = MovieStatus::Error;
                entry.error = Some(error.into());
                true
            }
            None => false,
        }
    }

    /// Entries still queued or processing.
    pub fn unfinished(&self) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_finished())
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn entry(id: &str, minutes: i64) -> HistoryEntry {
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        HistoryEntry::new(id, format!("{}-token", id), date, "AIA 171", 10)
    }

    #[test]
    fn test_add_is_newest_first_and_bounded() {
        let mut history = MovieHistory::new(2);
        history.add(entry("a", 0));
        history.add(entry("b", 1));
        history.add(entry("c", 2));

        let ids: Vec<&str> = history.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_add_replaces_same_id() {
        let mut history = MovieHistory::new(10);
        history.add(entry("a", 0));
        history.add(entry("a", 5));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_terminal_entries_keep_their_status() {
        let mut history = MovieHistory::new(10);
        history.add(entry("a", 0));
        assert!(history.record_failed("a", "not enough images"));
        assert!(!history.update_status("a", MovieStatus::Processing, 0.5));
        assert_eq!(history.get("a").unwrap().status, MovieStatus::Error);
        assert!(history.unfinished().is_empty());
    }

    #[test]
    fn test_remove() {
        let mut history = MovieHistory::new(10);
        history.add(entry("a", 0));
        assert!(history.remove("a").is_some());
        assert!(!history.contains("a"));
        assert!(history.remove("a").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(HISTORY_FILE);

        let mut history = MovieHistory::load(&path, 10).unwrap();
        assert!(history.is_empty());
        history.add(entry("a", 0));
        history.add(entry("b", 1));
        history.update_status("b", MovieStatus::Processing, 0.25);
        history.save().unwrap();

        let loaded = MovieHistory::load(&path, 10).unwrap();
        assert_eq!(loaded.entries(), history.entries());
        assert_eq!(loaded.unfinished().len(), 2);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        fs::write(&path, "not json").unwrap();

        let err = MovieHistory::load(&path, 10).unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));
    }
}
