//! Watch progress tracking.
//!
//! One record per media id, kept in memory and written through to a [`KeyValueStore`]
//! after every change. A failed write is logged and otherwise ignored: the in-memory
//! record stays authoritative for the running session.

use crate::db::KeyValueStore;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Key under which all records are stored.
pub const PROGRESS_KEY: &str = "watch-progress";

/// Fraction of the duration after which an item counts as watched.
pub const COMPLETION_RATIO: f64 = 0.9;

/// Playback state of one media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchProgress {
    /// Media id; the item may no longer exist.
    pub media_id: String,
    /// Playback position in seconds.
    pub current_time: f64,
    /// Total duration in seconds.
    pub duration: f64,
    /// Position reached 90% of the duration.
    pub completed: bool,
    /// First time any progress was recorded.
    pub first_watched_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

/// Whether `current_time` counts as finished for `duration`.
pub fn is_completed(current_time: f64, duration: f64) -> bool {
    current_time >= duration * COMPLETION_RATIO
}

/// Aggregate numbers over all records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchStats {
    /// Completed records.
    pub watched_items: usize,
    /// Records still in progress.
    pub in_progress_items: usize,
    /// Sum of playback positions in seconds.
    pub total_watch_time: f64,
}

/// In-memory progress records backed by a key-value store.
pub struct WatchProgressStore {
    records: HashMap<String, WatchProgress>,
    store: Arc<dyn KeyValueStore>,
}

impl WatchProgressStore {
    /// Load existing records from `store`.
    ///
    /// A missing key starts empty; an unreadable or corrupt value is logged and also starts
    /// empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let records = match store.get(PROGRESS_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<WatchProgress>>(&json) {
                Ok(list) => list
                    .into_iter()
                    .map(|p| (p.media_id.clone(), p))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding corrupt watch progress");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load watch progress");
                HashMap::new()
            }
        };

        tracing::debug!(records = records.len(), "Loaded watch progress");
        Self { records, store }
    }

    /// Record a playback position now.
    pub fn update(
        &mut self,
        media_id: &str,
        current_time: f64,
        duration: f64,
    ) -> Result<WatchProgress> {
        self.update_at(media_id, current_time, duration, Utc::now())
    }

    /// Record a playback position at a given time.
    pub fn update_at(
        &mut self,
        media_id: &str,
        current_time: f64,
        duration: f64,
        now: DateTime<Utc>,
    ) -> Result<WatchProgress> {
        if media_id.is_empty() {
            return Err(AppError::InvalidInput("media id is empty".to_string()));
        }
        for (name, value) in [("current_time", current_time), ("duration", duration)] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let first_watched_at = self
            .records
            .get(media_id)
            .map(|p| p.first_watched_at)
            .unwrap_or(now);

        let progress = WatchProgress {
            media_id: media_id.to_string(),
            current_time,
            duration,
            completed: is_completed(current_time, duration),
            first_watched_at,
            updated_at: now,
        };

        self.records.insert(media_id.to_string(), progress.clone());
        self.persist();
        Ok(progress)
    }

    /// Mark an item as fully watched.
    pub fn mark_completed(&mut self, media_id: &str, duration: f64) -> Result<WatchProgress> {
        self.update(media_id, duration, duration)
    }

    /// Progress for one item.
    pub fn get(&self, media_id: &str) -> Option<&WatchProgress> {
        self.records.get(media_id)
    }

    /// All records, most recently updated first.
    pub fn all(&self) -> Vec<WatchProgress> {
        let mut records: Vec<WatchProgress> = self.records.values().cloned().collect();
        sort_recent_first(&mut records);
        records
    }

    /// Unfinished records, most recently updated first.
    pub fn continue_watching(&self, limit: usize) -> Vec<WatchProgress> {
        let mut records: Vec<WatchProgress> = self
            .records
            .values()
            .filter(|p| !p.completed)
            .cloned()
            .collect();
        sort_recent_first(&mut records);
        records.truncate(limit);
        records
    }

    /// All records, most recently updated first.
    pub fn recently_watched(&self, limit: usize) -> Vec<WatchProgress> {
        let mut records = self.all();
        records.truncate(limit);
        records
    }

    /// Forget one item. Returns the removed record.
    pub fn remove(&mut self, media_id: &str) -> Option<WatchProgress> {
        let removed = self.records.remove(media_id);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.records.clear();
        self.persist();
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Completed/in-progress counts and total watch time.
    pub fn stats(&self) -> WatchStats {
        self.records
            .values()
            .fold(WatchStats::default(), |mut stats, p| {
                if p.completed {
                    stats.watched_items += 1;
                } else {
                    stats.in_progress_items += 1;
                }
                stats.total_watch_time += p.current_time;
                stats
            })
    }

    fn persist(&self) {
        let records = self.all();
        let result = serde_json::to_string(&records)
            .map_err(AppError::from)
            .and_then(|json| self.store.put(PROGRESS_KEY, &json));

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                records = records.len(),
                "Failed to persist watch progress"
            );
        }
    }
}

fn sort_recent_first(records: &mut [WatchProgress]) {
    records.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.media_id.cmp(&b.media_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;

    fn store() -> WatchProgressStore {
        WatchProgressStore::load(Arc::new(Database::open_memory().unwrap()))
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(AppError::Internal("disk full".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_completion_boundary() {
        assert!(is_completed(5400.0, 6000.0));
        assert!(!is_completed(5399.9, 6000.0));
        assert!(is_completed(0.0, 0.0));
    }

    #[test]
    fn test_first_watched_preserved() {
        let mut progress = store();
        let t0 = Utc::now();
        let first = progress.update_at("a", 10.0, 100.0, t0).unwrap();
        let second = progress
            .update_at("a", 50.0, 100.0, t0 + Duration::seconds(30))
            .unwrap();

        assert_eq!(first.first_watched_at, t0);
        assert_eq!(second.first_watched_at, t0);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(progress.len(), 1);
    }

    #[test]
    fn test_continue_watching_excludes_completed() {
        let mut progress = store();
        let t0 = Utc::now();
        progress.update_at("done", 95.0, 100.0, t0).unwrap();
        progress
            .update_at("older", 10.0, 100.0, t0 + Duration::seconds(1))
            .unwrap();
        progress
            .update_at("newer", 20.0, 100.0, t0 + Duration::seconds(2))
            .unwrap();

        let ids: Vec<_> = progress
            .continue_watching(10)
            .into_iter()
            .map(|p| p.media_id)
            .collect();
        assert_eq!(ids, vec!["newer", "older"]);

        let ids: Vec<_> = progress
            .recently_watched(2)
            .into_iter()
            .map(|p| p.media_id)
            .collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut progress = store();
        assert!(progress.update("a", -1.0, 100.0).is_err());
        assert!(progress.update("a", 1.0, f64::NAN).is_err());
        assert!(progress.update("", 1.0, 2.0).is_err());
        assert!(progress.is_empty());
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let mut progress = WatchProgressStore::load(Arc::new(BrokenStore));
        let record = progress.update("a", 30.0, 60.0).unwrap();
        assert_eq!(progress.get("a"), Some(&record));
    }

    #[test]
    fn test_reload_from_store() {
        let db = Arc::new(Database::open_memory().unwrap());
        {
            let mut progress = WatchProgressStore::load(db.clone());
            progress.update("a", 30.0, 60.0).unwrap();
            progress.mark_completed("b", 120.0).unwrap();
        }

        let progress = WatchProgressStore::load(db);
        assert_eq!(progress.len(), 2);
        assert!(progress.get("b").unwrap().completed);
        assert_eq!(progress.get("a").unwrap().current_time, 30.0);
    }

    #[test]
    fn test_corrupt_value_starts_empty() {
        let db = Arc::new(Database::open_memory().unwrap());
        db.put(PROGRESS_KEY, "not json").unwrap();
        let progress = WatchProgressStore::load(db);
        assert!(progress.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut progress = store();
        progress.update("a", 1.0, 10.0).unwrap();
        progress.update("b", 1.0, 10.0).unwrap();

        assert!(progress.remove("a").is_some());
        assert!(progress.remove("a").is_none());
        progress.clear();
        assert!(progress.is_empty());
    }

    #[test]
    fn test_stats() {
        let mut progress = store();
        progress.update("a", 95.0, 100.0).unwrap();
        progress.update("b", 5.0, 100.0).unwrap();

        let stats = progress.stats();
        assert_eq!(stats.watched_items, 1);
        assert_eq!(stats.in_progress_items, 1);
        assert_eq!(stats.total_watch_time, 100.0);
    }
}
