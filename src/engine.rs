//! The library engine: single owner of the index, search and progress state.
//!
//! Hosts call into [`Engine`] for every command and query. Mutating calls take `&mut self`;
//! a host sharing the engine between threads wraps it in a lock.

use crate::config::Config;
use crate::db::{self, KeyValueStore};
use crate::error::{AppError, Result};
use crate::fs::{
    self, ChangeNotifier, LocalFs, MediaSource, NoopNotifier, NotifyWatcher, Subscription,
    WatchEvent, WatchEventKind,
};
use crate::library::{LibraryIndex, LibraryStats, LibraryView, MediaItem, SearchHit, SearchIndex};
use crate::progress::{WatchProgress, WatchProgressStore, WatchStats};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default number of entries for the "continue watching" style lists.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Threads used to stat and parse files during a scan.
    pub workers: usize,
    /// Maximum search distance.
    pub search_threshold: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            search_threshold: 0.3,
        }
    }
}

impl EngineOptions {
    /// Take the relevant values from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.scan.workers.max(1),
            search_threshold: config.search.threshold,
        }
    }
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Items in the index after the scan.
    pub indexed: usize,
    /// Candidate files that failed validation.
    pub rejected: usize,
    /// Entries the walker could not read.
    pub skipped: usize,
}

/// A media item joined with its progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedItem {
    /// The media item.
    pub item: MediaItem,
    /// Its progress.
    pub progress: WatchProgress,
}

/// Resolved roots of a scan in progress, detached from the engine.
pub struct ScanJob {
    roots: Vec<PathBuf>,
    source: Arc<dyn MediaSource>,
    workers: usize,
    started: Instant,
}

/// What a [`ScanJob`] found, ready for [`Engine::finish_scan`].
pub struct CollectedScan {
    roots: Vec<PathBuf>,
    started: Instant,
    result: Result<(Vec<MediaItem>, ScanSummary)>,
}

impl ScanJob {
    /// Absolute roots being scanned.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Walk every root, then stat and parse the candidates.
    pub fn collect(self, cancel: Option<&CancellationToken>) -> CollectedScan {
        let result = self.walk_and_admit(cancel);
        CollectedScan {
            roots: self.roots,
            started: self.started,
            result,
        }
    }

    fn walk_and_admit(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Vec<MediaItem>, ScanSummary)> {
        let mut summary = ScanSummary::default();
        let mut candidates = Vec::new();

        for root in &self.roots {
            tracing::info!(path = %root.display(), "Scanning library root");
            let report = self.source.walk(root, cancel)?;
            if report.cancelled {
                return Err(AppError::Cancelled);
            }
            summary.skipped += report.skipped;
            candidates.extend(report.files);
        }

        tracing::info!(files = candidates.len(), "Found files to process");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build scan pool: {}", e)))?;

        let source = self.source.as_ref();
        let admitted: Vec<Option<MediaItem>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|path| match fs::admit(source, path) {
                    Ok(item) => Some(item),
                    Err(reason) => {
                        tracing::debug!(path = %path.display(), %reason, "Excluding file");
                        None
                    }
                })
                .collect()
        });

        summary.rejected = admitted.iter().filter(|i| i.is_none()).count();
        Ok((admitted.into_iter().flatten().collect(), summary))
    }
}

/// Library engine.
pub struct Engine {
    options: EngineOptions,
    source: Arc<dyn MediaSource>,
    notifier: Arc<dyn ChangeNotifier>,
    index: LibraryIndex,
    search: SearchIndex,
    progress: WatchProgressStore,
    roots: Vec<PathBuf>,
    subscription: Option<Box<dyn Subscription>>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<WatchEvent>>,
}

impl Engine {
    /// Create an engine from its collaborators.
    pub fn new(
        options: EngineOptions,
        source: Arc<dyn MediaSource>,
        notifier: Arc<dyn ChangeNotifier>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let search = SearchIndex::empty(options.search_threshold);

        Self {
            options,
            source,
            notifier,
            index: LibraryIndex::new(),
            search,
            progress: WatchProgressStore::load(store),
            roots: Vec::new(),
            subscription: None,
            generation: 0,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Create an engine for the local filesystem as configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let notifier: Arc<dyn ChangeNotifier> = if config.library.watch {
            Arc::new(NotifyWatcher)
        } else {
            Arc::new(NoopNotifier)
        };

        Ok(Self::new(
            EngineOptions::from_config(config),
            Arc::new(LocalFs),
            notifier,
            db::open_store(&config.storage)?,
        ))
    }

    // ========== SCANNING AND WATCHING ==========

    /// Rescan `roots` from scratch, replace the index and watch the roots for changes.
    pub fn scan_library(&mut self, roots: &[PathBuf]) -> Result<ScanSummary> {
        self.scan_library_with_cancel(roots, None)
    }

    /// Like [`Engine::scan_library`], stopping early when `cancel` fires.
    ///
    /// A cancelled or failed scan leaves the previous index in place and resumes watching
    /// the previous roots.
    pub fn scan_library_with_cancel(
        &mut self,
        roots: &[PathBuf],
        cancel: Option<&CancellationToken>,
    ) -> Result<ScanSummary> {
        let job = self.begin_scan(roots)?;
        let collected = job.collect(cancel);
        self.finish_scan(collected)
    }

    /// Stop watching and resolve `roots` for a scan that runs without the engine.
    ///
    /// Hand the job's [`ScanJob::collect`] result to [`Engine::finish_scan`]. Until then
    /// queries see the previous index and watch events are dropped.
    pub fn begin_scan(&mut self, roots: &[PathBuf]) -> Result<ScanJob> {
        let started = Instant::now();
        self.stop_watching();

        match absolute_roots(roots) {
            Ok(roots) => Ok(ScanJob {
                roots,
                source: self.source.clone(),
                workers: self.options.workers,
                started,
            }),
            Err(e) => {
                self.resume_watching();
                Err(e)
            }
        }
    }

    /// Install the result of a scan started with [`Engine::begin_scan`] and watch again.
    pub fn finish_scan(&mut self, collected: CollectedScan) -> Result<ScanSummary> {
        let (items, mut summary) = match collected.result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Scan failed, keeping previous library");
                self.resume_watching();
                return Err(e);
            }
        };

        self.index.apply_full_scan(items);
        self.rebuild_search();
        self.roots = collected.roots;
        summary.indexed = self.index.len();

        self.resume_watching();

        tracing::info!(
            indexed = summary.indexed,
            rejected = summary.rejected,
            skipped = summary.skipped,
            elapsed = ?collected.started.elapsed(),
            "Full scan complete"
        );

        Ok(summary)
    }

    /// Detach the current watch subscription, if any.
    pub fn stop_watching(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::info!(roots = ?subscription.roots(), "Stopped watching");
        }
    }

    /// Watch the current roots under a new generation.
    fn resume_watching(&mut self) {
        if self.roots.is_empty() {
            return;
        }

        self.generation += 1;
        match self
            .notifier
            .subscribe(&self.roots, self.generation, self.events_tx.clone())
        {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => tracing::warn!(error = %e, "Failed to watch library roots"),
        }
    }

    /// Whether a watch subscription is active.
    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    /// Generation of the active subscription.
    pub fn watch_generation(&self) -> u64 {
        self.generation
    }

    /// Roots of the last successful scan.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Take the receiving end of the watch event queue.
    ///
    /// The host drains it and feeds each event to [`Engine::apply_event`]. Returns `None`
    /// once taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WatchEvent>> {
        self.events_rx.take()
    }

    /// Apply every queued event, if the queue has not been taken. Returns how many ran.
    pub fn pump_events(&mut self) -> usize {
        let Some(rx) = self.events_rx.as_mut() else {
            return 0;
        };

        let mut pending = Vec::new();
        while let Ok(event) = rx.try_recv() {
            pending.push(event);
        }

        let count = pending.len();
        for event in pending {
            self.apply_event(event);
        }
        count
    }

    /// Apply one incremental change. Returns whether the index changed.
    ///
    /// Events from an older subscription are ignored; the scan that replaced it already
    /// observed their effect.
    pub fn apply_event(&mut self, event: WatchEvent) -> bool {
        if event.generation != self.generation || self.subscription.is_none() {
            tracing::debug!(?event, current = self.generation, "Ignoring stale watch event");
            return false;
        }

        let changed = match event.kind {
            WatchEventKind::Added | WatchEventKind::Changed
                if self.source.stat(&event.path).is_ok_and(|s| s.is_dir) =>
            {
                self.index_directory(&event.path)
            }
            WatchEventKind::Added | WatchEventKind::Changed => self.index_file(&event.path),
            WatchEventKind::Removed => {
                let removed = self.index.remove(&event.path);
                if removed > 0 {
                    tracing::info!(path = %event.path.display(), removed, "Removed from library");
                }
                removed > 0
            }
        };

        if changed {
            self.rebuild_search();
        }
        changed
    }

    fn index_file(&mut self, path: &Path) -> bool {
        match fs::admit(self.source.as_ref(), path) {
            Ok(item) => {
                tracing::info!(path = %path.display(), title = %item.title, "Indexed file");
                self.upsert_preserving_metadata(item);
                true
            }
            Err(reason) => {
                tracing::debug!(path = %path.display(), %reason, "Excluding file");
                self.index.remove(path) > 0
            }
        }
    }

    /// Index every file below a directory that appeared or moved in.
    fn index_directory(&mut self, dir: &Path) -> bool {
        let report = match self.source.walk(dir, None) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read new directory");
                return false;
            }
        };

        let mut indexed = 0;
        for path in &report.files {
            match fs::admit(self.source.as_ref(), path) {
                Ok(item) => {
                    self.upsert_preserving_metadata(item);
                    indexed += 1;
                }
                Err(reason) => {
                    tracing::debug!(path = %path.display(), %reason, "Excluding file");
                }
            }
        }

        if indexed > 0 {
            tracing::info!(path = %dir.display(), indexed, "Indexed directory");
        }
        indexed > 0
    }

    /// Keep host-supplied duration and thumbnail across a re-read of the same file.
    fn upsert_preserving_metadata(&mut self, mut item: MediaItem) {
        if let Some(existing) = self.index.get(&item.id) {
            item.duration = item.duration.or(existing.duration);
            item.thumbnail = item.thumbnail.take().or_else(|| existing.thumbnail.clone());
        }
        self.index.upsert(item);
    }

    fn rebuild_search(&mut self) {
        self.search = SearchIndex::build(self.index.items(), self.options.search_threshold);
    }

    // ========== LIBRARY QUERIES ==========

    /// Movies and series.
    pub fn library(&self) -> LibraryView {
        self.index
            .view(|id| self.progress.get(id).map(|p| p.updated_at))
    }

    /// Library totals.
    pub fn stats(&self) -> LibraryStats {
        self.index.stats()
    }

    /// Fuzzy search over titles and series names.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search.search(query)
    }

    /// Look up one item.
    pub fn get_by_id(&self, id: &str) -> Option<MediaItem> {
        self.index.get(id).cloned()
    }

    /// Newest files first.
    pub fn recently_added(&self, limit: usize) -> Vec<MediaItem> {
        self.index.recently_added(limit)
    }

    /// Record a duration reported by a player.
    pub fn set_duration(&mut self, id: &str, seconds: f64) -> Result<MediaItem> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "duration must be a non-negative number, got {}",
                seconds
            )));
        }
        let item = self
            .index
            .get(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?
            .with_duration(seconds);
        self.index.upsert(item.clone());
        self.rebuild_search();
        Ok(item)
    }

    /// Attach a generated thumbnail.
    pub fn set_thumbnail(&mut self, id: &str, thumbnail: &Path) -> Result<MediaItem> {
        let item = self
            .index
            .get(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?
            .with_thumbnail(thumbnail.to_path_buf());
        self.index.upsert(item.clone());
        self.rebuild_search();
        Ok(item)
    }

    // ========== WATCH PROGRESS ==========

    /// Record a playback position.
    pub fn update_watch_progress(
        &mut self,
        media_id: &str,
        current_time: f64,
        duration: f64,
    ) -> Result<WatchProgress> {
        self.progress.update(media_id, current_time, duration)
    }

    /// Mark an item as watched, using its known duration.
    pub fn mark_completed(&mut self, media_id: &str) -> Result<WatchProgress> {
        let item = self
            .index
            .get(media_id)
            .ok_or_else(|| AppError::NotFound(media_id.to_string()))?;
        let duration = item
            .duration
            .or_else(|| self.progress.get(media_id).map(|p| p.duration))
            .ok_or_else(|| {
                AppError::InvalidInput(format!("duration of {} is not known yet", media_id))
            })?;
        self.progress.mark_completed(media_id, duration)
    }

    /// Progress for one item.
    pub fn watch_progress(&self, media_id: &str) -> Option<WatchProgress> {
        self.progress.get(media_id).cloned()
    }

    /// Forget the progress of one item.
    pub fn remove_watch_progress(&mut self, media_id: &str) -> Option<WatchProgress> {
        self.progress.remove(media_id)
    }

    /// Forget all progress.
    pub fn clear_watch_progress(&mut self) {
        self.progress.clear();
    }

    /// Unfinished items, most recently watched first.
    pub fn continue_watching(&self, limit: usize) -> Vec<WatchedItem> {
        self.join(self.progress.continue_watching(usize::MAX), limit)
    }

    /// Watched items, finished or not, most recent first.
    pub fn recently_watched(&self, limit: usize) -> Vec<WatchedItem> {
        self.join(self.progress.recently_watched(usize::MAX), limit)
    }

    /// Completion counts and total watch time.
    pub fn watch_stats(&self) -> WatchStats {
        self.progress.stats()
    }

    /// Pair records with their items, skipping records whose item is gone.
    fn join(&self, records: Vec<WatchProgress>, limit: usize) -> Vec<WatchedItem> {
        records
            .into_iter()
            .filter_map(|progress| {
                self.index.get(&progress.media_id).map(|item| WatchedItem {
                    item: item.clone(),
                    progress,
                })
            })
            .take(limit)
            .collect()
    }
}

fn absolute_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if roots.is_empty() {
        return Err(AppError::InvalidInput("no library roots given".to_string()));
    }

    let mut absolute = Vec::with_capacity(roots.len());
    for root in roots {
        let path = std::path::absolute(root)
            .map_err(|e| AppError::RootUnavailable(format!("{}: {}", root.display(), e)))?;
        if !absolute.contains(&path) {
            absolute.push(path);
        }
    }
    Ok(absolute)
}
