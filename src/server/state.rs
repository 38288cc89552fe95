//! Application state shared across handlers.

use crate::config::Config;
use crate::engine::{Engine, ScanSummary};
use crate::error::Result;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// The library engine; every call goes through this lock. Scans release it while
    /// walking.
    pub engine: Arc<Mutex<Engine>>,
    /// Roots scanned by `scan_all_libraries`.
    roots: Arc<Vec<PathBuf>>,
    /// Whether a scan is currently in progress.
    scanning: Arc<AtomicBool>,
    /// Cancelled on shutdown to stop a running scan.
    shutdown: CancellationToken,
}

impl AppState {
    /// Create application state around an engine.
    pub fn new(config: Config, engine: Engine) -> Self {
        let roots = config.library.roots.clone();
        Self {
            config: Arc::new(config),
            engine: Arc::new(Mutex::new(engine)),
            roots: Arc::new(roots),
            scanning: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Configured library roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Run a full scan of the configured roots.
    ///
    /// Returns `Ok(None)` without scanning when another scan is already running.
    pub fn scan_all_libraries(&self) -> Result<Option<ScanSummary>> {
        // Prevent concurrent scans
        if self.scanning.swap(true, Ordering::SeqCst) {
            tracing::info!("Scan already in progress, skipping");
            return Ok(None);
        }

        let result = self.scan_unlocked();
        self.scanning.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    /// Walk and parse without holding the engine lock, so queries keep answering from the
    /// previous index.
    fn scan_unlocked(&self) -> Result<ScanSummary> {
        let job = self.engine.lock().begin_scan(&self.roots)?;
        let collected = job.collect(Some(&self.shutdown));
        self.engine.lock().finish_scan(collected)
    }

    /// Start a background scan (non-blocking).
    pub fn start_background_scan(&self) {
        let state = self.clone();
        std::thread::spawn(move || {
            if let Err(e) = state.scan_all_libraries() {
                tracing::error!(error = %e, "Background scan failed");
            }
        });
    }

    /// Apply watch events as they arrive, on a dedicated thread.
    ///
    /// Does nothing if the event queue was already taken.
    pub fn spawn_event_pump(&self) {
        let Some(mut events) = self.engine.lock().take_events() else {
            tracing::warn!("Watch event queue already taken");
            return;
        };

        let engine = self.engine.clone();
        std::thread::spawn(move || {
            while let Some(event) = events.blocking_recv() {
                engine.lock().apply_event(event);
            }
            tracing::debug!("Watch event queue closed");
        });
    }

    /// Stop any running scan.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
