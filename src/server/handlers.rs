//! HTTP request handlers.

use crate::engine::{DEFAULT_LIST_LIMIT, ScanSummary, WatchedItem};
use crate::error::{AppError, Result};
use crate::library::{LibraryStats, LibraryView, MediaItem, SearchHit};
use crate::progress::{WatchProgress, WatchStats};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// WEB PAGES
// ============================================================================

/// Index page (simple HTML).
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let stats = state.engine.lock().stats();
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; }}
        body {{ padding: 0 1rem; }}
        h1 {{ color: #333; }}
        a {{ color: #0066cc; }}
        .stats {{ background: #f5f5f5; padding: 1rem; border-radius: 8px; margin: 1rem 0; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="stats">
        <p><strong>{movies}</strong> movies, <strong>{series}</strong> series
            ({episodes} episodes)</p>
        <p>{size} on disk</p>
    </div>
    <h2>Links</h2>
    <ul>
        <li><a href="/api/library">Library (JSON)</a></li>
        <li><a href="/api/continue">Continue watching (JSON)</a></li>
        <li><a href="/api/stats">API Stats (JSON)</a></li>
    </ul>
</body>
</html>"#,
        title = escape_html(&state.config.server.title),
        movies = stats.total_movies,
        series = stats.total_series,
        episodes = stats.total_episodes,
        size = format_size(stats.total_size),
    );

    Html(html)
}

// ============================================================================
// LIBRARY API
// ============================================================================

/// API: Trigger a full library scan.
pub async fn api_scan(State(state): State<AppState>) -> Result<Json<ScanResponse>> {
    let scan_state = state.clone();
    let summary = tokio::task::spawn_blocking(move || scan_state.scan_all_libraries())
        .await
        .map_err(|e| AppError::Internal(format!("Scan task failed: {}", e)))??;

    Ok(Json(ScanResponse {
        started: summary.is_some(),
        summary,
    }))
}

/// Scan response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    /// False when another scan was already running.
    pub started: bool,
    /// Outcome of the scan, if one ran.
    pub summary: Option<ScanSummary>,
}

/// API: Movies and series.
pub async fn api_library(State(state): State<AppState>) -> Json<LibraryView> {
    Json(state.engine.lock().library())
}

/// API: Get library statistics.
pub async fn api_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = state.engine.lock();
    let library = engine.stats();

    Json(StatsResponse {
        library,
        watch: engine.watch_stats(),
        total_size_human: format_size(library.total_size),
        scanning: state.is_scanning(),
    })
}

/// Stats response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Library totals.
    #[serde(flatten)]
    pub library: LibraryStats,
    /// Watch totals.
    pub watch: WatchStats,
    /// `total_size` for humans.
    pub total_size_human: String,
    /// Whether a scan is running.
    pub scanning: bool,
}

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Search query.
    #[serde(default)]
    pub q: String,
}

/// API: Fuzzy search.
pub async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchHit>> {
    Json(state.engine.lock().search(&params.q))
}

/// API: One media item.
pub async fn api_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MediaResponse>> {
    let item = state
        .engine
        .lock()
        .get_by_id(&id)
        .ok_or_else(|| AppError::NotFound(format!("Media {} not found", id)))?;

    Ok(Json(MediaResponse {
        mime_type: item.format.mime_type(),
        item,
    }))
}

/// One media item with the content type a player should request.
#[derive(Debug, Serialize)]
pub struct MediaResponse {
    /// The item.
    #[serde(flatten)]
    pub item: MediaItem,
    /// MIME type of its container format.
    pub mime_type: &'static str,
}

/// Optional list limit.
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    /// Maximum number of entries.
    pub limit: Option<usize>,
}

impl LimitParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

/// API: Newest files.
pub async fn api_recently_added(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<MediaItem>> {
    Json(state.engine.lock().recently_added(params.limit()))
}

// ============================================================================
// WATCH PROGRESS API
// ============================================================================

/// Progress update request.
#[derive(Debug, Deserialize)]
pub struct ProgressUpdateRequest {
    /// Playback position in seconds.
    pub current_time: f64,
    /// Total duration in seconds.
    pub duration: f64,
}

/// API: Progress for one item.
pub async fn api_get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WatchProgress>> {
    state
        .engine
        .lock()
        .watch_progress(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No progress for {}", id)))
}

/// API: Record a playback position.
pub async fn api_update_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProgressUpdateRequest>,
) -> Result<Json<WatchProgress>> {
    let progress = state
        .engine
        .lock()
        .update_watch_progress(&id, req.current_time, req.duration)?;

    tracing::debug!(
        media_id = %id,
        current_time = req.current_time,
        completed = progress.completed,
        "Progress updated"
    );

    Ok(Json(progress))
}

/// API: Mark an item as watched.
pub async fn api_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WatchProgress>> {
    Ok(Json(state.engine.lock().mark_completed(&id)?))
}

/// API: Forget the progress of one item.
pub async fn api_delete_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    match state.engine.lock().remove_watch_progress(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::NotFound(format!("No progress for {}", id))),
    }
}

/// API: Forget all progress.
pub async fn api_clear_progress(State(state): State<AppState>) -> StatusCode {
    state.engine.lock().clear_watch_progress();
    StatusCode::NO_CONTENT
}

/// API: Unfinished items.
pub async fn api_continue(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<WatchedItem>> {
    Json(state.engine.lock().continue_watching(params.limit()))
}

/// API: Recently watched items.
pub async fn api_recent(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<WatchedItem>> {
    Json(state.engine.lock().recently_watched(params.limit()))
}

/// Escape text for use inside HTML elements and attributes.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Format bytes to human-readable string.
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
