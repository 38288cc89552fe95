//! HTTP server and routes.

pub(crate) mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/scan", post(handlers::api_scan))
        .route("/stats", get(handlers::api_stats))
        .route("/library", get(handlers::api_library))
        .route("/search", get(handlers::api_search))
        .route("/media/{id}", get(handlers::api_media))
        .route("/continue", get(handlers::api_continue))
        .route("/recent", get(handlers::api_recent))
        .route("/added", get(handlers::api_recently_added))
        .route("/progress", delete(handlers::api_clear_progress))
        .route(
            "/progress/{id}",
            get(handlers::api_get_progress)
                .put(handlers::api_update_progress)
                .delete(handlers::api_delete_progress),
        )
        .route("/progress/{id}/complete", post(handlers::api_complete));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
