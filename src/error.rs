use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// A library root is missing, not a directory or unreadable.
    #[error("Library root unavailable: {0}")]
    RootUnavailable(String),

    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A scan was cancelled before it finished.
    #[error("Scan cancelled")]
    Cancelled,

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem notification error.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) | AppError::RootUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(error = %self, "Request error");

        (status, self.to_string()).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
