//! vidshelf: a local video library indexer with watch progress tracking.
//!
//! Scans one or more directories for video files, classifies them into movies and
//! series episodes from their file names, keeps the index current as files change,
//! and serves fuzzy search and "continue watching" queries over a small JSON API.
//!
//! # Features
//!
//! - Movie / series detection from `S01E02`, `1x02` and `Season 1 Episode 2` names
//! - Live updates from filesystem notifications
//! - Typo-tolerant title search
//! - Watch progress with automatic completion at 90%
//! - SQLite or JSON file persistence

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Key-value persistence.
pub mod db;
/// Library engine.
pub mod engine;
/// Error types.
pub mod error;
/// Filesystem walking and watching.
pub mod fs;
/// Media models and indexes.
pub mod library;
/// Watch progress.
pub mod progress;
/// HTTP server.
pub mod server;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use engine::Engine;
pub use error::{AppError, Result};
pub use server::AppState;
