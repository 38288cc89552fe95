//! Filesystem access: directory walking, file validation and change notifications.

pub mod watcher;

pub use watcher::{
    ChangeNotifier, EventSink, NoopNotifier, NotifyWatcher, Subscription, WatchEvent,
    WatchEventKind,
};

use crate::config::VideoFormat;
use crate::error::{AppError, Result};
use crate::library::media::MediaItem;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

/// The subset of file metadata the library needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Whether the path resolves to a regular file.
    pub is_file: bool,
    /// Whether the path resolves to a directory.
    pub is_dir: bool,
    /// Creation time (modification time where the platform has none).
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl From<&std::fs::Metadata> for FileStat {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let created = metadata.created().map(DateTime::from).unwrap_or(modified);

        Self {
            size: metadata.len(),
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
            created,
            modified,
        }
    }
}

/// Candidate files found under one root.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Files with a supported extension, in traversal order.
    pub files: Vec<PathBuf>,
    /// Entries the walker could not read (unreadable directories, symlink loops).
    pub skipped: usize,
    /// The walk stopped early because its token was cancelled.
    pub cancelled: bool,
}

/// Directory enumeration and stat provider.
pub trait MediaSource: Send + Sync {
    /// Recursively list supported files under `root`, skipping hidden entries.
    ///
    /// Fails only when `root` itself cannot be read; problems below it are counted in
    /// [`WalkReport::skipped`].
    fn walk(&self, root: &Path, cancel: Option<&CancellationToken>) -> Result<WalkReport>;

    /// Stat a single path, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
}

/// Local filesystem implementation of [`MediaSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl MediaSource for LocalFs {
    fn walk(&self, root: &Path, cancel: Option<&CancellationToken>) -> Result<WalkReport> {
        let unavailable = |reason: String| {
            AppError::RootUnavailable(format!("{}: {}", root.display(), reason))
        };

        let metadata = std::fs::metadata(root).map_err(|e| unavailable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".to_string()));
        }
        std::fs::read_dir(root).map_err(|e| unavailable(e.to_string()))?;

        let mut report = WalkReport::default();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                report.cancelled = true;
                break;
            }

            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_dir() && VideoFormat::from_path(entry.path()).is_some()
                    {
                        report.files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(
                        path = ?e.path(),
                        error = %e,
                        "Skipping unreadable entry"
                    );
                }
            }
        }

        Ok(report)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        std::fs::metadata(path).map(|m| FileStat::from(&m))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Whether any component of `path` below `root` is hidden.
pub fn is_hidden_below(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Why a file was kept out of the library.
#[derive(Error, Debug)]
pub enum Rejection {
    /// Extension is not in the supported list.
    #[error("unsupported format")]
    Unsupported,
    /// Stat failed (permissions, deleted in the meantime).
    #[error("stat failed: {0}")]
    Stat(#[from] io::Error),
    /// Not a regular file.
    #[error("not a regular file")]
    NotAFile,
    /// Zero-byte file.
    #[error("empty file")]
    Empty,
}

/// Validate a path and build its media item.
pub fn admit(source: &dyn MediaSource, path: &Path) -> std::result::Result<MediaItem, Rejection> {
    let format = VideoFormat::from_path(path).ok_or(Rejection::Unsupported)?;
    let stat = source.stat(path)?;
    if !stat.is_file {
        return Err(Rejection::NotAFile);
    }
    if stat.size == 0 {
        return Err(Rejection::Empty);
    }
    Ok(MediaItem::new(path, format, &stat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hidden_below() {
        let root = Path::new("/videos");
        assert!(is_hidden_below(Path::new("/videos/.cache/a.mkv"), root));
        assert!(is_hidden_below(Path::new("/videos/show/.a.mkv"), root));
        assert!(!is_hidden_below(Path::new("/videos/show/a.mkv"), root));
        // Hidden components above the root do not count.
        assert!(!is_hidden_below(
            Path::new("/home/me/.media/a.mkv"),
            Path::new("/home/me/.media")
        ));
    }

    #[test]
    fn test_admit_rejects_unsupported_before_stat() {
        let err = admit(&LocalFs, Path::new("/does/not/exist/notes.txt")).unwrap_err();
        assert!(matches!(err, Rejection::Unsupported));
    }

    #[test]
    fn test_admit_missing_file() {
        let err = admit(&LocalFs, Path::new("/does/not/exist/movie.mkv")).unwrap_err();
        assert!(matches!(err, Rejection::Stat(_)));
    }
}
