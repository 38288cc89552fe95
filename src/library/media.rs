//! Media item and series models.

use crate::config::VideoFormat;
use crate::fs::FileStat;
use crate::library::parser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Derive the stable identifier of a file from its absolute path.
///
/// UUIDv5 over the path bytes: the same path always yields the same id, across scans and
/// process restarts.
pub fn media_id(path: &Path) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string()
}

/// Movie or episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaKind {
    /// Standalone video.
    Movie,
    /// Part of a series.
    Episode {
        /// Cleaned series name, the grouping key.
        series_name: String,
        /// Season number as written in the filename.
        season: u32,
        /// Episode number as written in the filename.
        episode: u32,
    },
}

/// A single playable video file in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Identifier derived from the absolute path.
    pub id: String,

    /// Display title (the series name for episodes).
    pub title: String,

    /// Absolute path to the video file.
    pub path: PathBuf,

    /// File name including extension.
    pub file_name: String,

    /// Container format.
    pub format: VideoFormat,

    /// File size in bytes.
    pub file_size: u64,

    /// Duration in seconds, once a player has reported it.
    pub duration: Option<f64>,

    /// Creation time (falls back to modification time where unsupported).
    pub created: DateTime<Utc>,

    /// Last modified time.
    pub modified: DateTime<Utc>,

    /// Thumbnail image, if one was generated.
    pub thumbnail: Option<PathBuf>,

    /// Movie or episode.
    #[serde(flatten)]
    pub kind: MediaKind,
}

impl MediaItem {
    /// Build an item from a validated file.
    pub fn new(path: &Path, format: VideoFormat, stat: &FileStat) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = parser::parse(&file_name);

        Self {
            id: media_id(path),
            title: parsed.title,
            path: path.to_path_buf(),
            file_name,
            format,
            file_size: stat.size,
            duration: None,
            created: stat.created,
            modified: stat.modified,
            thumbnail: None,
            kind: parsed.kind,
        }
    }

    /// Copy of this item with a known duration.
    pub fn with_duration(&self, seconds: f64) -> Self {
        Self {
            duration: Some(seconds),
            ..self.clone()
        }
    }

    /// Copy of this item with a thumbnail.
    pub fn with_thumbnail(&self, thumbnail: PathBuf) -> Self {
        Self {
            thumbnail: Some(thumbnail),
            ..self.clone()
        }
    }

    /// Series name, for episodes.
    pub fn series_name(&self) -> Option<&str> {
        match &self.kind {
            MediaKind::Movie => None,
            MediaKind::Episode { series_name, .. } => Some(series_name),
        }
    }
}

/// Episodes grouped under one series name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Slug derived from the name.
    pub id: String,

    /// Series name, exactly as parsed.
    pub name: String,

    /// Episodes in (season, episode) order.
    pub episodes: Vec<MediaItem>,

    /// Number of episodes.
    pub total_episodes: usize,

    /// Distinct season numbers, ascending.
    pub seasons: Vec<u32>,

    /// Latest watch-progress update over all episodes.
    pub last_watched: Option<DateTime<Utc>>,
}

impl Series {
    /// Slug used as the series id: lowercase, whitespace runs replaced by `-`.
    pub fn slug(name: &str) -> String {
        let words: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
        format!("series-{}", words.join("-"))
    }

    /// [`Series::slug`] plus a short hash of the exact name, for names whose slugs collide.
    pub fn unique_slug(name: &str) -> String {
        let hash = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).simple().to_string();
        format!("{}-{}", Self::slug(name), &hash[..8])
    }
}
