use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Local video library indexer with watch progress.
#[derive(Parser, Debug, Clone)]
#[command(name = "vidshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "VIDSHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Library root folders (overrides the config file).
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,
    },

    /// Scan folders once and print library statistics.
    Scan {
        /// Folders to scan.
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },

    /// Scan folders and run a fuzzy search over the result.
    Search {
        /// Search query.
        query: String,

        /// Library root folders (defaults to the configured roots).
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Library roots and watching.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Scan configuration.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Watch-progress storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Library title shown by the index page.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        8484,
    )
}

fn default_title() -> String {
    "My Videos".to_string()
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Folders scanned into the library.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Keep the index in sync with filesystem changes.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            watch: default_watch(),
        }
    }
}

fn default_watch() -> bool {
    true
}

/// Scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Rescan interval in seconds (0 to disable).
    #[serde(default)]
    pub interval_seconds: u64,

    /// Number of parallel workers for stat and parse (1 = sequential).
    /// Keep low for NAS/network storage to avoid saturation.
    #[serde(default = "default_scan_workers")]
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 0,
            workers: default_scan_workers(),
        }
    }
}

fn default_scan_workers() -> usize {
    1
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum normalized distance (0.0 exact, 1.0 anything) a hit may have.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    0.3
}

/// Backend used for persisted watch progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite key-value table.
    Sqlite,
    /// One JSON file per key in a directory.
    Json,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// SQLite database file, or directory for the JSON backend.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/vidshelf.db")
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(crate::error::AppError::Config(format!(
                "search.threshold must be between 0.0 and 1.0, got {}",
                self.search.threshold
            )));
        }
        if self.scan.workers == 0 {
            return Err(crate::error::AppError::Config(
                "scan.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("vidshelf.toml"),
            dirs::config_dir()
                .map(|p| p.join("vidshelf").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/vidshelf/config.toml"),
        ];

        candidates
            .into_iter()
            .find(|p| !p.as_os_str().is_empty() && p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# vidshelf configuration

[server]
bind = "127.0.0.1:8484"
title = "My Videos"

[library]
# Folders to index
# roots = ["/home/me/Videos", "/mnt/nas/Series"]
# Follow filesystem changes after each scan
watch = true

[scan]
# Rescan interval in seconds (0 to disable)
interval_seconds = 0
# Parallel stat/parse workers
workers = 1

[search]
# 0.0 = exact only, 1.0 = match anything
threshold = 0.3

[storage]
# "sqlite" or "json"
backend = "sqlite"
# path = "/var/lib/vidshelf/vidshelf.db"
"#
        .to_string()
    }
}

/// Supported video container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// MPEG-4 Part 14.
    Mp4,
    /// Matroska.
    Mkv,
    /// Audio Video Interleave.
    Avi,
    /// QuickTime.
    Mov,
    /// Windows Media Video.
    Wmv,
    /// Flash Video.
    Flv,
    /// WebM.
    Webm,
    /// iTunes video.
    M4v,
}

impl VideoFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Mkv => "video/x-matroska",
            VideoFormat::Avi => "video/x-msvideo",
            VideoFormat::Mov => "video/quicktime",
            VideoFormat::Wmv => "video/x-ms-wmv",
            VideoFormat::Flv => "video/x-flv",
            VideoFormat::Webm => "video/webm",
            VideoFormat::M4v => "video/x-m4v",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp4" => Some(VideoFormat::Mp4),
            "mkv" => Some(VideoFormat::Mkv),
            "avi" => Some(VideoFormat::Avi),
            "mov" => Some(VideoFormat::Mov),
            "wmv" => Some(VideoFormat::Wmv),
            "flv" => Some(VideoFormat::Flv),
            "webm" => Some(VideoFormat::Webm),
            "m4v" => Some(VideoFormat::M4v),
            _ => None,
        }
    }

    /// Detect the format of a path; `None` means the file is invisible to the library.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}
