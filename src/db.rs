//! Durable key-value storage for watch progress and other small documents.

mod schema;

pub use schema::Database;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

/// Minimal key-value persistence provider.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

/// Store keeping one `<key>.json` file per key in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Use `dir` for storage; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.file_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_for(key);
        // Write then rename so a crash never leaves a truncated file behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.file_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the store selected in the configuration.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Sqlite => Ok(Arc::new(Database::open(&config.path)?)),
        StorageBackend::Json => Ok(Arc::new(JsonFileStore::new(&config.path))),
    }
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}
