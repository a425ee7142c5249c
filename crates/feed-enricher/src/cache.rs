//! Durable key-value cache for the last captured payload.
//!
//! Caching is strictly best-effort: callers treat every error as "no entry"
//! on read and ignore it on write.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EnricherError, EnricherResult};

/// Default key the payload store writes under.
pub const DEFAULT_CACHE_KEY: &str = "firehose_last";

/// Durable shape of a captured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub url: String,
    pub payload: Value,
}

/// get/set contract of the durable cache.
pub trait DurableCache: Send + Sync {
    fn get(&self, key: &str) -> EnricherResult<Option<CacheRecord>>;
    fn set(&self, key: &str, record: &CacheRecord) -> EnricherResult<()>;
    fn remove(&self, key: &str) -> EnricherResult<()>;
}

/// Cache holding one JSON file per key.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open a cache in `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> EnricherResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("FileCache opened at {}", dir.display());
        Ok(Self { dir })
    }

    /// Cache under `~/.feed-enricher/cache`.
    pub fn default_cache() -> EnricherResult<Self> {
        Self::new(default_cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Path separators and other unsafe characters become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

/// `~/.feed-enricher/cache`, or `/tmp/.feed-enricher/cache` without a home directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".feed-enricher")
        .join("cache")
}

impl DurableCache for FileCache {
    fn get(&self, key: &str) -> EnricherResult<Option<CacheRecord>> {
        let path = self.path_for(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&data).map_err(|e| {
            EnricherError::Cache(format!("corrupt entry {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    fn set(&self, key: &str, record: &CacheRecord) -> EnricherResult<()> {
        let path = self.path_for(key);
        let data = serde_json::to_vec(record)?;
        // Write-then-rename so a reader never sees a half-written entry.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> EnricherResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process cache; useful for tests and for hosts without durable storage.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableCache for MemoryCache {
    fn get(&self, key: &str) -> EnricherResult<Option<CacheRecord>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, record: &CacheRecord) -> EnricherResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> EnricherResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
