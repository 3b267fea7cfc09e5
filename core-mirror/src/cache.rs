//! # Upload Cache
//!
//! Durable token-to-URL map for hosted assets.
//!
//! ## Overview
//!
//! Once an asset has been uploaded to a host, its store token maps to a
//! stable public URL. That mapping is the cheapest resolution layer the
//! asset pipeline has, so it is kept in a durable key-value store: a flat
//! JSON object on disk, mirrored fully in memory. Entries are only ever
//! added; deleting the file is the one way to evict.
//!
//! Writes persist in the background so a lookup-heavy run never blocks on
//! disk. [`flush`](UploadCache::flush) forces a synchronous persist; the
//! scheduler calls it once at the end of a run so fire-and-forget writes
//! cannot be lost to process exit.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Key-value store of asset token to hosted URL.
#[async_trait]
pub trait UploadCache: Send + Sync {
    /// Looks up the hosted URL for a token.
    async fn get(&self, token: &str) -> Option<String>;

    /// Records a token's hosted URL.
    async fn put(&self, token: &str, url: &str);

    /// Persists all entries durably before returning.
    async fn flush(&self) -> Result<()>;

    /// Number of entries.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// File-backed cache: one JSON object at `<cache_dir>/upload-cache.json`.
///
/// A missing or unreadable file is treated as an empty cache; a corrupt
/// file is logged and discarded rather than failing the run.
pub struct JsonFileCache {
    path: PathBuf,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl JsonFileCache {
    pub const FILE_NAME: &'static str = "upload-cache.json";

    /// Opens (or initializes) the cache under `cache_dir`.
    pub async fn open(cache_dir: impl Into<PathBuf>) -> Self {
        let path = cache_dir.into().join(Self::FILE_NAME);
        let entries = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(map) => {
                    debug!(entries = map.len(), path = %path.display(), "upload cache loaded");
                    map
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "upload cache unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    async fn persist(path: &Path, snapshot: &HashMap<String, String>) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(io::Error::other)?;
        fs::write(path, bytes).await
    }
}

#[async_trait]
impl UploadCache for JsonFileCache {
    async fn get(&self, token: &str) -> Option<String> {
        self.entries.read().await.get(token).cloned()
    }

    async fn put(&self, token: &str, url: &str) {
        let snapshot = {
            let mut entries = self.entries.write().await;
            entries.insert(token.to_string(), url.to_string());
            entries.clone()
        };

        // Persist in the background; flush() at end of run catches stragglers.
        let path = self.path.clone();
        tokio::spawn(async move {
            if let Err(err) = Self::persist(&path, &snapshot).await {
                debug!(path = %path.display(), error = %err, "background cache persist failed");
            }
        });
    }

    async fn flush(&self) -> Result<()> {
        let snapshot = self.entries.read().await.clone();
        Self::persist(&self.path, &snapshot).await?;
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// In-memory cache with no durability. Useful for tests and for runs that
/// should not leave state behind.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadCache for MemoryCache {
    async fn get(&self, token: &str) -> Option<String> {
        self.entries.read().await.get(token).cloned()
    }

    async fn put(&self, token: &str, url: &str) {
        self.entries
            .write()
            .await
            .insert(token.to_string(), url.to_string());
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
