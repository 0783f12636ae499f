//! Generated Fragment Cache
//!
//! Key-value persistence of generated text. Every fragment the pipeline
//! produces lands here under its cache key, which is what makes a run
//! resumable and lets assembly rebuild the document without the network.
//!
//! ## Layout
//!
//! `FileCacheStore` keeps one plain-text file per key (`<cache_dir>/<key>.md`)
//! so an operator can inspect or hand-edit any fragment. A missing file is
//! the normal "not generated yet" state.
//!
//! Writes go to a uniquely named temporary file first and are renamed into
//! place, so concurrent readers never observe a half-written fragment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::constants::cache as cache_constants;
use crate::types::{CacheKey, ForgeError, Result};

/// Durable store of generated fragments
///
/// `put` is a full overwrite; keys are write-once by convention only.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a fragment. Absence is `Ok(None)`, never an error.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>>;

    /// Write a fragment, replacing any previous content
    async fn put(&self, key: &CacheKey, content: &str) -> Result<()>;

    /// All keys currently materialized, sorted
    async fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Remove every fragment, returning how many were removed
    async fn clear(&self) -> Result<usize>;
}

/// Shared cache handle used across concurrent workers
pub type SharedCache = Arc<dyn CacheStore>;

// =============================================================================
// File-backed store
// =============================================================================

/// One human-readable file per cache key
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    cache_dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the file path for a key
    pub fn fragment_path(&self, key: &CacheKey) -> Result<PathBuf> {
        if !key.is_file_safe() {
            return Err(ForgeError::Storage(format!(
                "Cache key '{}' is not usable as a file name",
                key
            )));
        }
        Ok(self
            .cache_dir
            .join(format!("{}.{}", key, cache_constants::FRAGMENT_EXTENSION)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let path = self.fragment_path(key)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Cache hit '{}' ({} chars)", key, content.len());
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &CacheKey, content: &str) -> Result<()> {
        let path = self.fragment_path(key)?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let tmp_path = self
            .cache_dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, content).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                warn!("Failed to remove temp fragment {}: {}", tmp_path.display(), cleanup);
            }
            return Err(e.into());
        }

        debug!("Cached '{}' ({} chars)", key, content.len());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut entries = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_fragment = path
                .extension()
                .is_some_and(|ext| ext == cache_constants::FRAGMENT_EXTENSION);
            if !is_fragment {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(CacheKey::new(stem));
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<usize> {
        let keys = self.keys().await?;
        for key in &keys {
            tokio::fs::remove_file(self.fragment_path(key)?).await?;
        }
        Ok(keys.len())
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    fragments: DashMap<CacheKey, String>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a fragment
    pub fn with_fragment(self, key: impl Into<CacheKey>, content: impl Into<String>) -> Self {
        self.fragments.insert(key.into(), content.into());
        self
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        Ok(self.fragments.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &CacheKey, content: &str) -> Result<()> {
        self.fragments.insert(key.clone(), content.to_string());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.fragments.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<usize> {
        let count = self.fragments.len();
        self.fragments.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_missing_key_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path().join("cache"));

        let result = store.get(&CacheKey::new("ch1_a_context")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_file_store_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path().join("cache"));
        let key = CacheKey::new("ch2_b_data");

        store.put(&key, "## Data\nVolumes are stable.").await.unwrap();

        let loaded = store.get(&key).await.unwrap();
        assert_eq!(loaded.as_deref(), Some("## Data\nVolumes are stable."));

        // Human-legible file named after the key
        let on_disk = std::fs::read_to_string(temp_dir.path().join("cache/ch2_b_data.md")).unwrap();
        assert!(on_disk.contains("Volumes are stable"));
    }

    #[tokio::test]
    async fn test_file_store_put_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        let key = CacheKey::new("conclusions");

        store.put(&key, "first").await.unwrap();
        store.put(&key, "second").await.unwrap();

        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_file_store_keys_skip_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());

        store.put(&CacheKey::new("b"), "x").await.unwrap();
        store.put(&CacheKey::new("a"), "y").await.unwrap();
        std::fs::write(temp_dir.path().join(".a.partial.tmp"), "z").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "z").unwrap();

        let keys = store.keys().await.unwrap();
        assert_eq!(keys, vec![CacheKey::new("a"), CacheKey::new("b")]);
    }

    #[tokio::test]
    async fn test_file_store_rejects_unsafe_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());

        let result = store.put(&CacheKey::new("../outside"), "x").await;
        assert!(matches!(result, Err(ForgeError::Storage(_))));
    }

    #[tokio::test]
    async fn test_file_store_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        store.put(&CacheKey::new("one"), "1").await.unwrap();
        store.put(&CacheKey::new("two"), "2").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryCacheStore::new().with_fragment("seed", "seeded text");
        assert_eq!(
            store.get(&CacheKey::new("seed")).await.unwrap().as_deref(),
            Some("seeded text")
        );
        assert!(store.get(&CacheKey::new("other")).await.unwrap().is_none());

        store.put(&CacheKey::new("other"), "new").await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
