//! Expiring key-value store for geolocation results.
//!
//! Entries carry their own absolute expiry; a read past the expiry removes
//! the entry and reports a miss. Concurrent writers for the same key are
//! last-write-wins.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::analytics::models::GeoLocation;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// On-disk and in-memory representation: `{"value": ..., "expires": <epoch secs>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: GeoLocation,
    pub expires: i64,
}

impl CacheEntry {
    pub fn new(value: GeoLocation, ttl: Duration) -> Self {
        Self {
            value,
            expires: now_epoch().saturating_add(ttl.as_secs() as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires < now_epoch()
    }
}

#[async_trait]
pub trait GeoCache: Send + Sync {
    /// Live entry for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, value: &GeoLocation, ttl: Duration) -> Result<(), CacheError>;

    /// Drop every entry. Returns how many were removed.
    async fn clear(&self) -> Result<u64, CacheError>;
}

/// Cache key for an IP address. The address itself never appears in the key.
pub fn cache_key(ip: &str) -> String {
    format!("geo_{:x}", Sha256::digest(ip.as_bytes()))
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One JSON file per key inside a cache directory.
pub struct FileGeoCache {
    dir: PathBuf,
    write_seq: AtomicU64,
}

impl FileGeoCache {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_seq: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:x}.cache", Sha256::digest(key.as_bytes())))
    }

    async fn remove_quietly(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "failed to remove stale cache file");
            }
        }
    }
}

#[async_trait]
impl GeoCache for FileGeoCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // unreadable entries are treated like expired ones
        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) if !entry.is_expired() => Ok(Some(entry)),
            _ => {
                Self::remove_quietly(&path).await;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &GeoLocation, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value.clone(), ttl);
        let body = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));

        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            Self::remove_quietly(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("cache") {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Bounded in-process cache. Capacity eviction is handled by moka; expiry is
/// per entry and checked on read.
pub struct MemoryGeoCache {
    entries: Cache<String, CacheEntry>,
}

impl MemoryGeoCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_entries).build(),
        }
    }
}

#[async_trait]
impl GeoCache for MemoryGeoCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.entries.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn set(&self, key: &str, value: &GeoLocation, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value.clone(), ttl))
            .await;
        Ok(())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        self.entries.run_pending_tasks().await;
        let count = self.entries.entry_count();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> GeoLocation {
        GeoLocation {
            country_code: Some("DE".to_string()),
            country_name: Some("Germany".to_string()),
            city: Some("Berlin".to_string()),
        }
    }

    #[test]
    fn test_cache_key_hides_ip() {
        let key = cache_key("203.0.113.5");
        assert!(key.starts_with("geo_"));
        assert!(!key.contains("203.0.113.5"));
        assert_eq!(key, cache_key("203.0.113.5"));
        assert_ne!(key, cache_key("203.0.113.6"));
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileGeoCache::new(dir.path()).await.unwrap();

        assert!(cache.get("geo_a").await.unwrap().is_none());
        cache.set("geo_a", &berlin(), Duration::from_secs(60)).await.unwrap();

        let entry = cache.get("geo_a").await.unwrap().unwrap();
        assert_eq!(entry.value, berlin());
        assert!(entry.expires > now_epoch());
    }

    #[tokio::test]
    async fn test_file_cache_expired_entry_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileGeoCache::new(dir.path()).await.unwrap();

        let stale = CacheEntry {
            value: berlin(),
            expires: now_epoch() - 10,
        };
        let path = cache.path_for("geo_old");
        tokio::fs::write(&path, serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        assert!(cache.get("geo_old").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileGeoCache::new(dir.path()).await.unwrap();

        let path = cache.path_for("geo_bad");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(cache.get("geo_bad").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_cache_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileGeoCache::new(dir.path()).await.unwrap();

        cache.set("geo_a", &berlin(), Duration::from_secs(60)).await.unwrap();
        cache.set("geo_b", &berlin(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.get("geo_a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryGeoCache::new(100);

        cache.set("geo_a", &berlin(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("geo_a").await.unwrap().unwrap().value, berlin());

        cache
            .entries
            .insert(
                "geo_old".to_string(),
                CacheEntry {
                    value: berlin(),
                    expires: now_epoch() - 1,
                },
            )
            .await;
        assert!(cache.get("geo_old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_clear() {
        let cache = MemoryGeoCache::new(100);
        cache.set("geo_a", &berlin(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.get("geo_a").await.unwrap().is_none());
    }
}
