//! Read-through TTL cache for upstream responses.
//!
//! One JSON file per key, wrapped in an envelope carrying the expiry time.
//! The cache is best-effort: a missing, expired or unreadable entry is a
//! miss, and a failed write only loses the caching benefit. A disabled
//! cache misses on every read and ignores every write.

use crate::error::Result;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Internal cache failures. Logged, never returned to callers.
#[derive(Debug, Error)]
enum CacheError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    /// Unix seconds after which the entry is dead
    expires_at: i64,
    value: T,
}

/// TTL cache for API and page responses
#[derive(Debug)]
pub struct Cache {
    /// Root cache directory, `None` when caching is disabled
    cache_dir: Option<PathBuf>,
    /// Distinguishes temp files of concurrent writers
    write_seq: AtomicU64,
}

impl Cache {
    /// Create a new cache rooted at `cache_dir`
    ///
    /// An uncreatable directory disables the cache instead of failing.
    pub fn new(cache_dir: impl AsRef<Path>, enabled: bool) -> Self {
        if !enabled {
            info!("Cache disabled by configuration");
            return Self::disabled();
        }

        let cache_dir = cache_dir.as_ref().to_path_buf();
        match std::fs::create_dir_all(&cache_dir) {
            Ok(()) => {
                info!(cache_dir = %cache_dir.display(), "Cache initialized");
                Self {
                    cache_dir: Some(cache_dir),
                    write_seq: AtomicU64::new(0),
                }
            }
            Err(e) => {
                warn!(
                    cache_dir = %cache_dir.display(),
                    error = %e,
                    "Cache directory unavailable, running uncached"
                );
                Self::disabled()
            }
        }
    }

    /// A cache with no backing store
    pub fn disabled() -> Self {
        Self {
            cache_dir: None,
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_dir.is_some()
    }

    /// Get a live cached item
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with_ttl(key).await.map(|(value, _)| value)
    }

    /// Get a live cached item together with the time it has left
    pub async fn get_with_ttl<T: DeserializeOwned>(&self, key: &str) -> Option<(T, Duration)> {
        let path = self.cache_path(key)?;
        let now = Utc::now();

        match read_entry::<T>(&path).await {
            Ok(Some(envelope)) if envelope.expires_at > now.timestamp() => {
                debug!(key = key, "Cache hit");
                let remaining_ms = envelope
                    .expires_at
                    .saturating_mul(1_000)
                    .saturating_sub(now.timestamp_millis());
                let remaining = Duration::from_millis(u64::try_from(remaining_ms).unwrap_or(0));
                Some((envelope.value, remaining))
            }
            Ok(Some(_)) => {
                debug!(key = key, "Cache entry expired");
                None
            }
            Ok(None) => {
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                debug!(key = key, error = %e, "Unreadable cache entry treated as miss");
                None
            }
        }
    }

    /// Store an item for `ttl`. Returns whether the write landed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(path) = self.cache_path(key) else {
            return false;
        };

        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            expires_at: Utc::now().timestamp().saturating_add(ttl_secs),
            value,
        };

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        match write_entry(&path, &envelope, seq).await {
            Ok(()) => {
                debug!(key = key, ttl_secs = ttl_secs, "Cache stored");
                true
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result
    ///
    /// Errors from `fetch` are returned as-is and nothing is stored.
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }

        let value = fetch().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Get the cache file path for a given key
    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        let cache_dir = self.cache_dir.as_ref()?;

        // Sanitize key to create valid filename
        let safe_key: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
                c => c,
            })
            .collect();

        Some(cache_dir.join(format!("{}.json", safe_key)))
    }

    /// Remove every entry
    pub async fn clear(&self) -> anyhow::Result<()> {
        let Some(cache_dir) = &self.cache_dir else {
            return Ok(());
        };

        if tokio::fs::try_exists(cache_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(cache_dir).await?;
        }
        tokio::fs::create_dir_all(cache_dir).await?;
        info!("Cache cleared");
        Ok(())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> anyhow::Result<CacheStats> {
        let mut stats = CacheStats::default();
        let Some(cache_dir) = &self.cache_dir else {
            return Ok(stats);
        };

        let mut entries = tokio::fs::read_dir(cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                stats.total_files += 1;
                stats.total_size_bytes += metadata.len();
            }
        }

        Ok(stats)
    }
}

async fn read_entry<T: DeserializeOwned>(
    path: &Path,
) -> std::result::Result<Option<Envelope<T>>, CacheError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(Some(serde_json::from_slice(&content)?))
}

async fn write_entry<T: Serialize>(
    path: &Path,
    envelope: &Envelope<T>,
    seq: u64,
) -> std::result::Result<(), CacheError> {
    let content = serde_json::to_vec(envelope)?;

    // Rename is atomic, so readers see either the old or the new entry
    let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::write(&tmp, content).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: u32,
        name: String,
    }

    fn sample() -> TestData {
        TestData {
            id: 1,
            name: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cache_enabled() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        assert!(cache.set("test:key", &sample(), Duration::from_secs(60)).await);

        let retrieved: Option<TestData> = cache.get("test:key").await;
        assert_eq!(retrieved, Some(sample()));

        Ok(())
    }

    #[tokio::test]
    async fn test_get_with_ttl_reports_remaining_life() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        assert!(cache.set("test:key", &sample(), Duration::from_secs(60)).await);

        let (value, remaining) = cache.get_with_ttl::<TestData>("test:key").await.unwrap();
        assert_eq!(value, sample());
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining >= Duration::from_secs(58));

        assert!(cache.get_with_ttl::<TestData>("test:other").await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_disabled() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), false);

        // Store should do nothing
        assert!(!cache.set("test:key", &sample(), Duration::from_secs(60)).await);

        // Retrieve should always return None
        let retrieved: Option<TestData> = cache.get("test:key").await;
        assert_eq!(retrieved, None);
        assert!(!cache.is_enabled());

        Ok(())
    }

    #[tokio::test]
    async fn test_cache_miss() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        let retrieved: Option<TestData> = cache.get("nonexistent").await;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        cache.set("short", &sample(), Duration::ZERO).await;
        let retrieved: Option<TestData> = cache.get("short").await;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        std::fs::write(temp_dir.path().join("broken.json"), "{not json")?;
        let retrieved: Option<TestData> = cache.get("broken").await;
        assert_eq!(retrieved, None);

        // Wrong shape is also a miss rather than an error
        cache.set("shape", &"a string", Duration::from_secs(60)).await;
        let retrieved: Option<TestData> = cache.get("shape").await;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_unwritable_store_does_not_fail() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path().join("gone"), true);
        std::fs::remove_dir_all(temp_dir.path().join("gone"))?;

        assert!(!cache.set("key", &sample(), Duration::from_secs(60)).await);
        let retrieved: Option<TestData> = cache.get("key").await;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_remember_fetches_once() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .remember("remembered", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(sample())
                })
                .await?;
            assert_eq!(value, sample());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_remember_does_not_store_errors() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        let result: Result<TestData> = cache
            .remember("failing", Duration::from_secs(60), || async {
                Err(Error::parse("upstream changed"))
            })
            .await;
        assert!(result.is_err());

        let retrieved: Option<TestData> = cache.get("failing").await;
        assert_eq!(retrieved, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_stats_and_clear() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let cache = Cache::new(temp_dir.path(), true);

        let stats = cache.stats().await?;
        assert_eq!(stats.total_files, 0);

        cache.set("a", &sample(), Duration::from_secs(60)).await;
        cache.set("b", &sample(), Duration::from_secs(60)).await;

        let stats = cache.stats().await?;
        assert_eq!(stats.total_files, 2);
        assert!(stats.total_size_bytes > 0);

        cache.clear().await?;
        let stats = cache.stats().await?;
        assert_eq!(stats.total_files, 0);

        Ok(())
    }
}
