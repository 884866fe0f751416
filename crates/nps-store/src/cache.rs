//! Ephemeral key/value cache with per-key expiry.
//!
//! Holds OTP hashes, send counters and the PFM catalogue. [`MemoryCache`] keeps
//! entries in-process; `RedisCache` (feature `redis`) talks to a shared Redis.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Minimal string cache used by the OTP protocol and catalogue lookups.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a live value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` when the backend fails.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write `value` with a time to live, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` when the backend fails.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Increment a counter and return the new value. The TTL is set when the
    /// counter is created and is not extended by later increments.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` when the backend fails.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;

    /// Delete a key. Returns whether a live value was removed, so concurrent
    /// deleters can tell which one won.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` when the backend fails.
    async fn del(&self, key: &str) -> Result<bool, CacheError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache. Expiry follows `tokio::time`, so paused-clock tests can
/// advance past a TTL.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if !entries.get(key).is_some_and(|entry| entry.live(now)) {
            entries.insert(
                key.to_string(),
                Entry {
                    value: "0".to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::Backend(format!("counter {key} vanished")))?;
        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| CacheError::Backend(format!("value at {key} is not a counter")))?
            + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .await
            .remove(key)
            .is_some_and(|entry| entry.live(now)))
    }
}

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisCache;

#[cfg(feature = "redis")]
mod redis_backend {
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    use super::{Cache, CacheError};

    impl From<redis::RedisError> for CacheError {
        fn from(err: redis::RedisError) -> Self {
            Self::Backend(err.to_string())
        }
    }

    /// Redis-backed cache. Clones share one multiplexed connection.
    #[derive(Clone)]
    pub struct RedisCache {
        conn: ConnectionManager,
    }

    impl RedisCache {
        /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
        ///
        /// # Errors
        ///
        /// Returns `CacheError::Backend` if the URL is invalid or the server is unreachable.
        pub async fn connect(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url)?;
            let conn = ConnectionManager::new(client).await?;
            tracing::info!("Connected to Redis");
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl Cache for RedisCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let mut conn = self.conn.clone();
            Ok(conn.get(key).await?)
        }

        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            let () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            Ok(())
        }

        async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
            let mut conn = self.conn.clone();
            let count: u64 = conn.incr(key, 1u64).await?;
            if count == 1 {
                let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
                let _: bool = conn.expire(key, seconds).await?;
            }
            Ok(count)
        }

        async fn del(&self, key: &str) -> Result<bool, CacheError> {
            let mut conn = self.conn.clone();
            let removed: u64 = conn.del(key).await?;
            Ok(removed > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire() {
        let cache = MemoryCache::new();
        cache
            .set_ex("otp:9876543210", "h", Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(
            cache.get("otp:9876543210").await.unwrap().as_deref(),
            Some("h")
        );
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get("otp:9876543210").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_ttl_starts_at_first_increment() {
        let cache = MemoryCache::new();
        let hour = Duration::from_secs(3600);
        assert_eq!(cache.incr_with_ttl("n", hour).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(3000)).await;
        assert_eq!(cache.incr_with_ttl("n", hour).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(cache.incr_with_ttl("n", hour).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn only_one_delete_wins() {
        let cache = MemoryCache::new();
        cache
            .set_ex("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.del("k").await.unwrap());
        assert!(!cache.del("k").await.unwrap());
    }
}
