// transcript-service-rs/src/quota_store.rs
//
// Quota store adapter over the shared key-value store
// Provides:
// - Atomic increment, expiry, existence-check and delete operations
// - Redis backend over a managed async connection
// - In-memory backend with a controllable clock for tests and
//   storeless development
//
// The adapter performs no retries; callers decide fail-open vs fail-closed.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;

/// Bounded per-operation timeout so store latency degrades the same way
/// store unavailability does.
const OP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Key-value store contract backing rate limiting and bypass tokens.
///
/// `increment` must be atomic across concurrent clients; serialization of
/// concurrent increments to the same key is delegated to the backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically increment a counter, creating it at 1 if absent.
    /// Returns the post-increment value.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Set a time-to-live on an existing key. Returns false if the key
    /// does not exist.
    async fn set_expiry(&self, key: &str, ttl_seconds: i64) -> Result<bool, StoreError>;

    /// Read a counter value, or None if the key is absent.
    async fn get_counter(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Seconds remaining until the key expires, or None if the key is
    /// absent or carries no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn is_healthy(&self) -> bool;
}

/// Redis-backed store over a managed async connection.
///
/// The connection manager handles reconnects internally; this adapter adds
/// nothing beyond a bounded timeout per command.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = with_timeout(client.get_tokio_connection_manager()).await?;
        let store = Self { conn };
        with_timeout(
            redis::cmd("PING").query_async::<_, String>(&mut store.conn.clone()),
        )
        .await?;
        Ok(store)
    }
}

async fn with_timeout<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(OP_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(StoreError::Unavailable("operation timed out".to_string())),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.incr(key, 1i64)).await
    }

    async fn set_expiry(&self, key: &str, ttl_seconds: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.expire(key, ttl_seconds.max(0) as usize)).await
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.get(key)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = with_timeout(conn.ttl(key)).await?;
        // -2 means the key is absent, -1 means no expiry is set.
        Ok(if ttl < 0 { None } else { Some(ttl) })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.exists(key)).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        with_timeout(conn.set_ex(key, value, ttl_seconds.max(1) as usize)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = with_timeout(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        with_timeout(redis::cmd("PING").query_async::<_, String>(&mut conn))
            .await
            .is_ok()
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory store for testing and development.
///
/// Expiry is evaluated lazily against an internal clock that tests can
/// advance with [`MemoryStore::advance`].
pub struct MemoryStore {
    data: RwLock<HashMap<String, MemoryEntry>>,
    skew: RwLock<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            skew: RwLock::new(Duration::ZERO),
        }
    }

    /// Advance the store's clock, expiring keys whose TTL has elapsed.
    pub async fn advance(&self, by: Duration) {
        let mut skew = self.skew.write().await;
        *skew += by;
    }

    async fn now(&self) -> Instant {
        Instant::now() + *self.skew.read().await
    }

    /// Fetch a live entry, removing it if its expiry has passed.
    async fn live_entry(&self, key: &str) -> Option<MemoryEntry> {
        let now = self.now().await;
        let mut data = self.data.write().await;
        match data.get(key) {
            Some(entry) if entry.expires_at.map_or(true, |at| at > now) => Some(entry.clone()),
            Some(_) => {
                data.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.now().await;
        // One write guard across the whole read-modify-write so concurrent
        // increments to the same key serialize instead of losing updates.
        let mut data = self.data.write().await;
        let (next, expires_at) = match data.get(key) {
            Some(entry) if entry.expires_at.map_or(true, |at| at > now) => (
                entry.value.parse::<i64>().unwrap_or(0) + 1,
                entry.expires_at,
            ),
            _ => (1, None),
        };
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn set_expiry(&self, key: &str, ttl_seconds: i64) -> Result<bool, StoreError> {
        if self.live_entry(key).await.is_none() {
            return Ok(false);
        }
        let at = self.now().await + Duration::from_secs(ttl_seconds.max(0) as u64);
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(key) {
            entry.expires_at = Some(at);
            return Ok(true);
        }
        Ok(false)
    }

    async fn get_counter(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .live_entry(key)
            .await
            .and_then(|e| e.value.parse::<i64>().ok()))
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.now().await;
        Ok(self
            .live_entry(key)
            .await
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs() as i64))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let at = self.now().await + Duration::from_secs(ttl_seconds.max(0) as u64);
        let mut data = self.data.write().await;
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.live_entry(key).await.is_some();
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(existed)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
