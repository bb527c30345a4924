//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use tracing::{debug, info};

/// Namespace of link entries; the broker streams live in the same database.
const KEY_PREFIX: &str = "url:";

fn key_for(code: &str) -> String {
    format!("{KEY_PREFIX}{code}")
}

fn operation_error(op: &str, key: &str, e: RedisError) -> CacheError {
    CacheError::OperationError(format!("{op} {key}: {e}"))
}

/// Redis cache for `code → long_url` lookups.
///
/// `ConnectionManager` reconnects on its own; while Redis is away every call
/// fails fast and the resolver falls back to the store.
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: u64,
}

impl RedisCache {
    /// Connects to Redis and verifies the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionError`] if the URL is invalid or Redis
    /// does not answer.
    pub async fn connect(redis_url: &str, default_ttl_seconds: u64) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::ConnectionError(format!("Invalid Redis URL: {e}")))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Failed to connect to Redis: {e}")))?;
        conn.ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {e}")))?;

        info!(default_ttl = default_ttl_seconds, "Connected to Redis cache");

        Ok(Self {
            conn,
            default_ttl: default_ttl_seconds,
        })
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get_url(&self, short_code: &str) -> CacheResult<Option<String>> {
        let key = key_for(short_code);
        let mut conn = self.conn.clone();

        let url: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| operation_error("GET", &key, e))?;

        debug!(code = short_code, hit = url.is_some(), "Cache lookup");
        Ok(url)
    }

    async fn set_url(
        &self,
        short_code: &str,
        original_url: &str,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        let key = key_for(short_code);
        let ttl = ttl_seconds.unwrap_or(self.default_ttl);
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(&key, original_url, ttl)
            .await
            .map_err(|e| operation_error("SET", &key, e))
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        let key = key_for(short_code);
        let mut conn = self.conn.clone();

        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| operation_error("DEL", &key, e))
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
