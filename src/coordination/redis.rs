//! Redis-backed coordination store for fleet-wide state.
//!
//! The blacklist is a single sorted set scored by expiry time (ms), so every
//! entry carries its own TTL and a range query returns only live members.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::backend::{CoordinationStore, StoreError, StoreResult};

/// Key prefix for serpwatch data in Redis.
const KEY_PREFIX: &str = "serpwatch:";

/// Redis-backed coordination store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379/0")
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }

    fn blacklist_key(&self) -> String {
        format!("{}bad_identities", KEY_PREFIX)
    }

    fn value_key(&self, key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

fn backend_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn mark_bad(&self, identity: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = self.blacklist_key();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let expires_ms = now_ms + ttl.as_millis() as i64;

        redis::pipe()
            .zrembyscore(&key, "-inf", now_ms as f64)
            .ignore()
            .zadd(&key, identity, expires_ms as f64)
            .ignore()
            .expire(&key, ttl.as_secs().max(1) as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend_err)?;

        Ok(())
    }

    async fn bad_identities(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let key = self.blacklist_key();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let live: Vec<String> = conn
            .zrangebyscore(&key, now_ms as f64, "+inf")
            .await
            .map_err(backend_err)?;

        Ok(live)
    }

    async fn clear_bad(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.blacklist_key())
            .await
            .map_err(backend_err)
    }

    async fn acquire_once(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(self.value_key(key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        Ok(result.is_some())
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.value_key(key), value, ttl.as_secs().max(1))
            .await
            .map_err(backend_err)
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(self.value_key(key))
            .await
            .map_err(backend_err)
    }
}
