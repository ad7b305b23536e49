//! Redis caching layer for the Yeastar connector
//!
//! Implements the `CacheService` trait from yeastar-core. The connector
//! caches extension resolutions so that a burst of webhooks for the same
//! agent does not hit the mapping table every time.
//!
//! # Example
//!
//! ```no_run
//! use yeastar_cache::{keys, RedisCache};
//! use yeastar_core::traits::CacheService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//!     cache.set(&keys::agent_key("101"), "alice", 300).await?;
//!     assert_eq!(cache.get("agent:101").await?, Some("alice".to_string()));
//!     Ok(())
//! }
//! ```

pub mod keys;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use yeastar_core::error::AppError;
use yeastar_core::traits::CacheService;

/// Redis cache backed by a multiplexed ConnectionManager
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the URL is invalid or the
    /// server cannot be reached
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established");
        Ok(Self { manager })
    }

    /// Ping the server
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();
        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;
        Ok(deleted > 0)
    }
}

/// In-process cache with per-entry expiry
///
/// Used when no Redis URL is configured, and by tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let expires = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Read and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheService,
    key: &str,
) -> Result<Option<T>, AppError> {
    match cache.get(key).await? {
        Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
            error!("Failed to deserialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Deserialization failed: {}", e))
        }),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheService,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), AppError> {
    let json = serde_json::to_string(value).map_err(|e| {
        error!("Failed to serialize value for key {}: {}", key, e);
        AppError::Serialization(format!("Serialization failed: {}", e))
    })?;
    cache.set(key, &json, ttl_secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use yeastar_core::models::AgentResolution;

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_delete() {
        let cache = MemoryCache::new();
        cache.set("agent:101", "alice", 60).await.unwrap();
        assert_eq!(cache.get("agent:101").await.unwrap().as_deref(), Some("alice"));

        assert!(cache.delete("agent:101").await.unwrap());
        assert!(!cache.delete("agent:101").await.unwrap());
        assert_eq!(cache.get("agent:101").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("agent:102", "bob", 0).await.unwrap();
        assert_eq!(cache.get("agent:102").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = MemoryCache::new();
        let key = keys::agent_key("103");

        set_json(&cache, &key, &AgentResolution::Unmapped, 60)
            .await
            .unwrap();
        let cached: Option<AgentResolution> = get_json(&cache, &key).await.unwrap();
        assert_eq!(cached, Some(AgentResolution::Unmapped));

        cache.set(&key, "not json", 60).await.unwrap();
        assert!(get_json::<AgentResolution>(&cache, &key).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_redis_set_get_delete() {
        let cache = RedisCache::new("redis://127.0.0.1:6379").await.unwrap();
        cache.ping().await.unwrap();

        cache.set("agent:test", "carol", 60).await.unwrap();
        assert_eq!(cache.get("agent:test").await.unwrap().as_deref(), Some("carol"));
        assert!(cache.delete("agent:test").await.unwrap());
    }
}
