//! Redis layer for ParkShare
//!
//! Provides the Redis connection wrapper and the leader lock that keeps each
//! periodic sweep down to one runner across every instance of the engine.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - `SET NX PX` leases with compare-and-delete release
//! - Error conversion to AppError
//!
//! # Example
//!
//! ```no_run
//! use park_cache::{RedisCache, RedisLeaderLock};
//! use park_core::traits::SweepLock;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//!     let lock = RedisLeaderLock::new(cache, 300);
//!
//!     if lock.try_acquire("payout").await? {
//!         // run the sweep
//!         lock.release("payout").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod leader;

pub use leader::RedisLeaderLock;

use park_core::error::AppError;
use redis::{aio::ConnectionManager, Client, RedisError, Script};
use tracing::{debug, error, warn};

/// Deletes the key only when it still holds the caller's token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis client with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis client
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
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

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    /// Set `key` to `token` with a millisecond lease, only if absent
    ///
    /// Returns `true` when the key was written.
    pub async fn set_nx_px(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool, AppError> {
        debug!("SET {} NX PX {}", key, ttl_ms);
        let mut conn = self.manager.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(reply.is_some())
    }

    /// Delete `key` only if it still holds `token`
    ///
    /// Returns `true` when the key was deleted.
    pub async fn delete_if_owner(&self, key: &str, token: &str) -> Result<bool, AppError> {
        debug!("Compare-and-delete {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    /// Flush all keys from the current database
    ///
    /// Destructive; tests only.
    #[cfg(test)]
    pub async fn flush_db(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to flush database: {}", e);
                AppError::Cache(format!("Flush failed: {}", e))
            })?;
        Ok(())
    }

    /// Convert RedisError to AppError
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
