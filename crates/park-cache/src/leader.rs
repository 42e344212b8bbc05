//! Redis-backed single-runner guard for the periodic sweeps

use crate::keys::sweep_lock_key;
use crate::RedisCache;
use async_trait::async_trait;
use park_core::error::AppError;
use park_core::traits::SweepLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Leader lock shared by every engine instance pointing at the same Redis.
///
/// Each instance writes its own token, so a lease that expired and was taken
/// over is never released by the previous holder.
#[derive(Clone)]
pub struct RedisLeaderLock {
    cache: RedisCache,
    token: String,
    ttl_ms: u64,
}

impl RedisLeaderLock {
    pub fn new(cache: RedisCache, ttl_secs: u64) -> Self {
        Self {
            cache,
            token: Uuid::new_v4().to_string(),
            ttl_ms: ttl_secs.saturating_mul(1000),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl SweepLock for RedisLeaderLock {
    async fn try_acquire(&self, job: &str) -> Result<bool, AppError> {
        let key = sweep_lock_key(job);
        let acquired = self.cache.set_nx_px(&key, &self.token, self.ttl_ms).await?;
        if acquired {
            debug!("Acquired sweep lease {}", key);
        } else {
            info!("Sweep {} is running elsewhere, skipping", job);
        }
        Ok(acquired)
    }

    async fn release(&self, job: &str) -> Result<(), AppError> {
        let key = sweep_lock_key(job);
        if !self.cache.delete_if_owner(&key, &self.token).await? {
            warn!("Sweep lease {} had already expired or changed owner", key);
        }
        Ok(())
    }
}
