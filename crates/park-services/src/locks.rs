//! In-process locks
//!
//! `ResourceLocks` serializes the check-then-write sequences of one engine
//! instance per parking resource; the storage layer's advisory lock covers
//! the multi-instance case. `LocalSweepGuard` is the single-instance
//! counterpart of the Redis leader lock.

use async_trait::async_trait;
use park_core::{traits::SweepLock, AppResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::constants::RESOURCE_LOCK_PRUNE_THRESHOLD;

/// Per-resource async mutexes keyed by resource id
#[derive(Default)]
pub struct ResourceLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `resource_id`; released when the guard drops
    pub async fn lock(&self, resource_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            if slots.len() >= RESOURCE_LOCK_PRUNE_THRESHOLD {
                // Only the map holds idle slots
                slots.retain(|_, m| Arc::strong_count(m) > 1);
            }
            slots.entry(resource_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Process-local single-runner guard
#[derive(Default)]
pub struct LocalSweepGuard {
    running: Mutex<HashSet<String>>,
}

impl LocalSweepGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweepLock for LocalSweepGuard {
    async fn try_acquire(&self, job: &str) -> AppResult<bool> {
        let acquired = self.running.lock().insert(job.to_string());
        if !acquired {
            debug!("Sweep {} already in flight", job);
        }
        Ok(acquired)
    }

    async fn release(&self, job: &str) -> AppResult<()> {
        self.running.lock().remove(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resource_lock_serializes_same_resource() {
        let locks = Arc::new(ResourceLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_resource_lock_independent_resources() {
        let locks = ResourceLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_local_sweep_guard() {
        let guard = LocalSweepGuard::new();
        assert!(guard.try_acquire("payout").await.unwrap());
        assert!(!guard.try_acquire("payout").await.unwrap());
        assert!(guard.try_acquire("expiry").await.unwrap());

        guard.release("payout").await.unwrap();
        assert!(guard.try_acquire("payout").await.unwrap());
    }
}
