//! In-process lock table backed by DashMap.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::lock::{LockManager, LockResult};

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.acquired_at) > self.ttl
    }
}

/// Single-process lock manager.
///
/// Expired entries are reclaimed lazily on the next acquire for the same
/// key; [`MemoryLockManager::purge_expired`] sweeps the whole table.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    locks: DashMap<String, LockEntry>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.locks.len();
        self.locks.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.locks.len())
    }

    /// Current live owner of `key`, if any.
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.locks
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.owner.clone())
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let fresh = LockEntry {
            owner: owner.to_string(),
            acquired_at: now,
            ttl,
        };

        match self.locks.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let held = slot.get();
                if held.owner == owner {
                    slot.insert(fresh);
                    Ok(true)
                } else if held.is_expired(now) {
                    tracing::debug!(
                        key,
                        previous_owner = %held.owner,
                        owner,
                        "Reclaiming expired lock"
                    );
                    slot.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> LockResult<bool> {
        Ok(self
            .locks
            .remove_if(key, |_, entry| entry.owner == owner)
            .is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_acquire_free_key() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());
        assert_eq!(locks.holder("job:1").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_contended_key_rejected() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());
        assert!(!locks.try_acquire("job:1", "b", TTL).await.unwrap());
        // other keys are independent
        assert!(locks.try_acquire("job:2", "b", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_acquire_refreshes_ttl() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());

        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());

        // 1.6s after the first acquire but only 0.8s after the refresh
        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(!locks.try_acquire("job:1", "b", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_is_reclaimable_by_other_owner() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(!locks.try_acquire("job:1", "b", TTL).await.unwrap());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(locks.try_acquire("job:1", "b", TTL).await.unwrap());
        assert_eq!(locks.holder("job:1").as_deref(), Some("b"));

        // the previous holder can no longer release it
        assert!(!locks.release("job:1", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL).await.unwrap());
        assert!(!locks.release("job:1", "b").await.unwrap());
        assert!(locks.release("job:1", "a").await.unwrap());
        assert!(!locks.release("job:1", "a").await.unwrap());
        assert!(locks.try_acquire("job:1", "b", TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let locks = Arc::new(MemoryLockManager::new());
        assert!(locks.try_acquire("job:1", "a", TTL * 10).await.unwrap());

        let releaser = {
            let locks = locks.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                locks.release("job:1", "a").await.unwrap()
            })
        };

        let acquired = locks
            .acquire("job:1", "b", Duration::from_secs(1), TTL)
            .await
            .unwrap();
        assert!(acquired);
        assert!(releaser.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_after_timeout() {
        let locks = MemoryLockManager::new();
        assert!(locks.try_acquire("job:1", "a", TTL * 10).await.unwrap());

        let start = Instant::now();
        let acquired = locks
            .acquire("job:1", "b", Duration::from_millis(300), TTL)
            .await
            .unwrap();
        assert!(!acquired);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let locks = MemoryLockManager::new();
        locks.try_acquire("short", "a", Duration::from_millis(100)).await.unwrap();
        locks.try_acquire("long", "a", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(locks.purge_expired(), 1);
        assert!(locks.holder("short").is_none());
        assert!(locks.holder("long").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let locks = Arc::new(MemoryLockManager::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .try_acquire("job:1", &format!("owner-{i}"), TTL)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
