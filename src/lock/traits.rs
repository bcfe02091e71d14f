//! LockManager trait definition.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;

use crate::lock::LockResult;

/// Base delay between acquire attempts while waiting for a held lock
pub const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound of the random extra delay added to each retry
const RETRY_JITTER_MS: u64 = 20;

/// Short-lived mutual exclusion keyed by job identity.
///
/// At most one live (non-expired) owner exists per key. A lock whose TTL
/// has elapsed may be taken over by any other owner on its next attempt.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Single attempt. Succeeds when the key is free, expired, or already
    /// held by `owner` (in which case the TTL is refreshed).
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> LockResult<bool>;

    /// Release the lock if `owner` holds it. Returns `false` otherwise.
    async fn release(&self, key: &str, owner: &str) -> LockResult<bool>;

    /// Short name for logs
    fn backend_name(&self) -> &'static str;

    /// Retry `try_acquire` at short jittered intervals for up to `timeout`.
    ///
    /// A zero timeout makes exactly one attempt.
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        timeout: Duration,
        ttl: Duration,
    ) -> LockResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire(key, owner, ttl).await? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }

            let jitter = Duration::from_millis(rand::rng().random_range(0..=RETRY_JITTER_MS));
            let pause = (RETRY_INTERVAL + jitter).min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}
