//! Lock backend selection from configuration.

use std::sync::Arc;

use crate::config::settings::{LockBackend, LockConfig};
use crate::lock::{LockManager, LockResult, MemoryLockManager, RedisLockManager};

/// Build the configured lock backend.
pub async fn build_lock_manager(config: &LockConfig) -> LockResult<Arc<dyn LockManager>> {
    let manager: Arc<dyn LockManager> = match config.backend {
        LockBackend::Memory => Arc::new(MemoryLockManager::new()),
        LockBackend::Redis => Arc::new(RedisLockManager::new(&config.redis).await?),
    };

    tracing::info!(backend = manager.backend_name(), "Lock manager initialized");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_backend() {
        let manager = build_lock_manager(&LockConfig::default()).await.unwrap();
        assert_eq!(manager.backend_name(), "memory");
    }
}
