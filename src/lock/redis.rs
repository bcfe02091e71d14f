//! Redis lock backend using a bb8 connection pool.
//!
//! Ownership is the stored value, expiry is the key's PX TTL, so Redis
//! itself performs the reclaim of abandoned locks.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};

use crate::config::settings::RedisLockConfig;
use crate::lock::{LockError, LockManager, LockResult};

type RedisPool = Pool<Client>;

/// Take the key if absent, or refresh it if `owner` already holds it.
const ACQUIRE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 1
elseif current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
";

/// Delete the key only when `owner` holds it.
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

pub struct RedisLockManager {
    pool: RedisPool,
    key_prefix: String,
    acquire_script: Script,
    release_script: Script,
}

impl RedisLockManager {
    pub async fn new(config: &RedisLockConfig) -> LockResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| LockError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout))
            .build(client)
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            acquire_script: Script::new(ACQUIRE_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    async fn get_conn(&self) -> LockResult<PooledConnection<'_, Client>> {
        self.pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

/// PX takes whole milliseconds and rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;

        let acquired: i64 = self
            .acquire_script
            .key(self.prefixed_key(key))
            .arg(owner)
            .arg(ttl_millis(ttl))
            .invoke_async(conn_ref)
            .await
            .map_err(|e| LockError::Operation(e.to_string()))?;

        Ok(acquired == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> LockResult<bool> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;

        let removed: i64 = self
            .release_script
            .key(self.prefixed_key(key))
            .arg(owner)
            .invoke_async(conn_ref)
            .await
            .map_err(|e| LockError::Operation(e.to_string()))?;

        Ok(removed == 1)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
