//! Per-job mutual exclusion with TTL-bounded ownership.
//!
//! Two backends share the [`LockManager`] contract:
//! - memory: a process-local table, enough for a single scheduler instance
//! - redis: `SET NX PX` plus compare-and-delete scripts, for several instances
//!   sharing one Redis
//!
//! ```toml
//! [lock]
//! backend = "redis"
//!
//! [lock.redis]
//! url = "redis://127.0.0.1:6379"
//! pool_size = 8
//! connection_timeout = 5
//! key_prefix = "cadence:lock"
//! ```

mod error;
mod manager;
mod memory;
mod redis;
mod traits;

pub use error::{LockError, LockResult};
pub use manager::build_lock_manager;
pub use memory::MemoryLockManager;
pub use redis::RedisLockManager;
pub use traits::LockManager;
