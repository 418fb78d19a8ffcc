//! 共享键值存储：缓存与限流共用的外部存储抽象（Redis 或进程内内存）。
//!
//! # Key-Value Store
//!
//! The gateway's only shared mutable state lives behind [`KvStore`]: cached
//! responses and rate-limit windows. Two backends ship:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`RedisStore`] | Production; shared across gateway replicas |
//! | [`MemoryStore`] | Single process, tests |
//!
//! `incr_window` is the one operation that must be atomic: it increments a
//! counter and, only on the increment that created the key, sets its expiry.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Counter state after an atomic window increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Value after the increment.
    pub count: u64,
    /// Time until the window expires.
    pub ttl: Duration,
}

#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional overwrite with expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically increments `key`, setting `window` as its expiry only when
    /// this increment created it.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount>;

    fn name(&self) -> &'static str;
}
