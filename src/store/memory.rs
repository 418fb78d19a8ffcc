//! In-process store with lazy expiry.

use super::{KvStore, WindowCount};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `KvStore` backed by a mutex-guarded map.
///
/// Expired entries are dropped when touched and on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(e) if e.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let live = entries.get(key).filter(|e| !e.is_expired(now));
        let (count, expires_at) = match live {
            Some(e) => {
                let current: u64 = e.value.parse().map_err(|_| {
                    Error::cache_store(format!("value at {} is not an integer", key))
                })?;
                (current + 1, e.expires_at)
            }
            None => (1, now + window),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(WindowCount {
            count,
            ttl: expires_at.saturating_duration_since(now),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
