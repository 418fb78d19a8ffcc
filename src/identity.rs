//! Client identities resolved from bearer tokens.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GatewayConfig;
use crate::{Error, Result};

/// The caller of a request, with its per-key policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    /// Non-positive means "use the gateway default".
    pub rate_limit_per_minute: i64,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            rate_limit_per_minute: 0,
            cache_enabled: true,
            cache_ttl_seconds: 3600,
        }
    }

    pub fn with_rate_limit(mut self, per_minute: i64) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    pub fn with_cache(mut self, enabled: bool, ttl_seconds: u64) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl_seconds = ttl_seconds;
        self
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync + std::fmt::Debug {
    /// Identity owning `token`; unknown tokens are [`Error::Unauthorized`].
    async fn resolve(&self, token: &str) -> Result<Identity>;

    /// Records that `identity_id` was just used.
    async fn touch(&self, identity_id: &str) -> Result<()>;
}

/// Hex SHA-256 of a raw token.
pub fn hash_token(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Resolver over a fixed key list; only token hashes are kept in memory.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    by_hash: HashMap<String, Identity>,
    last_used: Mutex<HashMap<String, i64>>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity` for the token whose SHA-256 hex is `token_hash`.
    pub fn with_hashed_key(mut self, token_hash: impl Into<String>, identity: Identity) -> Self {
        self.by_hash
            .insert(token_hash.into().to_ascii_lowercase(), identity);
        self
    }

    pub fn with_key(self, token: &str, identity: Identity) -> Self {
        self.with_hashed_key(hash_token(token), identity)
    }

    /// Builds identities from `api_keys`, filling unset policy from the
    /// gateway-wide defaults.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut resolver = Self::new();
        for key in &config.api_keys {
            let hash = match (key.key.as_deref(), key.key_sha256.as_deref()) {
                (Some(raw), _) if !raw.is_empty() => hash_token(raw),
                (_, Some(h)) => h.to_ascii_lowercase(),
                _ => continue,
            };
            let id = key
                .id
                .clone()
                .unwrap_or_else(|| format!("key_{}", hash.chars().take(12).collect::<String>()));
            let identity = Identity {
                id,
                name: key.name.clone(),
                rate_limit_per_minute: key.rate_limit_per_minute.unwrap_or(0),
                cache_enabled: key.cache_enabled.unwrap_or(config.cache.enabled),
                cache_ttl_seconds: key.cache_ttl_seconds.unwrap_or(config.cache.ttl_seconds),
            };
            resolver = resolver.with_hashed_key(hash, identity);
        }
        resolver
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Unix seconds of the last recorded use.
    pub fn last_used(&self, identity_id: &str) -> Option<i64> {
        self.last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identity_id)
            .copied()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity> {
        self.by_hash
            .get(&hash_token(token))
            .cloned()
            .ok_or_else(|| Error::unauthorized("invalid API key"))
    }

    async fn touch(&self, identity_id: &str) -> Result<()> {
        self.last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identity_id.to_string(), crate::types::response::unix_now());
        Ok(())
    }
}
