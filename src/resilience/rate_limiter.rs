//! Fixed-window request limiter shared across gateway replicas.

use std::sync::Arc;
use std::time::Duration;

use crate::store::KvStore;

/// Length of one counting window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Limit used when an identity carries none (or a non-positive one).
pub const DEFAULT_LIMIT: u32 = 100;

const KEY_PREFIX: &str = "ratelimit:";

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Effective limit after defaulting.
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; only meaningful when rejected.
    pub retry_after_secs: u64,
}

impl RateDecision {
    fn open(limit: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            retry_after_secs: 0,
        }
    }
}

/// Per-identity request counter over a [`KvStore`].
///
/// Every check is one atomic increment; the window's expiry is set only by
/// the increment that opens it, so a steady stream of requests cannot keep
/// extending a window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    default_limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, default_limit: u32) -> Self {
        Self {
            store,
            default_limit: if default_limit == 0 {
                DEFAULT_LIMIT
            } else {
                default_limit
            },
            window: WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn key(identity_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, identity_id)
    }

    /// Effective limit for a configured per-identity value.
    pub fn effective_limit(&self, limit: i64) -> u32 {
        if limit <= 0 {
            self.default_limit
        } else {
            u32::try_from(limit).unwrap_or(u32::MAX)
        }
    }

    /// Counts one request against `identity_id`.
    ///
    /// A store failure admits the request.
    pub async fn check(&self, identity_id: &str, limit: i64) -> RateDecision {
        let limit = self.effective_limit(limit);
        let key = Self::key(identity_id);

        let window = match self.store.incr_window(&key, self.window).await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(
                    identity = identity_id,
                    store = self.store.name(),
                    error = %e,
                    "rate limit check failed, allowing request"
                );
                return RateDecision::open(limit);
            }
        };

        let allowed = window.count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(window.count) as u32;
        let retry_after_secs = if allowed {
            0
        } else {
            // round up so clients never retry into the same window
            let secs = window.ttl.as_secs() + u64::from(window.ttl.subsec_nanos() > 0);
            secs.max(1)
        };

        if !allowed {
            tracing::debug!(
                identity = identity_id,
                limit,
                count = window.count,
                retry_after_secs,
                "rate limit exceeded"
            );
        }

        RateDecision {
            allowed,
            limit,
            remaining,
            retry_after_secs,
        }
    }
}
