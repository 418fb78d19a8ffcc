//! 弹性模式模块：在请求到达上游之前进行准入控制。
//!
//! # Resilience Primitives Module
//!
//! Admission control in front of the providers. The gateway counts requests
//! per identity in fixed 60 second windows held in the shared
//! [`KvStore`](crate::store::KvStore), so every replica sees the same count.
//!
//! ```rust
//! use llm_gateway::resilience::rate_limiter::RateLimiter;
//! use llm_gateway::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 100);
//! let decision = limiter.check("key-1", 2).await;
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 1);
//! # }
//! ```

pub mod rate_limiter;

pub use rate_limiter::{RateDecision, RateLimiter};
