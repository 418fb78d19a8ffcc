//! 响应缓存模块：基于请求指纹的精确匹配缓存，减少重复的上游调用。
//!
//! # Response Caching Module
//!
//! Exact-match caching of non-streaming completions. Two requests share a
//! cache entry only when model, ordered messages and every sampling option
//! are identical.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Read-through / write-through cache over a [`KvStore`](crate::store::KvStore) |
//! | [`CacheStats`] | Hit/miss/write/error counters |
//! | [`CacheKey`] | `cache:exact:<sha256>` store key |
//! | [`fingerprint`] | Request → key |
//!
//! ## Example
//!
//! ```rust
//! use llm_gateway::cache::fingerprint;
//! use llm_gateway::types::{ChatRequest, Message};
//!
//! let a = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);
//! let b = a.clone().streaming(true);
//! assert_eq!(fingerprint(&a), fingerprint(&b));
//! assert!(fingerprint(&a).as_str().starts_with("cache:exact:"));
//! ```

mod key;
mod manager;

pub use key::{canonical_string, fingerprint, CacheKey, KEY_PREFIX};
pub use manager::{CacheStats, ResponseCache};
