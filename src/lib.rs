//! # llm-gateway
//!
//! 统一的大模型请求网关：一个 OpenAI 兼容接口，背后是 OpenAI、Anthropic 与 Gemini 三家上游。
//!
//! A request gateway that exposes one unified chat-completion API in front of
//! three heterogeneous LLM providers.
//!
//! ## Overview
//!
//! - **Provider drivers** translate the unified request into each provider's
//!   wire format and back ([`drivers`]).
//! - **Failover** retries transient provider failures on equivalent models
//!   from other providers ([`routing`]).
//! - **Streaming normalization** turns three incremental protocols into one
//!   sequence of delta chunks ([`pipeline`]).
//! - **Exact-match caching** and a **fixed-window rate limiter** gate traffic
//!   before it reaches a provider ([`cache`], [`resilience`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_gateway::drivers::{create_driver, ProviderId};
//! use llm_gateway::gateway::Gateway;
//! use llm_gateway::identity::Identity;
//! use llm_gateway::routing::{FailoverRouter, FailoverTable, ProviderRegistry};
//! use llm_gateway::store::MemoryStore;
//! use llm_gateway::transport::HttpTransport;
//! use llm_gateway::{ChatRequest, Message};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> llm_gateway::Result<()> {
//!     let transport = HttpTransport::new(Duration::from_secs(60))?;
//!     let registry = ProviderRegistry::new()
//!         .with_driver(create_driver(ProviderId::OpenAi, "sk-...", None, transport));
//!     let router = FailoverRouter::new(registry, FailoverTable::defaults());
//!     let gateway = Gateway::builder(router, Arc::new(MemoryStore::new())).build();
//!
//!     let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("2+2?")]);
//!     let done = gateway.complete(&Identity::new("local"), request).await?;
//!     println!("{:?} cost={}", done.response.content(), done.response.cost_usd);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Unified request, response and delta types |
//! | [`drivers`] | OpenAI, Anthropic and Gemini translation |
//! | [`transport`] | Shared HTTP client |
//! | [`pipeline`] | SSE framing and stream normalization |
//! | [`routing`] | Provider registry and failover router |
//! | [`store`] | Redis / in-memory key-value store |
//! | [`cache`] | Fingerprint cache |
//! | [`resilience`] | Fixed-window rate limiter |
//! | [`pricing`] | Per-model prices and cost |
//! | [`telemetry`] | Request logs and background queue |
//! | [`identity`] | API-key identities |
//! | [`config`] | YAML + environment configuration |
//! | [`gateway`] | Per-request orchestration |
//! | [`server`] | axum HTTP surface |

pub mod cache;
pub mod config;
pub mod drivers;
pub mod error_code;
pub mod gateway;
pub mod identity;
pub mod pipeline;
pub mod pricing;
pub mod resilience;
pub mod routing;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use drivers::{ProviderDriver, ProviderId};
pub use gateway::{Completion, Gateway, GatewayStream};
pub use types::{
    ChatRequest, ChatResponse, DeltaChunk, Message, MessageRole, StreamEvent, Usage,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
