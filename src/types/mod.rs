//! 类型系统模块：网关统一的请求、响应与流式增量类型。
//!
//! # Types Module
//!
//! The unified chat-completion shapes that every provider driver translates
//! to and from.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatRequest`] | Unified request (model, messages, sampling knobs, stream flag) |
//! | [`ChatResponse`] | Unified non-streaming response with usage, latency and cost |
//! | [`DeltaChunk`] | Canonical incremental unit of a streamed response |
//! | [`StreamEvent`] | Chunk or terminal `Done` sentinel |
//!
//! ## Example
//!
//! ```rust
//! use llm_gateway::types::{ChatRequest, Message};
//!
//! let req = ChatRequest::new("gpt-4o-mini", vec![
//!     Message::system("Be brief."),
//!     Message::user("2+2?"),
//! ])
//! .with_temperature(0.0);
//! assert!(req.validate().is_ok());
//! ```

pub mod events;
pub mod message;
pub mod request;
pub mod response;

pub use events::{Delta, DeltaChunk, StreamChoice, StreamEvent};
pub use message::{Message, MessageRole};
pub use request::ChatRequest;
pub use response::{ChatResponse, Choice, Usage};
