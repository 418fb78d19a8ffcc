//! Provider 驱动抽象层 — 通过 trait 实现多厂商 API 适配的动态分发
//!
//! Provider driver abstraction layer. Each upstream API style (OpenAI,
//! Anthropic, Gemini) has a concrete driver that translates the unified
//! [`ChatRequest`] into the provider's wire format and back. The router holds
//! drivers as `Arc<dyn ProviderDriver>`, so the same dispatch code serves every
//! provider.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, ErrorContext};
use crate::error_code::ErrorClass;
use crate::pipeline::{self, DeltaStream, EventNormalizer};
use crate::transport::HttpTransport;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;

pub use anthropic::AnthropicDriver;
pub use gemini::GeminiDriver;
pub use openai::OpenAiDriver;

/// Upstream provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
        }
    }

    /// Model-name prefix served by this provider.
    pub fn model_prefix(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "gpt-",
            ProviderId::Anthropic => "claude-",
            ProviderId::Google => "gemini-",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" => Ok(ProviderId::Anthropic),
            "google" | "gemini" => Ok(ProviderId::Google),
            other => Err(Error::configuration_with_context(
                format!("unknown provider '{}'", other),
                ErrorContext::new().with_details("expected one of: openai, anthropic, google"),
            )),
        }
    }
}

/// Pure prefix rule: which provider serves `model`, if any.
pub fn detect_provider(model: &str) -> Option<ProviderId> {
    ProviderId::ALL
        .into_iter()
        .find(|p| model.starts_with(p.model_prefix()))
}

/// Provider-specific HTTP request, ready for [`HttpTransport::send`].
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Full URL including any query string.
    pub url: String,
    /// Request headers (auth, versioning).
    pub headers: HashMap<String, String>,
    /// Serialized JSON request body.
    pub body: Value,
    /// Whether streaming is requested.
    pub stream: bool,
}

/// Core trait for provider-specific API adaptation.
///
/// Implementors supply the pure translation steps; `call` and `stream` are
/// provided on top of them and the shared transport. Drivers hold no
/// per-request state, so one instance serves concurrent calls.
#[async_trait]
pub trait ProviderDriver: Send + Sync + fmt::Debug {
    fn provider(&self) -> ProviderId;

    /// Whether `model` is routed to this driver by the prefix rule.
    fn supports(&self, model: &str) -> bool {
        detect_provider(model) == Some(self.provider())
    }

    /// Build a provider-specific HTTP request from the unified request.
    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<DriverRequest>;

    /// Parse a non-streaming response body into the unified format.
    fn parse_response(&self, request: &ChatRequest, body: &Value) -> Result<ChatResponse>;

    /// Translation of one streamed `data:` payload.
    fn stream_normalizer(&self) -> EventNormalizer;

    fn transport(&self) -> &HttpTransport;

    /// Non-streaming completion.
    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let req = self.build_request(request, false)?;
        let body = self.transport().send_json(self.provider(), &req).await?;
        let response = self.parse_response(request, &body)?;
        tracing::debug!(
            provider = %self.provider(),
            model = %request.model,
            duration_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "provider call completed"
        );
        Ok(response)
    }

    /// Streaming completion, normalized to unified delta chunks.
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let req = self.build_request(request, true)?;
        let bytes = self.transport().send_stream(self.provider(), &req).await?;
        tracing::debug!(provider = %self.provider(), model = %request.model, "provider stream opened");
        Ok(pipeline::normalize(
            bytes,
            self.provider(),
            self.stream_normalizer(),
        ))
    }
}

/// Error for a 2xx body that does not have the provider's documented shape.
pub(crate) fn malformed_response(provider: ProviderId, detail: impl Into<String>) -> Error {
    Error::Upstream {
        provider,
        status: 200,
        class: ErrorClass::Other,
        message: format!("malformed response: {}", detail.into()),
    }
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Factory function to create the driver for a provider.
///
/// `base_url` overrides the provider's public endpoint (proxies, tests).
pub fn create_driver(
    provider: ProviderId,
    api_key: impl Into<String>,
    base_url: Option<&str>,
    transport: HttpTransport,
) -> Arc<dyn ProviderDriver> {
    match provider {
        ProviderId::OpenAi => Arc::new(OpenAiDriver::new(api_key, base_url, transport)),
        ProviderId::Anthropic => Arc::new(AnthropicDriver::new(api_key, base_url, transport)),
        ProviderId::Google => Arc::new(GeminiDriver::new(api_key, base_url, transport)),
    }
}
