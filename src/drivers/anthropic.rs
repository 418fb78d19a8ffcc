//! Anthropic Messages API 驱动 — 实现 Anthropic 特有的请求/响应格式转换
//!
//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - Response content is a list of typed blocks; text blocks are concatenated.
//! - Streaming announces the message with `message_start` and carries text in
//!   `content_block_delta` events.
//! - `max_tokens` is required, not optional.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::pipeline::EventNormalizer;
use crate::transport::HttpTransport;
use crate::types::{ChatRequest, ChatResponse, DeltaChunk, MessageRole, StreamEvent, Usage};
use crate::Result;

use super::{malformed_response, trim_base_url, DriverRequest, ProviderDriver, ProviderId};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API driver.
#[derive(Debug)]
pub struct AnthropicDriver {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
}

impl AnthropicDriver {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>, transport: HttpTransport) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: trim_base_url(base_url.unwrap_or(DEFAULT_BASE_URL)),
            transport,
        }
    }

    /// Extract the system prompt and the remaining turns.
    /// When several system messages are present the last one wins.
    fn split_system_messages(request: &ChatRequest) -> (Option<String>, Vec<Value>) {
        let mut system: Option<String> = None;
        let mut turns: Vec<Value> = Vec::new();

        for m in &request.messages {
            match m.role {
                MessageRole::System => system = Some(m.content.clone()),
                MessageRole::User | MessageRole::Assistant => {
                    turns.push(serde_json::json!({
                        "role": m.role.as_str(),
                        "content": m.content,
                    }));
                }
            }
        }

        (system, turns)
    }
}

fn normalize_stop_reason(reason: Option<&str>) -> String {
    match reason {
        None | Some("end_turn") | Some("stop_sequence") => "stop".to_string(),
        Some("max_tokens") => "length".to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl ProviderDriver for AnthropicDriver {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<DriverRequest> {
        let (system, turns) = Self::split_system_messages(request);

        let max_tokens = match request.max_tokens {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_TOKENS,
        };

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": turns,
            "max_tokens": max_tokens,
        });

        if let Some(sys) = system {
            body["system"] = Value::String(sys);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(p) = request.top_p {
            body["top_p"] = serde_json::json!(p);
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }

        let mut headers = HashMap::new();
        headers.insert("x-api-key".into(), self.api_key.clone());
        headers.insert("anthropic-version".into(), API_VERSION.into());

        Ok(DriverRequest {
            url: format!("{}/v1/messages", self.base_url),
            headers,
            body,
            stream,
        })
    }

    fn parse_response(&self, request: &ChatRequest, body: &Value) -> Result<ChatResponse> {
        // { id, model, content: [{type: "text", text}], stop_reason, usage }
        let blocks = body
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| malformed_response(ProviderId::Anthropic, "missing content"))?;

        let content: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();

        let finish_reason =
            normalize_stop_reason(body.get("stop_reason").and_then(|v| v.as_str()));

        let usage = body
            .get("usage")
            .map(|u| {
                Usage::new(
                    u["input_tokens"].as_u64().unwrap_or(0),
                    u["output_tokens"].as_u64().unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(ChatResponse::assistant(
            body.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
            body.get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&request.model),
            content,
            finish_reason,
            usage,
        ))
    }

    fn stream_normalizer(&self) -> EventNormalizer {
        normalize_event
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

/// Anthropic stream events: `message_start` announces the assistant role and
/// `content_block_delta` carries text. Everything else (ping, block
/// start/stop, message_delta, message_stop) produces nothing.
pub fn normalize_event(data: &str) -> Result<Option<StreamEvent>> {
    let v: Value = serde_json::from_str(data)?;
    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "message_start" => {
            let mut chunk = DeltaChunk::role(MessageRole::Assistant);
            chunk.id = v
                .pointer("/message/id")
                .and_then(|i| i.as_str())
                .map(String::from);
            chunk.model = v
                .pointer("/message/model")
                .and_then(|m| m.as_str())
                .map(String::from);
            Ok(Some(StreamEvent::Chunk(chunk)))
        }
        "content_block_delta" => match v.pointer("/delta/text").and_then(|t| t.as_str()) {
            Some(text) if !text.is_empty() => Ok(Some(StreamEvent::Chunk(DeltaChunk::content(text)))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}
