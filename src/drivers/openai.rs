//! OpenAI Chat Completions 驱动 — 统一格式即 OpenAI 格式，基本直通
//!
//! OpenAI chat completions driver. The unified format is OpenAI-shaped, so
//! translation is mostly passthrough: messages are forwarded as-is, optional
//! sampling fields only when set, and stream chunks already are delta chunks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::pipeline::EventNormalizer;
use crate::transport::HttpTransport;
use crate::types::{ChatRequest, ChatResponse, Choice, DeltaChunk, Message, StreamEvent, Usage};
use crate::Result;

use super::{malformed_response, trim_base_url, DriverRequest, ProviderDriver, ProviderId};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat completions driver.
#[derive(Debug)]
pub struct OpenAiDriver {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
}

impl OpenAiDriver {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>, transport: HttpTransport) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: trim_base_url(base_url.unwrap_or(DEFAULT_BASE_URL)),
            transport,
        }
    }
}

#[async_trait]
impl ProviderDriver for OpenAiDriver {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<DriverRequest> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
        });

        if let Some(t) = request.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(mt) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(mt);
        }
        if let Some(p) = request.top_p {
            body["top_p"] = serde_json::json!(p);
        }
        if stream {
            body["stream"] = Value::Bool(true);
            // Final chunk carries usage; needed to price streamed requests.
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        let mut headers = HashMap::new();
        headers.insert("authorization".into(), format!("Bearer {}", self.api_key));

        Ok(DriverRequest {
            url: format!("{}/v1/chat/completions", self.base_url),
            headers,
            body,
            stream,
        })
    }

    fn parse_response(&self, request: &ChatRequest, body: &Value) -> Result<ChatResponse> {
        let raw_choices = body
            .get("choices")
            .and_then(|v| v.as_array())
            .ok_or_else(|| malformed_response(ProviderId::OpenAi, "missing choices"))?;

        let mut choices = Vec::with_capacity(raw_choices.len());
        for (i, c) in raw_choices.iter().enumerate() {
            let message: Message = match c.get("message") {
                Some(m) => Message {
                    role: m
                        .get("role")
                        .cloned()
                        .and_then(|r| serde_json::from_value(r).ok())
                        .unwrap_or(crate::types::MessageRole::Assistant),
                    content: m
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                },
                None => {
                    return Err(malformed_response(
                        ProviderId::OpenAi,
                        format!("choice {} has no message", i),
                    ))
                }
            };
            choices.push(Choice {
                index: c
                    .get("index")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(i as u64) as u32,
                message,
                finish_reason: c
                    .get("finish_reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("stop")
                    .to_string(),
            });
        }

        let usage = body
            .get("usage")
            .map(|u| Usage {
                prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
                completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
                total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
            })
            .unwrap_or_default();

        let mut response = ChatResponse::assistant(
            body.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
            body.get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(&request.model),
            "",
            "stop",
            usage,
        );
        if let Some(created) = body.get("created").and_then(|v| v.as_i64()) {
            response.created = created;
        }
        response.choices = choices;
        Ok(response)
    }

    fn stream_normalizer(&self) -> EventNormalizer {
        normalize_event
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

/// OpenAI stream events already are delta chunks; `[DONE]` ends the stream.
pub fn normalize_event(data: &str) -> Result<Option<StreamEvent>> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    let chunk: DeltaChunk = serde_json::from_str(data)?;
    if chunk.choices.is_empty() && chunk.usage.is_none() {
        return Ok(None);
    }
    Ok(Some(StreamEvent::Chunk(chunk)))
}
