//! Gemini Generate API 驱动 — 实现 Google Gemini 特有的请求/响应格式转换
//!
//! Google Gemini generateContent API driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System messages have no
//!   role of their own here and are demoted to user turns.
//! - `generationConfig` wraps temperature, top_p and max_tokens
//!   (→ `maxOutputTokens`), and is only sent when one of them is set.
//! - API key is passed as `?key=` query parameter, not in headers.
//! - Streaming uses `streamGenerateContent?alt=sse`; each event is a full
//!   candidate snapshot.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::pipeline::EventNormalizer;
use crate::transport::HttpTransport;
use crate::types::response::unix_now;
use crate::types::{
    ChatRequest, ChatResponse, Delta, DeltaChunk, MessageRole, StreamChoice, StreamEvent, Usage,
};
use crate::Result;

use super::{trim_base_url, DriverRequest, ProviderDriver, ProviderId};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini generateContent API driver.
#[derive(Debug)]
pub struct GeminiDriver {
    api_key: String,
    base_url: String,
    transport: HttpTransport,
}

impl GeminiDriver {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>, transport: HttpTransport) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: trim_base_url(base_url.unwrap_or(DEFAULT_BASE_URL)),
            transport,
        }
    }

    fn contents(request: &ChatRequest) -> Vec<Value> {
        request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    MessageRole::User | MessageRole::System => "user",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }],
                })
            })
            .collect()
    }

    fn generation_config(request: &ChatRequest) -> Option<Value> {
        if request.temperature.is_none() && request.top_p.is_none() && request.max_tokens.is_none()
        {
            return None;
        }
        let mut cfg = serde_json::json!({});
        if let Some(t) = request.temperature {
            cfg["temperature"] = serde_json::json!(t);
        }
        if let Some(p) = request.top_p {
            cfg["topP"] = serde_json::json!(p);
        }
        if let Some(mt) = request.max_tokens {
            cfg["maxOutputTokens"] = serde_json::json!(mt);
        }
        Some(cfg)
    }
}

/// Concatenated text of candidate 0.
fn candidate_text(candidate: &Value) -> String {
    candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

fn usage_metadata(body: &Value) -> Option<Usage> {
    let meta = body.get("usageMetadata")?;
    Some(Usage {
        prompt_tokens: meta["promptTokenCount"].as_u64().unwrap_or(0),
        completion_tokens: meta["candidatesTokenCount"].as_u64().unwrap_or(0),
        total_tokens: meta["totalTokenCount"].as_u64().unwrap_or(0),
    })
}

#[async_trait]
impl ProviderDriver for GeminiDriver {
    fn provider(&self) -> ProviderId {
        ProviderId::Google
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<DriverRequest> {
        if request.has_system_message() {
            tracing::warn!(
                model = %request.model,
                "gemini has no system role; system message sent as a user turn"
            );
        }

        let mut body = serde_json::json!({
            "contents": Self::contents(request),
        });
        if let Some(cfg) = Self::generation_config(request) {
            body["generationConfig"] = cfg;
        }

        let url = if stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?key={}&alt=sse",
                self.base_url, request.model, self.api_key
            )
        } else {
            format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, request.model, self.api_key
            )
        };

        Ok(DriverRequest {
            url,
            headers: HashMap::new(),
            body,
            stream,
        })
    }

    fn parse_response(&self, request: &ChatRequest, body: &Value) -> Result<ChatResponse> {
        let content = body
            .pointer("/candidates/0")
            .map(candidate_text)
            .unwrap_or_default();

        Ok(ChatResponse::assistant(
            format!("gemini-{}", unix_now()),
            request.model.clone(),
            content,
            "stop",
            usage_metadata(body).unwrap_or_default(),
        ))
    }

    fn stream_normalizer(&self) -> EventNormalizer {
        normalize_event
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

/// Gemini stream events are forwarded as snapshots: the candidate text is
/// sent verbatim as the delta content, without diffing against earlier
/// events.
pub fn normalize_event(data: &str) -> Result<Option<StreamEvent>> {
    let v: Value = serde_json::from_str(data)?;

    let mut choices = Vec::new();
    if let Some(candidate) = v.pointer("/candidates/0") {
        let text = candidate_text(candidate);
        let has_role = candidate
            .pointer("/content/role")
            .and_then(|r| r.as_str())
            .map(|r| !r.is_empty())
            .unwrap_or(false);
        let finished = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(|r| !r.is_empty())
            .unwrap_or(false);

        choices.push(StreamChoice {
            index: candidate.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32,
            delta: Delta {
                role: has_role.then_some(MessageRole::Assistant),
                content: (!text.is_empty()).then_some(text),
            },
            finish_reason: finished.then(|| "stop".to_string()),
        });
    }

    let usage = usage_metadata(&v).filter(|u| u.total_tokens > 0);
    if choices.is_empty() && usage.is_none() {
        return Ok(None);
    }

    let mut chunk = DeltaChunk::new(choices);
    chunk.usage = usage;
    Ok(Some(StreamEvent::Chunk(chunk)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    fn driver(base: Option<&str>) -> GeminiDriver {
        GeminiDriver::new(
            "g-key",
            base,
            HttpTransport::new(Duration::from_secs(5)).unwrap(),
        )
    }

    #[test]
    fn test_role_mapping_and_system_demotion() {
        let req = ChatRequest::new(
            "gemini-2.5-flash",
            vec![
                Message::system("Be brief."),
                Message::user("Hi"),
                Message::assistant("Hello"),
            ],
        );
        let built = driver(None).build_request(&req, false).unwrap();
        let contents = built.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Be brief.");
        assert_eq!(contents[1]["role"], "user");
        assert_eq!(contents[2]["role"], "model");
        assert!(built.body.get("generationConfig").is_none());
        assert_eq!(
            built.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=g-key"
        );
    }

    #[test]
    fn test_generation_config_only_when_set() {
        let req = ChatRequest::new("gemini-2.5-pro", vec![Message::user("Hi")]).with_max_tokens(32);
        let built = driver(None).build_request(&req, true).unwrap();
        let cfg = &built.body["generationConfig"];
        assert_eq!(cfg["maxOutputTokens"], 32);
        assert!(cfg.get("temperature").is_none());
        assert!(cfg.get("topP").is_none());
        assert!(built.url.ends_with(":streamGenerateContent?key=g-key&alt=sse"));
    }

    #[test]
    fn test_parse_response() {
        let req = ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]);
        let body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        });
        let resp = driver(None).parse_response(&req, &body).unwrap();
        assert!(resp.id.starts_with("gemini-"));
        assert_eq!(resp.model, "gemini-2.5-flash");
        assert_eq!(resp.content(), Some("Hello"));
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert_eq!(resp.usage, Usage::new(3, 2));
    }

    #[test]
    fn test_normalize_event_snapshot() {
        let event = normalize_event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello wor"}]}}]}"#,
        )
        .unwrap()
        .unwrap();
        let chunk = event.as_chunk().unwrap();
        assert_eq!(chunk.text(), "Hello wor");
        assert_eq!(chunk.choices[0].delta.role, Some(MessageRole::Assistant));
        assert!(chunk.choices[0].finish_reason.is_none());
        assert!(chunk.usage.is_none());

        let last = normalize_event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"ld"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":3,"totalTokenCount":5}}"#,
        )
        .unwrap()
        .unwrap();
        let last = last.as_chunk().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.unwrap().total_tokens, 5);

        assert_eq!(normalize_event(r#"{"usageMetadata":{"totalTokenCount":0}}"#).unwrap(), None);
        assert!(normalize_event("{").is_err());
    }

    #[tokio::test]
    async fn test_call_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "g-key".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pong"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":1,"candidatesTokenCount":1,"totalTokenCount":2}}"#,
            )
            .create_async()
            .await;

        let url = server.url();
        let req = ChatRequest::new("gemini-2.5-flash", vec![Message::user("ping")]);
        let resp = driver(Some(url.as_str())).call(&req).await.unwrap();
        assert_eq!(resp.content(), Some("pong"));
        assert_eq!(resp.usage.total_tokens, 2);
    }
}
