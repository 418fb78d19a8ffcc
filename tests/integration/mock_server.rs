//! Mock upstream providers plus a fully wired gateway in front of them.

use axum::body::Body;
use axum::http::{Request, Response};
use llm_gateway::config::{ApiKeyConfig, GatewayConfig};
use llm_gateway::gateway::{builder_from_config, Gateway};
use llm_gateway::store::MemoryStore;
use llm_gateway::telemetry::{BackgroundQueue, MemoryLogSink};
use mockito::{Mock, Server, ServerGuard};
use std::sync::Arc;
use tower::ServiceExt;

pub const CLIENT_KEY: &str = "sk-gw-test";

/// Test fixture that manages a mock upstream and the gateway under test.
pub struct GatewayFixture {
    pub server: ServerGuard,
    pub gateway: Gateway,
    pub logs: MemoryLogSink,
    app: axum::Router,
}

pub struct FixtureOptions {
    pub openai: bool,
    pub anthropic: bool,
    pub google: bool,
    pub rate_limit_per_minute: Option<i64>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            openai: true,
            anthropic: true,
            google: true,
            rate_limit_per_minute: None,
        }
    }
}

impl GatewayFixture {
    pub async fn new() -> Self {
        Self::with_options(FixtureOptions::default()).await
    }

    pub async fn with_options(options: FixtureOptions) -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();

        let mut config = GatewayConfig::default();
        for (enabled, provider) in [
            (options.openai, &mut config.providers.openai),
            (options.anthropic, &mut config.providers.anthropic),
            (options.google, &mut config.providers.google),
        ] {
            if enabled {
                provider.api_key = Some("upstream-key".into());
                provider.base_url = Some(base_url.clone());
            }
        }
        config.api_keys = vec![ApiKeyConfig {
            id: Some("test-key".into()),
            name: "integration".into(),
            key: Some(CLIENT_KEY.into()),
            rate_limit_per_minute: options.rate_limit_per_minute,
            ..ApiKeyConfig::default()
        }];
        llm_gateway::config::validate_config(&config).unwrap();

        let logs = MemoryLogSink::new();
        let (queue, _worker) = BackgroundQueue::start();
        let gateway = builder_from_config(&config, Arc::new(MemoryStore::new()), queue)
            .unwrap()
            .log_sink(Arc::new(logs.clone()))
            .build();
        let app = llm_gateway::server::router(gateway.clone());

        Self {
            server,
            gateway,
            logs,
            app,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn chat(&self, body: serde_json::Value) -> Response<Body> {
        self.send(chat_request(CLIENT_KEY, body.to_string())).await
    }

    /// Successful OpenAI-style JSON completion.
    pub async fn mock_openai_json(&mut self, content: &str, model: &str) -> Mock {
        self.server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "chatcmpl-test",
                    "object": "chat.completion",
                    "created": 1700000000,
                    "model": model,
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": content},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_anthropic_json(&mut self, content: &str, model: &str) -> Mock {
        self.server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "msg_test",
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "content": [{"type": "text", "text": content}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 1000, "output_tokens": 500}
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_error(&mut self, path: &str, status: usize) -> Mock {
        self.server
            .mock("POST", path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"upstream said no","type":"server_error"}}"#)
            .create_async()
            .await
    }

    /// Create a mock for a successful streaming response (SSE)
    pub async fn mock_sse(&mut self, path: &str, frames: &[&str]) -> Mock {
        let body: String = frames.iter().map(|f| format!("{}\n\n", f)).collect();
        self.server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }
}

pub fn chat_request(token: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
