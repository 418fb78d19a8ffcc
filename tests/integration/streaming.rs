use crate::mock_server::{body_string, header, GatewayFixture};
use axum::http::StatusCode;
use serde_json::json;

fn stream_body(model: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Say hello"}],
        "stream": true
    })
}

fn data_frames(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| f.strip_prefix("data: ").unwrap_or(f).to_string())
        .collect()
}

#[tokio::test]
async fn test_openai_stream_is_forwarded_with_done() {
    let mut fixture = GatewayFixture::new().await;
    let upstream = fixture
        .mock_sse(
            "/v1/chat/completions",
            &[
                r#"data: {"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
                r#"data: {"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
                r#"data: {"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                r#"data: {"id":"c1","object":"chat.completion.chunk","choices":[],"usage":{"prompt_tokens":1000,"completion_tokens":500,"total_tokens":1500}}"#,
                "data: [DONE]",
            ],
        )
        .await;

    let response = fixture.chat(stream_body("gpt-4o")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").unwrap().starts_with("text/event-stream"));
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));
    assert_eq!(header(&response, "x-provider"), Some("openai"));

    let body = body_string(response).await;
    assert!(body.ends_with("data: [DONE]\n\n"));
    let frames = data_frames(&body);
    assert_eq!(frames.len(), 5);
    assert_eq!(frames.iter().filter(|f| f.as_str() == "[DONE]").count(), 1);

    let text: String = frames[..4]
        .iter()
        .map(|f| serde_json::from_str::<serde_json::Value>(f).unwrap())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect();
    assert_eq!(text, "Hello");
    upstream.assert_async().await;

    fixture.gateway.queue().flush().await;
    let logs = fixture.logs.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].streamed);
    assert_eq!(logs[0].total_tokens, 1500);
    assert!(logs[0].cost_usd > 0.0);
}

#[tokio::test]
async fn test_anthropic_stream_is_normalized() {
    let mut fixture = GatewayFixture::new().await;
    let _upstream = fixture
        .mock_sse(
            "/v1/messages",
            &[
                "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4-5-20250929\",\"role\":\"assistant\"}}",
                "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0}",
                "event: ping\ndata: {\"type\":\"ping\"}",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}",
                "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}",
                "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}",
                "event: message_stop\ndata: {\"type\":\"message_stop\"}",
            ],
        )
        .await;

    let response = fixture.chat(stream_body("claude-sonnet-4-5-20250929")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-provider"), Some("anthropic"));

    let frames = data_frames(&body_string(response).await);
    // role chunk, two content chunks, [DONE]
    assert_eq!(frames.len(), 4);
    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
    let second: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
    assert_eq!(second["choices"][0]["delta"]["content"], "Hi");
    assert_eq!(frames[3], "[DONE]");
}

#[tokio::test]
async fn test_stream_never_uses_cache_or_failover() {
    let mut fixture = GatewayFixture::new().await;
    let openai = fixture.mock_error("/v1/chat/completions", 503).await;
    let anthropic = fixture
        .server
        .mock("POST", "/v1/messages")
        .expect(0)
        .create_async()
        .await;

    let response = fixture.chat(stream_body("gpt-4o")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    openai.assert_async().await;
    anthropic.assert_async().await;
    assert_eq!(fixture.gateway.cache().stats().writes, 0);
}
