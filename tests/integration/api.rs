use crate::mock_server::{body_json, body_string, chat_request, header, FixtureOptions, GatewayFixture};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

fn simple_body(model: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "2+2?"}],
        "temperature": 0
    })
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let fixture = GatewayFixture::new().await;
    let response = fixture
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn test_auth_failures_are_401_with_openai_error_body() {
    let fixture = GatewayFixture::new().await;

    let missing = fixture
        .send(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .body(Body::from(simple_body("gpt-4o").to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = fixture
        .send(chat_request("sk-wrong", simple_body("gpt-4o").to_string()))
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(wrong).await;
    assert_eq!(body["error"]["type"], "authentication_error");
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

// Scenario A: identical request twice, second is served from cache for free.
#[tokio::test]
async fn test_second_identical_request_is_cache_hit() {
    let mut fixture = GatewayFixture::new().await;
    let upstream = fixture.mock_openai_json("4", "gpt-4o-mini").await;

    let first = fixture.chat(simple_body("gpt-4o-mini")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-cache-hit"), Some("false"));
    assert_eq!(header(&first, "x-provider"), Some("openai"));
    // 1000 * 0.00015/1k + 500 * 0.0006/1k
    assert_eq!(header(&first, "x-cost-usd"), Some("0.000450"));
    assert!(header(&first, "x-failover").is_none());
    let first_body = body_json(first).await;
    assert_eq!(first_body["choices"][0]["message"]["content"], "4");

    let second = fixture.chat(simple_body("gpt-4o-mini")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-cache-hit"), Some("true"));
    assert_eq!(header(&second, "x-cost-usd"), Some("0.000000"));
    let second_body = body_json(second).await;
    assert_eq!(second_body["cost_usd"], 0.0);
    assert_eq!(second_body["id"], first_body["id"]);

    upstream.assert_async().await;
}

// Scenario B: a known prefix whose provider has no key fails without any
// upstream traffic.
#[tokio::test]
async fn test_unconfigured_provider_is_400_without_network() {
    let mut fixture = GatewayFixture::with_options(FixtureOptions {
        anthropic: false,
        ..FixtureOptions::default()
    })
    .await;
    let anything = fixture
        .server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let response = fixture.chat(simple_body("claude-haiku-4-5-20251001")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "provider_not_configured");

    let unknown = fixture.chat(simple_body("llama-3-70b")).await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(unknown).await["error"]["code"], "unknown_model");

    anything.assert_async().await;
}

// Scenario C: with a limit of 60/minute the 61st request is rejected.
#[tokio::test]
async fn test_sixty_first_request_is_rate_limited() {
    let fixture = GatewayFixture::with_options(FixtureOptions {
        rate_limit_per_minute: Some(60),
        ..FixtureOptions::default()
    })
    .await;

    // empty messages: rejected by validation, but still counted
    let body = json!({"model": "gpt-4o", "messages": []});
    for i in 1..=60 {
        let response = fixture.chat(body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "request {}", i);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("60"));
        let remaining = (60 - i).to_string();
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some(remaining.as_str()));
    }

    let rejected = fixture.chat(body).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header(&rejected, "retry-after").unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(header(&rejected, "x-ratelimit-remaining"), Some("0"));
    assert_eq!(body_json(rejected).await["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn test_invalid_json_is_400() {
    let fixture = GatewayFixture::new().await;
    let response = fixture
        .send(chat_request(crate::mock_server::CLIENT_KEY, "{not json".into()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_json");
}

#[tokio::test]
async fn test_transient_failure_fails_over_to_next_provider() {
    let mut fixture = GatewayFixture::new().await;
    let openai = fixture.mock_error("/v1/chat/completions", 503).await;
    let anthropic = fixture
        .mock_anthropic_json("four", "claude-haiku-4-5-20251001")
        .await;

    let response = fixture.chat(simple_body("gpt-4o-mini")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-failover"), Some("true"));
    assert_eq!(header(&response, "x-provider"), Some("anthropic"));
    let body = body_json(response).await;
    assert_eq!(body["model"], "claude-haiku-4-5-20251001");
    assert_eq!(body["choices"][0]["message"]["content"], "four");

    openai.assert_async().await;
    anthropic.assert_async().await;

    fixture.gateway.queue().flush().await;
    let logs = fixture.logs.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].failover_used);
}

#[tokio::test]
async fn test_permanent_upstream_error_passes_status_through() {
    let mut fixture = GatewayFixture::new().await;
    let openai = fixture.mock_error("/v1/chat/completions", 404).await;
    let anthropic = fixture
        .server
        .mock("POST", "/v1/messages")
        .expect(0)
        .create_async()
        .await;

    let response = fixture.chat(simple_body("gpt-4o")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("upstream said no"));

    openai.assert_async().await;
    anthropic.assert_async().await;
}

#[tokio::test]
async fn test_exhausted_chain_is_502() {
    let mut fixture = GatewayFixture::new().await;
    let _openai = fixture.mock_error("/v1/chat/completions", 500).await;
    let _anthropic = fixture.mock_error("/v1/messages", 529).await;
    let _gemini = fixture
        .server
        .mock("POST", mockito::Matcher::Regex("^/v1beta/models/".into()))
        .with_status(503)
        .create_async()
        .await;

    let response = fixture.chat(simple_body("gpt-4o")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "all_providers_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("all providers failed for model gpt-4o"));
}

#[tokio::test]
async fn test_dated_upstream_model_is_priced_on_requested_model() {
    let mut fixture = GatewayFixture::new().await;
    let _upstream = fixture
        .mock_openai_json("4", "gpt-4o-mini-2024-07-18")
        .await;

    let response = fixture.chat(simple_body("gpt-4o-mini")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-cost-usd"), Some("0.000450"));
    let body = body_json(response).await;
    assert_eq!(body["model"], "gpt-4o-mini-2024-07-18");
    assert!(body["cost_usd"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_upstream_auth_failure_is_not_a_client_401() {
    let mut fixture = GatewayFixture::new().await;
    let _openai = fixture.mock_error("/v1/chat/completions", 401).await;
    let anthropic = fixture
        .server
        .mock("POST", "/v1/messages")
        .expect(0)
        .create_async()
        .await;

    let response = fixture.chat(simple_body("gpt-4o")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    anthropic.assert_async().await;
}

#[tokio::test]
async fn test_rejected_bodies_are_logged() {
    let fixture = GatewayFixture::new().await;

    let bad_json = fixture
        .send(chat_request(crate::mock_server::CLIENT_KEY, "{not json".into()))
        .await;
    assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);
    let empty = fixture
        .chat(json!({"model": "gpt-4o", "messages": []}))
        .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let empty_stream = fixture
        .chat(json!({"model": "gpt-4o", "messages": [], "stream": true}))
        .await;
    assert_eq!(empty_stream.status(), StatusCode::BAD_REQUEST);

    fixture.gateway.queue().flush().await;
    let logs = fixture.logs.logs();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status_code == 400 && l.identity == "test-key"));
    assert_eq!(logs.iter().filter(|l| l.model == "gpt-4o").count(), 2);
    assert_eq!(logs.iter().filter(|l| l.streamed).count(), 1);
}
