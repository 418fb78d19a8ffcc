use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::{Stream, StreamExt};
use serde_json::json;

use super::error::ApiError;
use crate::gateway::{Completion, Gateway};
use crate::identity::Identity;
use crate::types::{ChatRequest, StreamEvent};
use crate::Result;

/// `GET /health`
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(gateway): State<Gateway>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    // validated and logged by the gateway
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = crate::Error::from(e);
            gateway.log_rejected(&identity, &err);
            return Err(err.into());
        }
    };

    if request.stream {
        return stream_completion(gateway, identity, request).await;
    }

    let completion = gateway.complete(&identity, request).await?;
    Ok(completion_response(completion))
}

fn header(name: &'static str, value: impl Into<String>) -> Option<(HeaderName, HeaderValue)> {
    HeaderValue::try_from(value.into())
        .ok()
        .map(|v| (HeaderName::from_static(name), v))
}

fn completion_response(completion: Completion) -> Response {
    let Completion {
        response,
        cache_hit,
        provider,
        failover_used,
        latency_ms,
    } = completion;

    let mut headers = vec![
        header("x-cache-hit", cache_hit.to_string()),
        header("x-cost-usd", format!("{:.6}", response.cost_usd)),
        header("x-latency-ms", latency_ms.to_string()),
    ];
    if let Some(provider) = provider {
        headers.push(header("x-provider", provider.as_str()));
    }
    if failover_used {
        headers.push(header("x-failover", "true"));
    }

    let mut out = Json(response).into_response();
    for (name, value) in headers.into_iter().flatten() {
        out.headers_mut().insert(name, value);
    }
    out
}

async fn stream_completion(
    gateway: Gateway,
    identity: Identity,
    request: ChatRequest,
) -> std::result::Result<Response, ApiError> {
    let stream = gateway.stream(&identity, request).await?;
    let provider = stream.provider();

    let mut out = Sse::new(sse_frames(stream)).into_response();
    let headers = out.headers_mut();
    headers.insert("x-provider", HeaderValue::from_static(provider.as_str()));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(out)
}

/// SSE frames for a normalized stream: one `data:` frame per chunk, `[DONE]`
/// at the end, or an error frame when the upstream read fails.
pub fn sse_frames<S>(events: S) -> impl Stream<Item = std::result::Result<Event, Infallible>>
where
    S: Stream<Item = Result<StreamEvent>> + Send + 'static,
{
    events.map(|item| {
        let data = match item {
            Ok(StreamEvent::Chunk(chunk)) => match serde_json::to_string(&chunk) {
                Ok(json) => json,
                Err(e) => json!({ "error": { "message": e.to_string() } }).to_string(),
            },
            Ok(StreamEvent::Done) => "[DONE]".to_string(),
            Err(e) => json!({ "error": { "message": e.to_string() } }).to_string(),
        };
        Ok(Event::default().data(data))
    })
}
