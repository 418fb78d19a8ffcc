//! HTTP 服务：统一的 OpenAI 兼容聊天补全接口。
//!
//! | Route | Auth | Description |
//! |-------|------|-------------|
//! | `GET /health` | no | Liveness, body `OK` |
//! | `POST /v1/chat/completions` | Bearer | Unified chat completion, JSON or SSE |

pub mod auth;
pub mod error;
pub mod routes;

pub use error::ApiError;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::gateway::Gateway;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Full application router.
pub fn router(gateway: Gateway) -> Router {
    let api = Router::new()
        .route("/v1/chat/completions", post(routes::chat_completions))
        .layer(axum::middleware::from_fn_with_state(
            gateway.clone(),
            auth::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            gateway.clone(),
            auth::auth_middleware,
        ))
        .with_state(gateway);

    Router::new()
        .route("/health", get(routes::health))
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(logging_middleware))
}

async fn logging_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "http request"
    );
    response
}
