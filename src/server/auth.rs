use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use crate::gateway::Gateway;
use crate::identity::Identity;
use crate::Error;

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError(Error::unauthorized("missing authorization header")))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError(Error::unauthorized("invalid authorization header format, use: Bearer <token>")))?
        .trim();
    if token.is_empty() {
        return Err(ApiError(Error::unauthorized("token cannot be empty")));
    }
    Ok(token)
}

/// Resolves the caller and stores its [`Identity`] in request extensions.
pub async fn auth_middleware(
    State(gateway): State<Gateway>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let identity = gateway.authenticate(token).await.map_err(|e| {
        tracing::warn!("invalid API key attempt");
        ApiError(e)
    })?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Counts the request against the caller's window and reports the budget
/// in `X-RateLimit-*` headers.
pub async fn rate_limit_middleware(
    State(gateway): State<Gateway>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(identity) = request.extensions().get::<Identity>().cloned() else {
        return Ok(next.run(request).await);
    };
    let decision = gateway.check_rate_limit(&identity).await?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    Ok(response)
}
