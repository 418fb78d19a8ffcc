use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::Error;

/// Gateway error rendered as an OpenAI-style JSON body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message shown to clients; internal failures are not echoed.
    pub fn message(&self) -> String {
        match &self.0 {
            Error::CacheStore { .. } | Error::Io(_) | Error::Configuration { .. } => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        let body = json!({
            "error": {
                "message": self.message(),
                "type": self.0.kind(),
                "code": self.0.code(),
            }
        });
        let mut response = (status, axum::Json(body)).into_response();

        if let Error::RateLimitExceeded {
            limit,
            retry_after_secs,
        } = &self.0
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
        }
        response
    }
}
