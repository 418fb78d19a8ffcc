use crate::drivers::{DriverRequest, ProviderId};
use crate::error_code::ErrorClass;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::Value;
use std::time::Duration;

/// Upper bound on how much of an upstream error body is kept in messages.
const MAX_ERROR_BODY: usize = 512;

/// Shared HTTP client used by every provider driver.
///
/// Cloning is cheap; the underlying connection pool is shared.
///
/// `timeout` bounds a whole non-streaming exchange. A streaming call is only
/// bounded until the response headers arrive; the body then runs as long as
/// the upstream keeps generating.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to build HTTP client: {}", e),
                    crate::ErrorContext::new().with_source("http_transport"),
                )
            })?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a provider request and returns the response only when it is 2xx.
    ///
    /// Transport failures and non-2xx statuses both come back as
    /// [`Error::Upstream`], so callers see one error shape per provider call.
    pub async fn send(&self, provider: ProviderId, request: &DriverRequest) -> Result<reqwest::Response> {
        let mut req = self.client.post(&request.url).json(&request.body);
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = if request.stream {
            req = req.header("accept", "text/event-stream");
            match tokio::time::timeout(self.timeout, req.send()).await {
                Ok(sent) => sent.map_err(|e| upstream_from_reqwest(provider, e))?,
                Err(_) => {
                    return Err(Error::Upstream {
                        provider,
                        status: 0,
                        class: ErrorClass::Timeout,
                        message: format!("no response headers within {:?}", self.timeout),
                    })
                }
            }
        } else {
            req.timeout(self.timeout)
                .send()
                .await
                .map_err(|e| upstream_from_reqwest(provider, e))?
        };

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        tracing::warn!(
            provider = %provider,
            status = status.as_u16(),
            error = %message,
            "upstream returned error status"
        );
        Err(Error::upstream(provider, status.as_u16(), message))
    }

    /// Sends a request and decodes the JSON body.
    pub async fn send_json(&self, provider: ProviderId, request: &DriverRequest) -> Result<Value> {
        let resp = self.send(provider, request).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| upstream_from_reqwest(provider, e))
    }

    /// Sends a streaming request and returns the raw body as a byte stream.
    pub async fn send_stream(
        &self,
        provider: ProviderId,
        request: &DriverRequest,
    ) -> Result<BoxStream<'static, Bytes>> {
        let resp = self.send(provider, request).await?;
        let bytes = resp
            .bytes_stream()
            .map_err(move |e| upstream_from_reqwest(provider, e));
        Ok(Box::pin(bytes))
    }
}

/// Classifies a reqwest failure. The URL is stripped from the message since
/// some providers carry the API key in the query string.
pub(crate) fn upstream_from_reqwest(provider: ProviderId, err: reqwest::Error) -> Error {
    let err = err.without_url();
    let class = if err.is_timeout() {
        ErrorClass::Timeout
    } else if err.is_decode() {
        ErrorClass::Other
    } else {
        ErrorClass::Connection
    };
    Error::Upstream {
        provider,
        status: err.status().map(|s| s.as_u16()).unwrap_or(0),
        class,
        message: err.to_string(),
    }
}

/// All three providers wrap failures as `{"error": {"message": ...}}`.
fn extract_error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = v.pointer("/error/message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = v.get("error").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty error body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
