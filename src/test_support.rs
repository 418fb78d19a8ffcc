//! In-process provider stub for unit tests.

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::drivers::{openai, DriverRequest, ProviderDriver, ProviderId};
use crate::pipeline::{DeltaStream, EventNormalizer};
use crate::transport::HttpTransport;
use crate::types::{ChatRequest, ChatResponse, DeltaChunk, MessageRole, StreamEvent, Usage};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) enum StubOutcome {
    Reply(String),
    Status(u16),
}

#[derive(Debug)]
pub(crate) struct StubDriver {
    provider: ProviderId,
    outcome: StubOutcome,
    calls: AtomicUsize,
    transport: HttpTransport,
}

impl StubDriver {
    pub(crate) fn new(provider: ProviderId, outcome: StubOutcome) -> Arc<Self> {
        Arc::new(Self {
            provider,
            outcome,
            calls: AtomicUsize::new(0),
            transport: HttpTransport::new(Duration::from_secs(1)).unwrap(),
        })
    }

    pub(crate) fn replying(provider: ProviderId, text: &str) -> Arc<Self> {
        Self::new(provider, StubOutcome::Reply(text.to_string()))
    }

    pub(crate) fn failing(provider: ProviderId, status: u16) -> Arc<Self> {
        Self::new(provider, StubOutcome::Status(status))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderDriver for StubDriver {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<DriverRequest> {
        Ok(DriverRequest {
            url: format!("stub://{}", self.provider),
            headers: HashMap::new(),
            body: serde_json::to_value(request)?,
            stream,
        })
    }

    fn parse_response(&self, request: &ChatRequest, _body: &Value) -> Result<ChatResponse> {
        Ok(ChatResponse::assistant("stub", request.model.clone(), "", "stop", Usage::default()))
    }

    fn stream_normalizer(&self) -> EventNormalizer {
        openai::normalize_event
    }

    fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    async fn call(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            StubOutcome::Reply(text) => Ok(ChatResponse::assistant(
                format!("stub-{}", self.provider),
                request.model.clone(),
                text.clone(),
                "stop",
                Usage::new(1000, 500),
            )),
            StubOutcome::Status(status) => Err(Error::upstream(self.provider, *status, "stub failure")),
        }
    }

    async fn stream(&self, _request: &ChatRequest) -> Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            StubOutcome::Reply(text) => {
                let events = vec![
                    Ok(StreamEvent::Chunk(DeltaChunk::role(MessageRole::Assistant))),
                    Ok(StreamEvent::Chunk(
                        DeltaChunk::content(text.clone()).with_usage(Usage::new(1000, 500)),
                    )),
                    Ok(StreamEvent::Done),
                ];
                Ok(Box::pin(stream::iter(events)))
            }
            StubOutcome::Status(status) => Err(Error::upstream(self.provider, *status, "stub failure")),
        }
    }
}
