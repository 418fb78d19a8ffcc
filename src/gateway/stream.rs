use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;

use crate::drivers::ProviderId;
use crate::pipeline::DeltaStream;
use crate::pricing::PricingSource;
use crate::telemetry::{BackgroundQueue, LogSink, RequestLog};
use crate::types::{StreamEvent, Usage};
use crate::Result;

/// Status logged for a stream the client abandoned.
const CLIENT_CLOSED: u16 = 499;

pub(super) struct StreamRecorder {
    pub(super) identity_id: String,
    pub(super) model: String,
    pub(super) provider: ProviderId,
    pub(super) started: Instant,
    pub(super) pricing: Arc<dyn PricingSource>,
    pub(super) logs: Arc<dyn LogSink>,
    pub(super) queue: BackgroundQueue,
    pub(super) usage: Option<Usage>,
}

enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl StreamRecorder {
    fn finish(self, outcome: Outcome) {
        let usage = self.usage.unwrap_or_default();
        let cost_usd = match self.pricing.cost(self.provider, &self.model, &usage) {
            Ok(cost) => cost,
            Err(e) => {
                tracing::warn!(provider = %self.provider, model = %self.model, error = %e, "no pricing, logging zero cost");
                0.0
            }
        };

        let mut log = RequestLog::new(self.identity_id, self.model).with_usage(&usage);
        log.provider = Some(self.provider);
        log.original_provider = Some(self.provider);
        log.streamed = true;
        log.cost_usd = cost_usd;
        log.latency_ms = self.started.elapsed().as_millis() as u64;
        let log = match outcome {
            Outcome::Completed => log,
            Outcome::Failed(message) => log.with_error(502, message),
            Outcome::Cancelled => log.with_error(CLIENT_CLOSED, "stream cancelled by client"),
        };

        let logs = self.logs;
        self.queue.submit("request_log", async move { logs.record(log).await });
    }
}

/// Normalized provider stream that logs the request once it ends.
///
/// The log job is submitted when the stream yields `Done`, fails, runs out,
/// or is dropped early. Usage is taken from the last chunk that carried it.
pub struct GatewayStream {
    inner: DeltaStream,
    provider: ProviderId,
    recorder: Option<StreamRecorder>,
}

impl GatewayStream {
    pub(super) fn new(inner: DeltaStream, recorder: StreamRecorder) -> Self {
        Self {
            inner,
            provider: recorder.provider,
            recorder: Some(recorder),
        }
    }

    /// Provider serving the stream.
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    fn finish(&mut self, outcome: Outcome) {
        if let Some(recorder) = self.recorder.take() {
            recorder.finish(outcome);
        }
    }
}

impl Stream for GatewayStream {
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                match &event {
                    StreamEvent::Chunk(chunk) => {
                        if let (Some(usage), Some(rec)) = (chunk.usage, this.recorder.as_mut()) {
                            rec.usage = Some(usage);
                        }
                    }
                    StreamEvent::Done => this.finish(Outcome::Completed),
                }
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Outcome::Failed(e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(Outcome::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GatewayStream {
    fn drop(&mut self) {
        self.finish(Outcome::Cancelled);
    }
}
