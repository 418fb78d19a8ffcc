//! 请求编排：限流、缓存、故障转移调度、计费与日志。
//!
//! # Gateway
//!
//! [`Gateway`] ties the pieces together for one request:
//!
//! ```text
//! identity → rate limit → cache read → FailoverRouter → cost → cache write
//!                                                          │
//!                                         RequestLog → BackgroundQueue
//! ```
//!
//! Streaming requests skip the cache and failover; their log is written when
//! the returned [`GatewayStream`] ends or is dropped.

mod builder;
mod stream;

pub use builder::{builder_from_config, registry_from_config, GatewayBuilder};
pub use stream::GatewayStream;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::ResponseCache;
use crate::drivers::{detect_provider, ProviderId};
use crate::identity::{Identity, IdentityResolver};
use crate::pricing::PricingSource;
use crate::resilience::{RateDecision, RateLimiter};
use crate::routing::FailoverRouter;
use crate::telemetry::{BackgroundQueue, LogSink, RequestLog};
use crate::types::ChatRequest;
use crate::types::ChatResponse;
use crate::{Error, Result};

use stream::StreamRecorder;

/// Result of a non-streaming request.
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: ChatResponse,
    pub cache_hit: bool,
    /// Provider that served the response; for cache hits, the one that
    /// originally produced it.
    pub provider: Option<ProviderId>,
    pub failover_used: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    router: FailoverRouter,
    cache: ResponseCache,
    limiter: RateLimiter,
    pricing: Arc<dyn PricingSource>,
    logs: Arc<dyn LogSink>,
    identities: Arc<dyn IdentityResolver>,
    queue: BackgroundQueue,
}

impl Gateway {
    pub fn builder(router: FailoverRouter, store: Arc<dyn crate::store::KvStore>) -> GatewayBuilder {
        GatewayBuilder::new(router, store)
    }

    pub fn router(&self) -> &FailoverRouter {
        &self.router
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn queue(&self) -> &BackgroundQueue {
        &self.queue
    }

    /// Identity owning a bearer token.
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        self.identities.resolve(token).await
    }

    /// Counts this request against the identity's window.
    ///
    /// Rejection is [`Error::RateLimitExceeded`]. A store outage admits the
    /// request.
    pub async fn check_rate_limit(&self, identity: &Identity) -> Result<RateDecision> {
        let decision = self
            .limiter
            .check(&identity.id, identity.rate_limit_per_minute)
            .await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(Error::RateLimitExceeded {
                limit: decision.limit,
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    /// Non-streaming completion.
    pub async fn complete(&self, identity: &Identity, request: ChatRequest) -> Result<Completion> {
        let started = Instant::now();
        self.touch(identity);

        if let Err(e) = request.validate() {
            self.log_failure(identity, &request, &e, started);
            return Err(e);
        }

        let use_cache = identity.cache_enabled && !request.stream;
        if use_cache {
            if let Some(mut response) = self.cache.get(&request).await {
                let latency_ms = elapsed_ms(started);
                response.cost_usd = 0.0;
                response.latency_ms = latency_ms;
                let provider = detect_provider(&response.model);

                let mut log = RequestLog::new(&identity.id, &request.model).with_usage(&response.usage);
                log.provider = provider;
                log.original_provider = detect_provider(&request.model);
                log.cache_hit = true;
                log.latency_ms = latency_ms;
                self.submit_log(log);

                return Ok(Completion {
                    response,
                    cache_hit: true,
                    provider,
                    failover_used: false,
                    latency_ms,
                });
            }
        }

        let dispatch = match self.router.chat(&request).await {
            Ok(d) => d,
            Err(e) => {
                self.log_failure(identity, &request, &e, started);
                return Err(e);
            }
        };

        let mut response = dispatch.response;
        response.cost_usd = self.cost(dispatch.provider, &dispatch.model, &response);

        if use_cache {
            let ttl = Duration::from_secs(identity.cache_ttl_seconds);
            self.cache.put(&request, &response, ttl).await;
        }

        let latency_ms = elapsed_ms(started);
        response.latency_ms = latency_ms;

        let mut log = RequestLog::new(&identity.id, &request.model).with_usage(&response.usage);
        log.provider = Some(dispatch.provider);
        log.original_provider = Some(dispatch.original_provider);
        log.failover_used = dispatch.failover_used;
        log.cost_usd = response.cost_usd;
        log.latency_ms = latency_ms;
        self.submit_log(log);

        Ok(Completion {
            response,
            cache_hit: false,
            provider: Some(dispatch.provider),
            failover_used: dispatch.failover_used,
            latency_ms,
        })
    }

    /// Streaming completion on the primary provider; no cache, no failover.
    pub async fn stream(&self, identity: &Identity, request: ChatRequest) -> Result<GatewayStream> {
        let started = Instant::now();
        self.touch(identity);

        let opened = match request.validate() {
            Ok(()) => self.router.stream(&request).await,
            Err(e) => Err(e),
        };
        let (provider, inner) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                let mut streamed = request.clone();
                streamed.stream = true;
                self.log_failure(identity, &streamed, &e, started);
                return Err(e);
            }
        };

        let recorder = StreamRecorder {
            identity_id: identity.id.clone(),
            model: request.model.clone(),
            provider,
            started,
            pricing: self.pricing.clone(),
            logs: self.logs.clone(),
            queue: self.queue.clone(),
            usage: None,
        };
        Ok(GatewayStream::new(inner, recorder))
    }

    /// Cost on the model sent upstream, not the (possibly dated) name echoed
    /// back; a pricing miss costs zero.
    fn cost(&self, provider: ProviderId, model: &str, response: &ChatResponse) -> f64 {
        match self.pricing.cost(provider, model, &response.usage) {
            Ok(cost) => cost,
            Err(e) => {
                tracing::warn!(provider = %provider, model = %model, error = %e, "no pricing, reporting zero cost");
                0.0
            }
        }
    }

    fn touch(&self, identity: &Identity) {
        let resolver = self.identities.clone();
        let id = identity.id.clone();
        self.queue
            .submit("identity_touch", async move { resolver.touch(&id).await });
    }

    fn submit_log(&self, log: RequestLog) {
        let logs = self.logs.clone();
        self.queue
            .submit("request_log", async move { logs.record(log).await });
    }

    /// Logs a request rejected before it could be parsed.
    pub fn log_rejected(&self, identity: &Identity, error: &Error) {
        let log = RequestLog::new(&identity.id, "").with_error(error.http_status(), error.to_string());
        self.submit_log(log);
    }

    fn log_failure(&self, identity: &Identity, request: &ChatRequest, error: &Error, started: Instant) {
        let mut log = RequestLog::new(&identity.id, &request.model)
            .with_error(error.http_status(), error.to_string());
        log.provider = error_provider(error);
        log.original_provider = detect_provider(&request.model);
        log.streamed = request.stream;
        log.latency_ms = elapsed_ms(started);
        self.submit_log(log);
    }
}

fn error_provider(error: &Error) -> Option<ProviderId> {
    match error {
        Error::Upstream { provider, .. }
        | Error::AllProvidersFailed { provider, .. }
        | Error::UnconfiguredProvider { provider, .. } => Some(*provider),
        _ => None,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
