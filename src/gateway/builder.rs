use std::sync::Arc;

use super::Gateway;
use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::drivers::{create_driver, ProviderId};
use crate::identity::{IdentityResolver, StaticIdentityResolver};
use crate::pricing::{PricingSource, PricingTable};
use crate::resilience::RateLimiter;
use crate::routing::{FailoverRouter, FailoverTable, ProviderRegistry};
use crate::store::KvStore;
use crate::telemetry::{BackgroundQueue, LogSink, TracingLogSink};
use crate::transport::HttpTransport;
use crate::Result;

/// Builder for a [`Gateway`].
///
/// Only the router and the store are required; everything else has a
/// working default.
pub struct GatewayBuilder {
    router: FailoverRouter,
    store: Arc<dyn KvStore>,
    default_rate_limit: u32,
    pricing: Arc<dyn PricingSource>,
    logs: Arc<dyn LogSink>,
    identities: Arc<dyn IdentityResolver>,
    queue: Option<BackgroundQueue>,
}

impl GatewayBuilder {
    pub fn new(router: FailoverRouter, store: Arc<dyn KvStore>) -> Self {
        Self {
            router,
            store,
            default_rate_limit: crate::resilience::rate_limiter::DEFAULT_LIMIT,
            pricing: Arc::new(PricingTable::builtin()),
            logs: Arc::new(TracingLogSink),
            identities: Arc::new(StaticIdentityResolver::new()),
            queue: None,
        }
    }

    /// Limit applied to identities without their own.
    pub fn default_rate_limit(mut self, per_minute: u32) -> Self {
        self.default_rate_limit = per_minute;
        self
    }

    pub fn pricing(mut self, pricing: Arc<dyn PricingSource>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logs = sink;
        self
    }

    pub fn identities(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identities = resolver;
        self
    }

    /// Share an existing queue; otherwise one is started by [`build`](Self::build).
    pub fn background_queue(mut self, queue: BackgroundQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Must be called inside a tokio runtime when no queue was supplied.
    pub fn build(self) -> Gateway {
        let queue = self.queue.unwrap_or_else(|| BackgroundQueue::start().0);
        Gateway {
            router: self.router,
            cache: ResponseCache::new(self.store.clone()),
            limiter: RateLimiter::new(self.store, self.default_rate_limit),
            pricing: self.pricing,
            logs: self.logs,
            identities: self.identities,
            queue,
        }
    }
}

/// Registry with one driver per provider that has an API key.
pub fn registry_from_config(config: &GatewayConfig, transport: &HttpTransport) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in ProviderId::ALL {
        let settings = config.providers.get(provider);
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            registry.register(create_driver(
                provider,
                key,
                settings.base_url.as_deref(),
                transport.clone(),
            ));
            tracing::info!(provider = %provider, "provider configured");
        }
    }
    registry
}

/// Everything the binary needs, from validated configuration.
pub fn builder_from_config(
    config: &GatewayConfig,
    store: Arc<dyn KvStore>,
    queue: BackgroundQueue,
) -> Result<GatewayBuilder> {
    let transport = HttpTransport::new(config.http_timeout())?;
    let registry = registry_from_config(config, &transport);
    let table = FailoverTable::defaults().with_overrides(&config.failover);
    let pricing = PricingTable::builtin().with_entries(&config.pricing);

    Ok(GatewayBuilder::new(FailoverRouter::new(registry, table), store)
        .default_rate_limit(config.rate_limit.default_per_minute)
        .pricing(Arc::new(pricing))
        .identities(Arc::new(StaticIdentityResolver::from_config(config)))
        .background_queue(queue))
}
