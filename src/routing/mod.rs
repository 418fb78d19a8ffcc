//! 路由与故障转移：按模型前缀选择提供商，并在可重试错误时切换到等价模型。
//!
//! Provider routing and failover.
//!
//! Routing is a pure prefix rule over the registered drivers. On a retryable
//! upstream failure the router walks the model's [`FailoverTable`] chain,
//! restricted to providers that are actually registered, and returns the
//! first success. Streaming requests are routed but never failed over.
//!
//! Both the registry and the table are built once and then only read, so a
//! router can be shared across requests behind an `Arc` with no locking.

pub mod failover;

pub use failover::FailoverTable;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::drivers::{detect_provider, ProviderDriver, ProviderId};
use crate::pipeline::DeltaStream;
use crate::types::{ChatRequest, ChatResponse};
use crate::{Error, Result};

/// Registered drivers, one per provider.
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    drivers: BTreeMap<ProviderId, Arc<dyn ProviderDriver>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, driver: Arc<dyn ProviderDriver>) -> Self {
        self.register(driver);
        self
    }

    /// Registers `driver` for its provider, replacing any earlier one.
    pub fn register(&mut self, driver: Arc<dyn ProviderDriver>) {
        self.drivers.insert(driver.provider(), driver);
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ProviderDriver>> {
        self.drivers.get(&provider).cloned()
    }

    pub fn contains(&self, provider: ProviderId) -> bool {
        self.drivers.contains_key(&provider)
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.drivers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Outcome of a routed, possibly failed-over, completion.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub response: ChatResponse,
    /// Provider that produced `response`.
    pub provider: ProviderId,
    /// Model name sent upstream; the response may carry a dated variant.
    pub model: String,
    pub failover_used: bool,
    /// Provider the requested model routes to.
    pub original_provider: ProviderId,
}

/// Routes requests to drivers and applies failover chains.
#[derive(Debug, Clone)]
pub struct FailoverRouter {
    registry: Arc<ProviderRegistry>,
    table: Arc<FailoverTable>,
}

impl FailoverRouter {
    pub fn new(registry: ProviderRegistry, table: FailoverTable) -> Self {
        Self {
            registry: Arc::new(registry),
            table: Arc::new(table),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Driver serving `model`.
    ///
    /// Unknown prefixes are [`Error::Routing`]; a known prefix whose provider
    /// has no registered driver is [`Error::UnconfiguredProvider`].
    pub fn route(&self, model: &str) -> Result<Arc<dyn ProviderDriver>> {
        let provider = detect_provider(model).ok_or_else(|| Error::Routing {
            model: model.to_string(),
        })?;
        self.registry
            .get(provider)
            .ok_or_else(|| Error::UnconfiguredProvider {
                provider,
                model: model.to_string(),
            })
    }

    /// Fallback models for `model` whose providers are registered, in order.
    pub fn fallbacks(&self, model: &str) -> Vec<String> {
        self.table
            .chain(model)
            .iter()
            .filter(|m| {
                detect_provider(m)
                    .map(|p| self.registry.contains(p))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Non-streaming completion with failover.
    pub async fn chat(&self, request: &ChatRequest) -> Result<Dispatch> {
        let primary = self.route(&request.model)?;
        let original_provider = primary.provider();

        let err = match primary.call(request).await {
            Ok(response) => {
                return Ok(Dispatch {
                    response,
                    provider: original_provider,
                    model: request.model.clone(),
                    failover_used: false,
                    original_provider,
                })
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }

        tracing::warn!(
            model = %request.model,
            provider = %original_provider,
            error = %err,
            "primary provider failed, trying failover chain"
        );

        for fallback in self.fallbacks(&request.model) {
            let driver = match self.route(&fallback) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let attempt = request.for_model(&fallback);
            match driver.call(&attempt).await {
                Ok(response) => {
                    tracing::info!(
                        model = %request.model,
                        fallback_model = %fallback,
                        provider = %driver.provider(),
                        "failover succeeded"
                    );
                    return Ok(Dispatch {
                        response,
                        provider: driver.provider(),
                        model: fallback.clone(),
                        failover_used: true,
                        original_provider,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        fallback_model = %fallback,
                        provider = %driver.provider(),
                        error = %e,
                        "failover attempt failed"
                    );
                }
            }
        }

        Err(Error::AllProvidersFailed {
            model: request.model.clone(),
            provider: original_provider,
        })
    }

    /// Streaming completion on the primary provider only.
    pub async fn stream(&self, request: &ChatRequest) -> Result<(ProviderId, DeltaStream)> {
        let driver = self.route(&request.model)?;
        let stream = driver.stream(request).await?;
        Ok((driver.provider(), stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubDriver;
    use crate::types::Message;

    fn request(model: &str) -> ChatRequest {
        ChatRequest::new(model, vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn test_primary_success_no_failover() {
        let openai = StubDriver::replying(ProviderId::OpenAi, "from openai");
        let router = FailoverRouter::new(
            ProviderRegistry::new().with_driver(openai.clone()),
            FailoverTable::defaults(),
        );
        let d = router.chat(&request("gpt-4o")).await.unwrap();
        assert_eq!(d.provider, ProviderId::OpenAi);
        assert!(!d.failover_used);
        assert_eq!(d.model, "gpt-4o");
        assert_eq!(d.response.content(), Some("from openai"));
        assert_eq!(openai.calls(), 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_falls_back_in_order() {
        let openai = StubDriver::failing(ProviderId::OpenAi, 503);
        let anthropic = StubDriver::failing(ProviderId::Anthropic, 429);
        let google = StubDriver::replying(ProviderId::Google, "from gemini");
        let router = FailoverRouter::new(
            ProviderRegistry::new()
                .with_driver(openai.clone())
                .with_driver(anthropic.clone())
                .with_driver(google.clone()),
            FailoverTable::defaults(),
        );

        let d = router.chat(&request("gpt-4o")).await.unwrap();
        assert!(d.failover_used);
        assert_eq!(d.provider, ProviderId::Google);
        assert_eq!(d.original_provider, ProviderId::OpenAi);
        assert_eq!(d.response.model, "gemini-2.5-pro");
        assert_eq!(d.model, "gemini-2.5-pro");
        assert_eq!((openai.calls(), anthropic.calls(), google.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_permanent_failure_never_falls_back() {
        let openai = StubDriver::failing(ProviderId::OpenAi, 400);
        let anthropic = StubDriver::replying(ProviderId::Anthropic, "unused");
        let router = FailoverRouter::new(
            ProviderRegistry::new()
                .with_driver(openai)
                .with_driver(anthropic.clone()),
            FailoverTable::defaults(),
        );
        let err = router.chat(&request("gpt-4o")).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 400, .. }));
        assert_eq!(anthropic.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_reports_original_provider() {
        let openai = StubDriver::failing(ProviderId::OpenAi, 500);
        let anthropic = StubDriver::failing(ProviderId::Anthropic, 502);
        let router = FailoverRouter::new(
            ProviderRegistry::new().with_driver(openai).with_driver(anthropic.clone()),
            FailoverTable::defaults(),
        );
        // gemini-2.5-flash is in the chain but Google is not registered.
        assert_eq!(router.fallbacks("gpt-4o-mini"), vec!["claude-haiku-4-5-20251001"]);

        let err = router.chat(&request("gpt-4o-mini")).await.unwrap_err();
        match err {
            Error::AllProvidersFailed { model, provider } => {
                assert_eq!(model, "gpt-4o-mini");
                assert_eq!(provider, ProviderId::OpenAi);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(anthropic.calls(), 1);
    }

    #[tokio::test]
    async fn test_routing_errors() {
        let router = FailoverRouter::new(
            ProviderRegistry::new().with_driver(StubDriver::replying(ProviderId::OpenAi, "x")),
            FailoverTable::defaults(),
        );
        assert!(matches!(
            router.chat(&request("llama-3")).await.unwrap_err(),
            Error::Routing { .. }
        ));
        assert!(matches!(
            router.chat(&request("claude-haiku-4-5-20251001")).await.unwrap_err(),
            Error::UnconfiguredProvider {
                provider: ProviderId::Anthropic,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stream_never_fails_over() {
        let openai = StubDriver::failing(ProviderId::OpenAi, 503);
        let anthropic = StubDriver::replying(ProviderId::Anthropic, "unused");
        let router = FailoverRouter::new(
            ProviderRegistry::new()
                .with_driver(openai.clone())
                .with_driver(anthropic.clone()),
            FailoverTable::defaults(),
        );
        assert!(router.stream(&request("gpt-4o")).await.is_err());
        assert_eq!(openai.calls(), 1);
        assert_eq!(anthropic.calls(), 0);
    }
}
