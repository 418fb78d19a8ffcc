use crate::drivers::ProviderId;
use crate::error_code::ErrorClass;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "server.port", "request.messages")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "request_validator")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gateway.
/// Every failure a request can hit maps to one of these categories, and each
/// category maps to one client-facing HTTP status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown model {model}: no provider serves this prefix")]
    Routing { model: String },

    #[error("provider {provider} not configured (model {model})")]
    UnconfiguredProvider { provider: ProviderId, model: String },

    #[error("{provider} upstream error: HTTP {status} ({class}): {message}")]
    Upstream {
        provider: ProviderId,
        status: u16,
        class: ErrorClass,
        message: String,
    },

    #[error("all providers failed for model {model} (original provider {provider})")]
    AllProvidersFailed { model: String, provider: ProviderId },

    #[error("Cache store error: {message}")]
    CacheStore { message: String },

    #[error("rate limit exceeded: {limit} requests per minute")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    #[error("no pricing for {provider}/{model}")]
    PricingNotFound { provider: ProviderId, model: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Upstream error classified from a non-2xx HTTP status.
    pub fn upstream(provider: ProviderId, status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            provider,
            status,
            class: ErrorClass::from_http_status(status),
            message: message.into(),
        }
    }

    pub fn cache_store(msg: impl Into<String>) -> Self {
        Error::CacheStore {
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized {
            message: msg.into(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Upstream class, when the error came from a provider call.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Error::Upstream { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Whether another provider may succeed where this call failed.
    pub fn is_retryable(&self) -> bool {
        self.class().map(|c| c.is_retryable()).unwrap_or(false)
    }

    /// Status returned to the gateway's own client.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Routing { .. } | Error::UnconfiguredProvider { .. } | Error::Validation { .. } => {
                400
            }
            Error::Serialization(_) => 400,
            Error::Unauthorized { .. } => 401,
            Error::RateLimitExceeded { .. } => 429,
            // Only request-shaped rejections pass through; an upstream 401/403
            // concerns the gateway's own provider key, not the caller.
            Error::Upstream { status, .. } => match status {
                400 | 404 | 413 | 422 => *status,
                _ => 502,
            },
            Error::AllProvidersFailed { .. } => 502,
            _ => 500,
        }
    }

    /// OpenAI-style error `type` for response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Routing { .. }
            | Error::UnconfiguredProvider { .. }
            | Error::Validation { .. }
            | Error::Serialization(_) => "invalid_request_error",
            Error::Unauthorized { .. } => "authentication_error",
            Error::RateLimitExceeded { .. } => "rate_limit_error",
            Error::Upstream { .. } | Error::AllProvidersFailed { .. } => "upstream_error",
            _ => "api_error",
        }
    }

    /// Machine-readable error `code` for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Routing { .. } => "unknown_model",
            Error::UnconfiguredProvider { .. } => "provider_not_configured",
            Error::Upstream { class, .. } => class.name(),
            Error::AllProvidersFailed { .. } => "all_providers_failed",
            Error::CacheStore { .. } => "store_error",
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::PricingNotFound { .. } => "pricing_not_found",
            Error::Unauthorized { .. } => "invalid_api_key",
            Error::Validation { .. } => "invalid_request",
            Error::Configuration { .. } => "configuration_error",
            Error::Serialization(_) => "invalid_json",
            Error::Io(_) => "io_error",
        }
    }
}
