use std::fs;
use std::path::Path;

use super::{ApiKeyConfig, GatewayConfig};
use crate::drivers::ProviderId;
use crate::error::ErrorContext;
use crate::{Error, Result};

/// Reads `path` (when given), then applies environment overrides and
/// validates the result.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let config = match path {
        Some(path) => {
            let contents = fs::read_to_string(path).map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to read config file: {}", e),
                    ErrorContext::new()
                        .with_details(path.display().to_string())
                        .with_source("config_loader"),
                )
            })?;
            parse_yaml(&contents)?
        }
        None => GatewayConfig::default(),
    };

    let config = apply_env_overrides(config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Parses YAML and resolves `${VAR}` placeholders in secrets.
pub fn parse_yaml(contents: &str) -> Result<GatewayConfig> {
    let config: GatewayConfig = serde_yaml::from_str(contents).map_err(|e| {
        Error::configuration_with_context(
            format!("failed to parse config: {}", e),
            ErrorContext::new().with_source("config_loader"),
        )
    })?;
    Ok(substitute_env_vars(config, |name| std::env::var(name).ok()))
}

fn substitute<F>(value: &mut Option<String>, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = value.as_deref() {
        if let Some(var_name) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            *value = lookup(var_name);
        }
    }
}

fn substitute_env_vars<F>(mut config: GatewayConfig, lookup: F) -> GatewayConfig
where
    F: Fn(&str) -> Option<String>,
{
    for provider in ProviderId::ALL {
        substitute(&mut config.providers.get_mut(provider).api_key, &lookup);
    }
    substitute(&mut config.store.redis_url, &lookup);
    for key in &mut config.api_keys {
        substitute(&mut key.key, &lookup);
    }
    config
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = raw, "ignoring unparsable environment override");
            None
        }
    }
}

/// Environment variables win over file values.
pub fn apply_env_overrides<F>(mut config: GatewayConfig, lookup: F) -> GatewayConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("HOST") {
        config.server.host = v;
    }
    if let Some(port) = lookup("PORT").and_then(|v| parse_env("PORT", &v)) {
        config.server.port = port;
    }
    if let Some(secs) = lookup("GATEWAY_HTTP_TIMEOUT_SECS").and_then(|v| parse_env("GATEWAY_HTTP_TIMEOUT_SECS", &v)) {
        config.server.http_timeout_secs = secs;
    }
    if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
        config.store.redis_url = Some(url);
    }

    let keys = [
        (ProviderId::OpenAi, "OPENAI_API_KEY"),
        (ProviderId::Anthropic, "ANTHROPIC_API_KEY"),
        (ProviderId::Google, "GEMINI_API_KEY"),
    ];
    for (provider, var) in keys {
        if let Some(key) = lookup(var).filter(|v| !v.is_empty()) {
            config.providers.get_mut(provider).api_key = Some(key);
        }
    }

    if let Some(limit) = lookup("DEFAULT_RATE_LIMIT").and_then(|v| parse_env("DEFAULT_RATE_LIMIT", &v)) {
        config.rate_limit.default_per_minute = limit;
    }
    if let Some(ttl) = lookup("CACHE_TTL_SECONDS").and_then(|v| parse_env("CACHE_TTL_SECONDS", &v)) {
        config.cache.ttl_seconds = ttl;
    }
    if let Some(enabled) = lookup("CACHE_ENABLED").and_then(|v| parse_env("CACHE_ENABLED", &v)) {
        config.cache.enabled = enabled;
    }

    if let Some(raw) = lookup("GATEWAY_API_KEYS") {
        let start = config.api_keys.len();
        for (i, key) in raw.split(',').map(str::trim).filter(|k| !k.is_empty()).enumerate() {
            config.api_keys.push(ApiKeyConfig {
                name: format!("env-{}", start + i + 1),
                key: Some(key.to_string()),
                ..ApiKeyConfig::default()
            });
        }
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.logging.format = format;
    }
    config
}

fn invalid(field: &str, message: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_validator"),
    )
}

pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(invalid("server.port", "port must be non-zero"));
    }
    if config.server.http_timeout_secs == 0 {
        return Err(invalid("server.http_timeout_secs", "timeout must be non-zero"));
    }
    if config.providers.configured().is_empty() {
        return Err(invalid(
            "providers",
            "at least one provider API key must be set (OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY)",
        ));
    }
    for provider in ProviderId::ALL {
        if let Some(base) = config.providers.get(provider).base_url.as_deref() {
            url::Url::parse(base).map_err(|e| {
                invalid(
                    &format!("providers.{}.base_url", provider),
                    format!("invalid base URL '{}': {}", base, e),
                )
            })?;
        }
    }
    if let Some(redis_url) = config.store.redis_url.as_deref() {
        url::Url::parse(redis_url)
            .map_err(|e| invalid("store.redis_url", format!("invalid redis URL: {}", e)))?;
    }
    if config.api_keys.is_empty() {
        return Err(invalid(
            "api_keys",
            "at least one client API key must be configured (api_keys or GATEWAY_API_KEYS)",
        ));
    }
    for (i, key) in config.api_keys.iter().enumerate() {
        let field = format!("api_keys[{}]", i);
        match (key.key.as_deref(), key.key_sha256.as_deref()) {
            (Some(k), _) if !k.is_empty() => {}
            (_, Some(h)) if h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()) => {}
            (_, Some(_)) => return Err(invalid(&field, "key_sha256 must be 64 hex characters")),
            _ => return Err(invalid(&field, "either key or key_sha256 is required")),
        }
    }
    for (model, chain) in &config.failover {
        for fallback in chain {
            if crate::drivers::detect_provider(fallback).is_none() {
                return Err(invalid(
                    &format!("failover.{}", model),
                    format!("fallback model '{}' has no provider", fallback),
                ));
            }
        }
    }
    Ok(())
}
