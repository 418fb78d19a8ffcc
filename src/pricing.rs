//! Model pricing and cost estimation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::drivers::ProviderId;
use crate::types::Usage;
use crate::{Error, Result};

/// USD per 1000 tokens for one (provider, model) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k_tokens: f64,
    pub output_per_1k_tokens: f64,
}

impl ModelPricing {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_1k_tokens: input,
            output_per_1k_tokens: output,
        }
    }

    pub fn calculate_cost(&self, usage: &Usage) -> CostEstimate {
        let input_cost = (usage.prompt_tokens as f64 / 1000.0) * self.input_per_1k_tokens;
        let output_cost = (usage.completion_tokens as f64 / 1000.0) * self.output_per_1k_tokens;
        CostEstimate {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl CostEstimate {
    pub fn format(&self) -> String {
        format!("USD {:.6}", self.total_cost)
    }
}

/// One configured pricing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub provider: ProviderId,
    pub model: String,
    pub input_per_1k_tokens: f64,
    pub output_per_1k_tokens: f64,
}

/// Lookup of per-model prices.
pub trait PricingSource: Send + Sync + std::fmt::Debug {
    fn pricing(&self, provider: ProviderId, model: &str) -> Result<ModelPricing>;

    /// Cost of `usage` on (provider, model).
    fn cost(&self, provider: ProviderId, model: &str, usage: &Usage) -> Result<f64> {
        Ok(self.pricing(provider, model)?.calculate_cost(usage).total_cost)
    }
}

const BUILTIN: &[(ProviderId, &str, f64, f64)] = &[
    (ProviderId::OpenAi, "gpt-4o", 0.0025, 0.01),
    (ProviderId::OpenAi, "gpt-4o-mini", 0.00015, 0.0006),
    (ProviderId::OpenAi, "gpt-4", 0.03, 0.06),
    (ProviderId::Anthropic, "claude-sonnet-4-5-20250929", 0.003, 0.015),
    (ProviderId::Anthropic, "claude-haiku-4-5-20251001", 0.001, 0.005),
    (ProviderId::Anthropic, "claude-opus-4-5-20251101", 0.005, 0.025),
    (ProviderId::Google, "gemini-2.5-pro", 0.00125, 0.01),
    (ProviderId::Google, "gemini-2.5-flash", 0.0003, 0.0025),
];

/// In-memory price table: built-in rows for the default failover models,
/// overridable from configuration.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    rows: HashMap<(ProviderId, String), ModelPricing>,
}

impl PricingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let rows = BUILTIN
            .iter()
            .map(|(p, m, i, o)| ((*p, m.to_string()), ModelPricing::new(*i, *o)))
            .collect();
        Self { rows }
    }

    pub fn with_entries(mut self, entries: &[PricingEntry]) -> Self {
        for e in entries {
            self.insert(
                e.provider,
                e.model.clone(),
                ModelPricing::new(e.input_per_1k_tokens, e.output_per_1k_tokens),
            );
        }
        self
    }

    pub fn insert(&mut self, provider: ProviderId, model: impl Into<String>, pricing: ModelPricing) {
        self.rows.insert((provider, model.into()), pricing);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl PricingSource for PricingTable {
    fn pricing(&self, provider: ProviderId, model: &str) -> Result<ModelPricing> {
        self.rows
            .get(&(provider, model.to_string()))
            .copied()
            .ok_or_else(|| Error::PricingNotFound {
                provider,
                model: model.to_string(),
            })
    }
}
