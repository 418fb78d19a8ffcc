//! Static failover chains: which equivalent models to try, in order, when a
//! model's provider fails transiently.

use std::collections::HashMap;

/// Built-in chains, keyed by the originally requested model.
const DEFAULT_CHAINS: &[(&str, &[&str])] = &[
    ("gpt-4o", &["claude-sonnet-4-5-20250929", "gemini-2.5-pro"]),
    ("gpt-4o-mini", &["claude-haiku-4-5-20251001", "gemini-2.5-flash"]),
    ("gpt-4", &["claude-opus-4-5-20251101", "gemini-2.5-pro"]),
    ("claude-sonnet-4-5-20250929", &["gpt-4o", "gemini-2.5-pro"]),
    ("claude-haiku-4-5-20251001", &["gpt-4o-mini", "gemini-2.5-flash"]),
    ("gemini-2.5-flash", &["gpt-4o-mini", "claude-haiku-4-5-20251001"]),
    ("gemini-2.5-pro", &["gpt-4o", "claude-sonnet-4-5-20250929"]),
];

/// Read-only `model -> [fallback models]` table.
///
/// Built once at startup; lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct FailoverTable {
    chains: HashMap<String, Vec<String>>,
}

impl FailoverTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in cross-provider equivalence chains.
    pub fn defaults() -> Self {
        let chains = DEFAULT_CHAINS
            .iter()
            .map(|(model, chain)| {
                (
                    model.to_string(),
                    chain.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect();
        Self { chains }
    }

    /// Adds or replaces chains; an empty chain disables failover for that model.
    pub fn with_overrides(mut self, overrides: &HashMap<String, Vec<String>>) -> Self {
        for (model, chain) in overrides {
            self.chains.insert(model.clone(), chain.clone());
        }
        self
    }

    pub fn with_chain(mut self, model: impl Into<String>, chain: Vec<String>) -> Self {
        self.chains.insert(model.into(), chain);
        self
    }

    /// Unfiltered chain for `model`; empty when none is configured.
    pub fn chain(&self, model: &str) -> &[String] {
        self.chains.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All `(model, chain)` pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.chains.iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
