//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing can be added at runtime from the config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M prompt tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M completion tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 * self.input_per_m + completion_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let defaults: [(&str, f64, f64); 14] = [
            // ── OpenAI ─────────────────────────────────────────────────
            ("gpt-3.5-turbo", 0.5, 1.5),
            ("gpt-3.5-turbo-0125", 0.5, 1.5),
            ("gpt-3.5-turbo-1106", 1.0, 2.0),
            ("gpt-4", 30.0, 60.0),
            ("gpt-4-32k", 60.0, 120.0),
            ("gpt-4-turbo", 10.0, 30.0),
            ("gpt-4o", 2.5, 10.0),
            ("gpt-4o-mini", 0.15, 0.6),
            ("o1", 15.0, 60.0),
            ("o3-mini", 1.1, 4.4),
            // ── Anthropic ──────────────────────────────────────────────
            ("claude-3-haiku", 0.25, 1.25),
            ("claude-3.5-sonnet", 3.0, 15.0),
            ("claude-sonnet-4", 3.0, 15.0),
            // ── Others ─────────────────────────────────────────────────
            ("deepseek-v3", 0.27, 1.1),
        ];

        let prices = defaults
            .into_iter()
            .map(|(name, input, output)| (name.to_string(), ModelPricing::new(input, output)))
            .collect();

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Exact lookup.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(model.into(), pricing);
    }

    /// Find pricing for a model name as a provider reports it.
    ///
    /// Tries an exact match, then the name without a provider prefix
    /// (`openai/gpt-4o` → `gpt-4o`), then the longest known name that the
    /// model starts with (`gpt-4o-mini-2024-07-18` → `gpt-4o-mini`).
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.read();
        if let Some(p) = prices.get(model) {
            return Some(*p);
        }

        let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        if let Some(p) = prices.get(bare.as_str()) {
            return Some(*p);
        }

        prices
            .iter()
            .filter(|(key, _)| {
                let bare_key = key.rsplit('/').next().unwrap_or(key).to_lowercase();
                bare.starts_with(&bare_key)
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Cost of one call, 0.0 if the model is unknown.
    pub fn compute_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.lookup(model)
            .map(|p| p.cost(prompt_tokens, completion_tokens))
            .unwrap_or(0.0)
    }

    /// All known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // gpt-4-turbo: $10/M input, $30/M output
        // (1000 * 10 + 500 * 30) / 1M = 0.025
        let cost = table.compute_cost("gpt-4-turbo", 1000, 500);
        assert!((cost - 0.025).abs() < 1e-10);
    }

    #[test]
    fn provider_prefix_is_stripped() {
        let table = PricingTable::with_defaults();
        let direct = table.compute_cost("gpt-4o", 1_000_000, 0);
        let prefixed = table.compute_cost("openai/gpt-4o", 1_000_000, 0);
        assert!((direct - 2.5).abs() < 1e-10);
        assert!((prefixed - direct).abs() < 1e-10);
    }

    #[test]
    fn dated_model_matches_longest_prefix() {
        let table = PricingTable::with_defaults();
        // Must pick gpt-4o-mini, not gpt-4o or gpt-4
        let cost = table.compute_cost("gpt-4o-mini-2024-07-18", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-10);
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.compute_cost("mystery-model", 1000, 500), 0.0);
    }

    #[test]
    fn custom_pricing_overrides() {
        let table = PricingTable::with_defaults();
        table.set("gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("gpt-4o", 1_000_000, 0);
        assert!((cost - 5.0).abs() < 1e-10);

        let empty = PricingTable::empty();
        assert!(empty.is_empty());
        empty.set("local/llama", ModelPricing::new(1.0, 2.0));
        assert!((empty.compute_cost("local/llama", 1_000_000, 1_000_000) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn list_models_sorted() {
        let models = PricingTable::with_defaults().models();
        assert!(models.contains(&"gpt-3.5-turbo".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }
}
