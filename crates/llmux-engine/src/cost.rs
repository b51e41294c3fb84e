//! Cost accounting from per-model price lists.
//!
//! Prices are published in USD per million tokens. Cached input tokens are
//! billed at the cached rate instead of the input rate:
//!
//! ```text
//! cost = (input × pIn + output × pOut − cached × (pIn − pCached)) × multiplier
//! ```
//!
//! A model without pricing costs 0 and is flagged `unpriced` so callers can
//! surface the gap.

use std::sync::Arc;

use tracing::warn;

use llmux_core::config::PricingConfig;
use llmux_core::types::{ModelInfo, Pricing, Usage};
use llmux_core::Result;

use crate::models::ModelRepository;

const PER_MILLION: f64 = 1_000_000.0;

/// Result of a cost lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    /// No price list was found for the model; `cost` is 0.
    pub unpriced: bool,
}

/// Apply the cost formula to one price list. Never negative.
pub fn compute_cost(
    pricing: &Pricing,
    input_tokens: u64,
    output_tokens: u64,
    cached_tokens: u64,
    multiplier: f64,
) -> f64 {
    let p_in = pricing.input / PER_MILLION;
    let p_out = pricing.output / PER_MILLION;
    let p_cached = pricing.cached_input.unwrap_or(pricing.input) / PER_MILLION;

    let usd = input_tokens as f64 * p_in + output_tokens as f64 * p_out
        - cached_tokens as f64 * (p_in - p_cached);
    (usd * multiplier).max(0.0)
}

#[derive(Debug, Clone)]
pub struct CostCalculator {
    models: Arc<ModelRepository>,
    pricing: PricingConfig,
}

impl CostCalculator {
    pub fn new(models: Arc<ModelRepository>, pricing: PricingConfig) -> Self {
        Self { models, pricing }
    }

    pub fn currency(&self) -> &str {
        &self.pricing.currency
    }

    pub fn models(&self) -> &Arc<ModelRepository> {
        &self.models
    }

    /// Cost of `usage` on `model_id`.
    ///
    /// The model is looked up under `provider` first, then under any provider.
    pub fn calculate(&self, provider: Option<&str>, model_id: &str, usage: &Usage) -> CostEstimate {
        match self.lookup(provider, model_id).and_then(|m| m.pricing) {
            Some(pricing) => CostEstimate {
                cost: compute_cost(
                    &pricing,
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cached_tokens,
                    self.pricing.multiplier,
                ),
                unpriced: false,
            },
            None => {
                warn!(provider = provider.unwrap_or("?"), model = model_id, "no pricing for model, cost recorded as 0");
                CostEstimate {
                    cost: 0.0,
                    unpriced: true,
                }
            }
        }
    }

    pub fn cost(&self, model_id: &str, input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> f64 {
        self.calculate(None, model_id, &Usage::new(input_tokens, output_tokens, cached_tokens))
            .cost
    }

    pub fn models_by_provider(&self, provider: &str) -> Result<Vec<ModelInfo>> {
        self.models.list(Some(provider))
    }

    pub fn models_by_feature(&self, feature: &str) -> Result<Vec<ModelInfo>> {
        Ok(self
            .models
            .list(None)?
            .into_iter()
            .filter(|m| m.has_feature(feature))
            .collect())
    }

    fn lookup(&self, provider: Option<&str>, model_id: &str) -> Option<ModelInfo> {
        let found = match provider {
            Some(p) => self
                .models
                .get(p, model_id)
                .and_then(|m| match m {
                    Some(m) => Ok(Some(m)),
                    None => self.models.find(model_id),
                }),
            None => self.models.find(model_id),
        };
        found.unwrap_or_else(|e| {
            warn!(model = model_id, error = %e, "model lookup failed during costing");
            None
        })
    }
}
