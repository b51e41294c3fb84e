//! Usage statistics collector.
//!
//! A `UsageStats` is passed explicitly (as `Arc<UsageStats>`) to the
//! orchestrator, a builder, or a dispatch batch. Nothing is global, so two
//! batches can be tallied independently.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::Serialize;

use llmux_core::types::CanonicalResponse;

/// Per-provider counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_cost: f64,
    pub total_time_ms: u64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
    /// Models that were used but had no price list.
    pub unpriced_models: BTreeSet<String>,
}

impl StatsSnapshot {
    pub fn average_time_ms(&self) -> f64 {
        let live = self.requests - self.cache_hits;
        if live == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / live as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct UsageStats {
    inner: Mutex<StatsSnapshot>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request (including error-bearing responses).
    pub fn record_response(&self, provider: &str, response: &CanonicalResponse) {
        let mut s = self.inner.lock();
        s.requests += 1;
        let failed = response.is_error();
        if failed {
            s.errors += 1;
        }
        if response.cached {
            s.cache_hits += 1;
        } else {
            s.total_time_ms += response.response_time_ms;
            s.input_tokens += response.usage.input_tokens;
            s.output_tokens += response.usage.output_tokens;
            s.cached_tokens += response.usage.cached_tokens;
            s.total_cost += response.cost;
        }

        let p = s.by_provider.entry(provider.to_string()).or_default();
        p.requests += 1;
        if failed {
            p.errors += 1;
        }
        if response.cached {
            p.cache_hits += 1;
        } else {
            p.input_tokens += response.usage.input_tokens;
            p.output_tokens += response.usage.output_tokens;
            p.cost += response.cost;
        }
    }

    /// Record a request that ended in an error before a response existed.
    pub fn record_failure(&self, provider: &str) {
        let mut s = self.inner.lock();
        s.requests += 1;
        s.errors += 1;
        let p = s.by_provider.entry(provider.to_string()).or_default();
        p.requests += 1;
        p.errors += 1;
    }

    pub fn record_unpriced(&self, model: &str) {
        self.inner.lock().unpriced_models.insert(model.to_string());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = StatsSnapshot::default();
    }
}
