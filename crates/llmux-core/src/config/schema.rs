//! Configuration schema.
//!
//! Hierarchy: `Config` → `RequestDefaults`, `ProvidersConfig`, `CacheConfig`,
//! `PricingConfig`, `StorageConfig`, `ModelsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.llmux/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub defaults: RequestDefaults,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub pricing: PricingConfig,
    pub storage: StorageConfig,
    pub models: ModelsConfig,
}

// ─────────────────────────────────────────────
// Request defaults
// ─────────────────────────────────────────────

/// Global request defaults, the lowest-precedence layer under presets and
/// explicit builder values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDefaults {
    /// Provider used when neither the request nor its preset names one.
    pub provider: String,
    /// Model used when neither the request nor its preset names one.
    /// Empty means "the provider's default model".
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Network timeout per vendor call.
    pub timeout_secs: u64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single vendor (API key, base URL, headers).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Vendor API version header value (Claude's `anthropic-version`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// All provider configurations, one per supported vendor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub claude: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub grok: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by name (e.g. `"claude"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "claude" => Some(&self.claude),
            "gemini" => Some(&self.gemini),
            "grok" => Some(&self.grok),
            _ => None,
        }
    }

    /// Mutable access by name, used by env overrides and tests.
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openai" => Some(&mut self.openai),
            "claude" => Some(&mut self.claude),
            "gemini" => Some(&mut self.gemini),
            "grok" => Some(&mut self.grok),
            _ => None,
        }
    }

    /// Convert to a map keyed by provider name.
    pub fn to_map(&self) -> HashMap<String, ProviderConfig> {
        let entries: &[(&str, &ProviderConfig)] = &[
            ("openai", &self.openai),
            ("claude", &self.claude),
            ("gemini", &self.gemini),
            ("grok", &self.grok),
        ];
        entries
            .iter()
            .map(|(name, config)| (name.to_string(), (*config).clone()))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────

/// Response cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// When false, every lookup misses and every write is dropped.
    pub enabled: bool,
    /// Entry lifetime. `0` means entries never expire.
    pub ttl_secs: u64,
    /// Directory for the on-disk cache store. `None` keeps the cache in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            dir: None,
        }
    }
}

// ─────────────────────────────────────────────
// Pricing
// ─────────────────────────────────────────────

/// Display-currency settings for cost accounting.
///
/// Vendor prices are published in USD; `multiplier` converts them to the
/// display currency. It is a fixed rate, never fetched live.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingConfig {
    pub currency: String,
    pub multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            multiplier: 1.0,
        }
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

/// Locations of the durable stores. `~` is expanded at use.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// YAML file holding the model repository.
    pub models_path: String,
    /// Directory of `<name>.yaml` preset files.
    pub presets_dir: String,
    /// JSONL request log. Empty disables the file sink.
    pub log_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            models_path: "~/.llmux/models.yaml".to_string(),
            presets_dir: "~/.llmux/presets".to_string(),
            log_path: "~/.llmux/logs/requests.jsonl".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────

/// Model repository settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsConfig {
    /// How long the in-memory snapshot is trusted before re-reading the file.
    pub cache_ttl_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
