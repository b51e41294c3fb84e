//! Canonical data model shared by adapters, the engine, and callers.
//!
//! Vendor wire formats never leak past the adapters: everything above them
//! speaks [`CanonicalRequest`] and [`CanonicalResponse`]. JSON uses camelCase
//! keys, matching the external contract.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form request options (`temperature`, `max_tokens`, `top_p`, …).
pub type Options = HashMap<String, Value>;

/// Template variables substituted into `{{name}}` tokens.
pub type Vars = HashMap<String, String>;

// ─────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────

/// Provider-agnostic request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanonicalRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub options: Options,
    pub vars: Vars,
    pub stream: bool,
}

impl CanonicalRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// `options.temperature` as a float, if present and numeric.
    pub fn temperature(&self) -> Option<f64> {
        self.options.get("temperature").and_then(Value::as_f64)
    }

    /// `options.max_tokens` as an integer, if present and numeric.
    pub fn max_tokens(&self) -> Option<u64> {
        self.options.get("max_tokens").and_then(Value::as_u64)
    }
}

// ─────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────

/// Normalized token counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Input tokens served from the vendor's prompt cache.
    pub cached_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Provider-agnostic response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanonicalResponse {
    pub content: String,
    pub usage: Usage,
    /// Cost in the configured display currency. Never negative.
    pub cost: f64,
    /// Raw vendor payload (opaque).
    pub meta: Value,
    /// True when served from the response cache.
    pub cached: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CanonicalResponse {
    /// An error-bearing response with empty content.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach the provider/model that produced (or failed to produce) this response.
    pub fn attributed(mut self, provider: Option<&str>, model: Option<&str>) -> Self {
        self.provider = provider.map(String::from);
        self.model = model.map(String::from);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ─────────────────────────────────────────────
// Model metadata
// ─────────────────────────────────────────────

/// Vendor price list for one model, in USD per million tokens.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
    /// Discounted rate for prompt-cache hits. Defaults to `input` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input: Option<f64>,
}

impl Pricing {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cached_input: None,
        }
    }

    pub fn with_cached_input(mut self, cached_input: f64) -> Self {
        self.cached_input = Some(cached_input);
        self
    }
}

/// Durable metadata about one vendor model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub features: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ModelInfo {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            model_type: "chat".to_string(),
            ..Default::default()
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

// ─────────────────────────────────────────────
// Cache entries
// ─────────────────────────────────────────────

/// One cached response, keyed by its request fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub value: CanonicalResponse,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Absolute expiry in Unix milliseconds. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// ─────────────────────────────────────────────
// Presets
// ─────────────────────────────────────────────

/// Named, versioned request configuration bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preset {
    pub name: String,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub options: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_json_uses_camel_case() {
        let mut req = CanonicalRequest::new("hi");
        req.system_prompt = Some("be brief".into());
        let raw = serde_json::to_value(&req).unwrap();
        assert_eq!(raw["systemPrompt"], "be brief");
        assert!(raw.get("model").is_none());
        assert_eq!(raw["stream"], false);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: CanonicalRequest =
            serde_json::from_value(json!({"prompt": "hello", "provider": "claude"})).unwrap();
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.provider.as_deref(), Some("claude"));
        assert!(req.options.is_empty());
        assert!(!req.stream);
    }

    #[test]
    fn test_request_option_accessors() {
        let mut req = CanonicalRequest::new("x");
        req.options.insert("temperature".into(), json!(0.3));
        req.options.insert("max_tokens".into(), json!(256));
        assert_eq!(req.temperature(), Some(0.3));
        assert_eq!(req.max_tokens(), Some(256));
    }

    #[test]
    fn test_response_json_shape() {
        let resp = CanonicalResponse {
            content: "ok".into(),
            usage: Usage::new(10, 5, 0),
            response_time_ms: 42,
            ..Default::default()
        };
        let raw = serde_json::to_value(&resp).unwrap();
        assert_eq!(raw["responseTimeMs"], 42);
        assert_eq!(raw["usage"]["totalTokens"], 15);
        assert!(raw.get("error").is_none());
    }

    #[test]
    fn test_failed_response() {
        let resp = CanonicalResponse::failed("boom").attributed(Some("grok"), Some("grok-3"));
        assert!(resp.is_error());
        assert!(resp.content.is_empty());
        assert_eq!(resp.provider.as_deref(), Some("grok"));
    }

    #[test]
    fn test_model_info_type_field() {
        let model = ModelInfo::new("openai", "gpt-4o").with_feature("vision");
        let raw = serde_json::to_value(&model).unwrap();
        assert_eq!(raw["type"], "chat");
        assert_eq!(raw["features"], json!(["vision"]));
        assert!(model.has_feature("vision"));
    }

    #[test]
    fn test_cache_entry_expiry() {
        let entry = CacheEntry {
            fingerprint: "fp".into(),
            value: CanonicalResponse::default(),
            tags: BTreeSet::new(),
            expires_at_ms: Some(1_000),
        };
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));

        let forever = CacheEntry {
            expires_at_ms: None,
            ..entry
        };
        assert!(!forever.is_expired(i64::MAX));
    }
}
