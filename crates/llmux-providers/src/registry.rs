//! Provider registry: static specs for the supported vendors.
//!
//! Each `ProviderSpec` carries the metadata needed to reach a vendor
//! (env var, default base URL, default model, auth scheme, model keywords)
//! and the adapter function pairs for chat requests and model listings.
//! Dispatch is a table lookup by name; there is no trait-object hierarchy.

use serde_json::Value;
use tracing::debug;

use llmux_core::config::{ProviderConfig, ProvidersConfig};
use llmux_core::types::{CanonicalRequest, CanonicalResponse, ModelInfo};
use llmux_core::{Error, Result};

pub use crate::adapter::AuthScheme;
use crate::adapter::{api_base, PreparedRequest};
use crate::{claude, gemini, grok, openai};

/// Build a vendor chat request from a canonical one.
pub type PrepareFn = fn(&CanonicalRequest, &ProviderConfig) -> PreparedRequest;
/// Parse a vendor payload: `(raw, model, elapsed_ms)`.
pub type ParseFn = fn(&Value, &str, u64) -> CanonicalResponse;
/// Build the vendor's model-listing request.
pub type ListModelsFn = fn(&ProviderConfig) -> PreparedRequest;
/// Parse a model-listing payload.
pub type ParseModelsFn = fn(&Value) -> Vec<ModelInfo>;

// ─────────────────────────────────────────────
// ProviderSpec
// ─────────────────────────────────────────────

/// Static specification for one vendor.
#[derive(Clone, Copy)]
pub struct ProviderSpec {
    /// Internal name, the key used in config and requests (e.g. `"claude"`).
    pub name: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Environment variable conventionally holding the API key.
    pub env_key: &'static str,
    /// Lowercase substrings that identify this vendor's model ids.
    pub keywords: &'static [&'static str],
    pub default_api_base: &'static str,
    pub default_model: &'static str,
    pub auth: AuthScheme,
    pub prepare: PrepareFn,
    pub parse: ParseFn,
    pub list_models: ListModelsFn,
    pub parse_models: ParseModelsFn,
}

impl ProviderSpec {
    /// Build an authenticated chat request.
    pub fn prepare_request(&self, request: &CanonicalRequest, config: &ProviderConfig) -> PreparedRequest {
        (self.prepare)(request, config).with_auth(self.auth, &config.api_key)
    }

    /// Build an authenticated model-listing request.
    pub fn list_models_request(&self, config: &ProviderConfig) -> PreparedRequest {
        (self.list_models)(config).with_auth(self.auth, &config.api_key)
    }
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("default_api_base", &self.default_api_base)
            .field("default_model", &self.default_model)
            .field("auth", &self.auth)
            .finish()
    }
}

/// Supported vendors, in keyword-matching priority order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        env_key: "OPENAI_API_KEY",
        keywords: &["gpt", "o1", "o3", "o4", "chatgpt", "dall-e", "text-embedding"],
        default_api_base: openai::DEFAULT_API_BASE,
        default_model: openai::DEFAULT_MODEL,
        auth: openai::AUTH,
        prepare: openai::prepare,
        parse: openai::parse,
        list_models: openai::list_models,
        parse_models: openai::parse_models,
    },
    ProviderSpec {
        name: "claude",
        display_name: "Anthropic Claude",
        env_key: "ANTHROPIC_API_KEY",
        keywords: &["claude", "anthropic"],
        default_api_base: claude::DEFAULT_API_BASE,
        default_model: claude::DEFAULT_MODEL,
        auth: claude::AUTH,
        prepare: claude::prepare,
        parse: claude::parse,
        list_models: claude::list_models,
        parse_models: claude::parse_models,
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Google Gemini",
        env_key: "GEMINI_API_KEY",
        keywords: &["gemini", "gemma"],
        default_api_base: gemini::DEFAULT_API_BASE,
        default_model: gemini::DEFAULT_MODEL,
        auth: gemini::AUTH,
        prepare: gemini::prepare,
        parse: gemini::parse,
        list_models: gemini::list_models,
        parse_models: gemini::parse_models,
    },
    ProviderSpec {
        name: "grok",
        display_name: "xAI Grok",
        env_key: "XAI_API_KEY",
        keywords: &["grok", "xai"],
        default_api_base: grok::DEFAULT_API_BASE,
        default_model: grok::DEFAULT_MODEL,
        auth: grok::AUTH,
        prepare: grok::prepare,
        parse: grok::parse,
        list_models: grok::list_models,
        parse_models: grok::parse_models,
    },
];

// ─────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Find the provider whose keywords appear in `model`.
///
/// Keywords are matched against the start of the model id or after a `/`
/// or `-`, so `"o1"` matches `o1-mini` but not `gemini-1.5-pro-001`.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        spec.keywords
            .iter()
            .any(|kw| keyword_matches(&model_lower, kw))
    })
}

fn keyword_matches(model: &str, keyword: &str) -> bool {
    model
        .match_indices(keyword)
        .any(|(i, _)| i == 0 || matches!(model.as_bytes()[i - 1], b'/' | b'-' | b'.'))
}

/// Effective API base for `spec` under `config`.
pub fn effective_api_base<'a>(spec: &'a ProviderSpec, config: &'a ProviderConfig) -> &'a str {
    api_base(config, spec.default_api_base)
}

/// Pure configuration check: a non-empty credential and endpoint.
pub fn is_available(spec: &ProviderSpec, config: &ProviderConfig) -> bool {
    config.is_configured() && !effective_api_base(spec, config).is_empty()
}

// ─────────────────────────────────────────────
// ProviderRegistry
// ─────────────────────────────────────────────

/// A spec paired with the configuration it will run under.
#[derive(Clone, Debug)]
pub struct ResolvedProvider {
    pub spec: &'static ProviderSpec,
    pub config: ProviderConfig,
}

impl ResolvedProvider {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn prepare(&self, request: &CanonicalRequest) -> PreparedRequest {
        self.spec.prepare_request(request, &self.config)
    }

    pub fn parse(&self, raw: &Value, model: &str, elapsed_ms: u64) -> CanonicalResponse {
        (self.spec.parse)(raw, model, elapsed_ms)
    }
}

/// Registry bound to the user's provider configuration.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: ProvidersConfig,
}

impl ProviderRegistry {
    pub fn new(providers: ProvidersConfig) -> Self {
        Self { providers }
    }

    pub fn config_for(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get_by_name(name)
    }

    /// Resolve `name` to a spec and its config.
    ///
    /// Fails with a configuration error when the provider is unknown or has
    /// no credential. No network access happens here.
    pub fn resolve(&self, name: &str) -> Result<ResolvedProvider> {
        let spec = find_by_name(name).ok_or_else(|| {
            let known: Vec<&str> = PROVIDERS.iter().map(|s| s.name).collect();
            Error::config(format!(
                "unknown provider '{name}' (known: {})",
                known.join(", ")
            ))
        })?;
        let config = self.providers.get_by_name(spec.name).cloned().unwrap_or_default();
        if !is_available(spec, &config) {
            return Err(Error::config(format!(
                "provider '{}' is not configured: set providers.{}.apiKey or {}",
                spec.name, spec.name, spec.env_key
            )));
        }
        debug!(
            provider = spec.display_name,
            api_base = effective_api_base(spec, &config),
            "resolved provider"
        );
        Ok(ResolvedProvider { spec, config })
    }

    /// Names of providers that pass [`is_available`], in table order.
    pub fn available(&self) -> Vec<&'static str> {
        PROVIDERS
            .iter()
            .filter(|spec| {
                self.providers
                    .get_by_name(spec.name)
                    .is_some_and(|config| is_available(spec, config))
            })
            .map(|spec| spec.name)
            .collect()
    }

    /// Provider to use for a request that names `model` but no provider.
    pub fn provider_for_model(&self, model: &str) -> Option<&'static str> {
        find_by_model(model).map(|spec| spec.name)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(names: &[&str]) -> ProvidersConfig {
        let mut providers = ProvidersConfig::default();
        for name in names {
            providers.get_by_name_mut(name).unwrap().api_key = format!("{name}-key");
        }
        providers
    }

    #[test]
    fn test_all_providers_have_unique_names() {
        let mut names: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PROVIDERS.len());
    }

    #[test]
    fn test_every_provider_has_a_config_slot() {
        let providers = ProvidersConfig::default();
        for spec in PROVIDERS {
            assert!(providers.get_by_name(spec.name).is_some(), "{}", spec.name);
        }
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find_by_name("gemini").unwrap().display_name, "Google Gemini");
        assert!(find_by_name("mistral").is_none());
    }

    #[test]
    fn test_find_by_model() {
        assert_eq!(find_by_model("gpt-4o").unwrap().name, "openai");
        assert_eq!(find_by_model("o3-mini").unwrap().name, "openai");
        assert_eq!(find_by_model("claude-3-5-haiku-latest").unwrap().name, "claude");
        assert_eq!(find_by_model("models/gemini-1.5-pro-001").unwrap().name, "gemini");
        assert_eq!(find_by_model("grok-3").unwrap().name, "grok");
        assert!(find_by_model("llama-3-70b").is_none());
    }

    #[test]
    fn test_keyword_needs_boundary() {
        assert!(!keyword_matches("gemini-1.5-pro-001", "o1"));
        assert!(keyword_matches("o1-preview", "o1"));
        assert!(keyword_matches("openai/o1", "o1"));
    }

    #[test]
    fn test_resolve_unknown_is_config_error() {
        let registry = ProviderRegistry::new(configured(&["openai"]));
        let err = registry.resolve("mistral").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("mistral"));
    }

    #[test]
    fn test_resolve_unconfigured_is_config_error() {
        let registry = ProviderRegistry::new(configured(&["openai"]));
        let err = registry.resolve("claude").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_resolve_configured() {
        let registry = ProviderRegistry::new(configured(&["claude"]));
        let resolved = registry.resolve("claude").unwrap();
        assert_eq!(resolved.name(), "claude");
        let prepared = resolved.prepare(&CanonicalRequest::new("hi"));
        assert_eq!(prepared.header("x-api-key"), Some("claude-key"));
    }

    #[test]
    fn test_each_spec_places_its_credential() {
        let config = ProviderConfig {
            api_key: "secret-key".into(),
            ..Default::default()
        };
        for spec in PROVIDERS {
            let chat = spec.prepare_request(&CanonicalRequest::new("hi"), &config);
            let listing = spec.list_models_request(&config);
            for prepared in [&chat, &listing] {
                match spec.auth {
                    AuthScheme::Bearer => {
                        assert_eq!(prepared.header("authorization"), Some("Bearer secret-key"), "{}", spec.name)
                    }
                    AuthScheme::Header(name) => assert_eq!(prepared.header(name), Some("secret-key")),
                    AuthScheme::Query(name) => {
                        assert!(prepared.url.contains(&format!("{name}=secret-key")), "{}", prepared.url)
                    }
                }
            }
        }
        let gemini = find_by_name("gemini").unwrap();
        let chat = gemini.prepare_request(&CanonicalRequest::new("hi"), &config);
        assert!(chat.headers.iter().all(|(_, v)| !v.contains("secret-key")));
    }

    #[test]
    fn test_available_in_table_order() {
        let registry = ProviderRegistry::new(configured(&["grok", "openai"]));
        assert_eq!(registry.available(), vec!["openai", "grok"]);
    }

    #[test]
    fn test_is_available_blank_key() {
        let spec = find_by_name("openai").unwrap();
        let config = ProviderConfig {
            api_key: "   ".into(),
            ..Default::default()
        };
        assert!(!is_available(spec, &config));
    }

    #[test]
    fn test_provider_for_model() {
        let registry = ProviderRegistry::default();
        assert_eq!(registry.provider_for_model("claude-opus-4-1"), Some("claude"));
        assert_eq!(registry.provider_for_model("unknown"), None);
    }
}
