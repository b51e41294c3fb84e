//! Request orchestration: resolve, look up the cache, dispatch, account.
//!
//! Resolution merges three layers key by key (explicit builder values, then
//! the named preset, then the `defaults` config section), validates the
//! result, substitutes `{{var}}` tokens, and fingerprints the final request.
//! Execution is cache lookup → adapter `prepare` → transport → adapter
//! `parse` → cost → cache write → log record.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use llmux_core::config::{Config, PricingConfig, RequestDefaults};
use llmux_core::store::{CacheStore, DirCacheStore, LocalFileStore, MemoryCacheStore, MemoryFileStore};
use llmux_core::types::{CanonicalRequest, CanonicalResponse, Options, Vars};
use llmux_core::utils::expand_home;
use llmux_core::{Error, Result};
use llmux_providers::{send_checked, Payload, ProviderRegistry, ReqwestTransport, ResolvedProvider, Transport};

use crate::cache::{fingerprint, CacheManager};
use crate::cost::CostCalculator;
use crate::logging::{JsonlLogSink, LogSink, NullLogSink, RequestLog};
use crate::models::ModelRepository;
use crate::presets::PresetStore;
use crate::request::RequestBuilder;
use crate::stats::UsageStats;

/// Valid sampling temperature range.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=2.0;

// ─────────────────────────────────────────────
// Variable substitution
// ─────────────────────────────────────────────

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("variable pattern is a valid regex")
    })
}

/// Replace every `{{name}}` whose name is in `vars`. Unknown names stay verbatim.
pub fn substitute_vars(template: &str, vars: &Vars) -> String {
    if vars.is_empty() || !template.contains("{{") {
        return template.to_string();
    }
    var_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// ─────────────────────────────────────────────
// ResolvedRequest
// ─────────────────────────────────────────────

/// A fully merged, validated, substituted request, ready to execute.
#[derive(Clone, Debug)]
pub struct ResolvedRequest {
    /// Provider and model are always set.
    pub request: CanonicalRequest,
    pub provider: ResolvedProvider,
    pub fingerprint: String,
    pub timeout: Duration,
    pub use_cache: bool,
    pub stats: Arc<UsageStats>,
}

impl ResolvedRequest {
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.request.model.as_deref().unwrap_or(self.provider.spec.default_model)
    }
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

/// Shared, cheaply cloneable entry point. Every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct Orchestrator {
    defaults: RequestDefaults,
    cache_ttl: Option<Duration>,
    pricing: PricingConfig,
    registry: ProviderRegistry,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheManager>,
    costs: CostCalculator,
    presets: Option<Arc<PresetStore>>,
    log_sink: Arc<dyn LogSink>,
    stats: Arc<UsageStats>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("defaults", &self.defaults)
            .field("cache", &self.cache)
            .field("available", &self.registry.available())
            .finish()
    }
}

impl Orchestrator {
    /// In-memory collaborators: memory cache, empty model catalog, no
    /// presets, no request log. Replace them with the `with_*` methods.
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let models = Arc::new(ModelRepository::new(
            Arc::new(MemoryFileStore::new()),
            "models.yaml",
            Duration::from_secs(config.models.cache_ttl_secs),
        ));
        Self {
            defaults: config.defaults.clone(),
            cache_ttl: Some(Duration::from_secs(config.cache.ttl_secs)).filter(|t| !t.is_zero()),
            pricing: config.pricing.clone(),
            registry: ProviderRegistry::new(config.providers.clone()),
            transport,
            cache: Arc::new(CacheManager::new(
                Arc::new(MemoryCacheStore::new()),
                config.cache.enabled,
            )),
            costs: CostCalculator::new(models, config.pricing.clone()),
            presets: None,
            log_sink: Arc::new(NullLogSink),
            stats: Arc::new(UsageStats::new()),
        }
    }

    /// Disk-backed collaborators at the paths in `config.storage`, the
    /// `reqwest` transport, and a directory cache when `cache.dir` is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        let files = Arc::new(LocalFileStore::new());

        let cache_store: Arc<dyn CacheStore> = match config.cache.dir {
            Some(ref dir) => Arc::new(DirCacheStore::new(expand_home(dir))?),
            None => Arc::new(MemoryCacheStore::new()),
        };
        let models = ModelRepository::new(
            files.clone(),
            expand_home(&config.storage.models_path),
            Duration::from_secs(config.models.cache_ttl_secs),
        );
        let presets = PresetStore::new(files, expand_home(&config.storage.presets_dir));
        let log_sink: Arc<dyn LogSink> = if config.storage.log_path.trim().is_empty() {
            Arc::new(NullLogSink)
        } else {
            Arc::new(JsonlLogSink::new(expand_home(&config.storage.log_path)))
        };

        Ok(Self::new(config, transport)
            .with_cache(CacheManager::new(cache_store, config.cache.enabled))
            .with_models(Arc::new(models))
            .with_presets(presets)
            .with_log_sink(log_sink))
    }

    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_models(mut self, models: Arc<ModelRepository>) -> Self {
        self.costs = CostCalculator::new(models, self.pricing.clone());
        self
    }

    pub fn with_presets(mut self, presets: PresetStore) -> Self {
        self.presets = Some(Arc::new(presets));
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_stats(mut self, stats: Arc<UsageStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn costs(&self) -> &CostCalculator {
        &self.costs
    }

    pub fn models(&self) -> &ModelRepository {
        self.costs.models()
    }

    pub fn presets(&self) -> Option<&PresetStore> {
        self.presets.as_deref()
    }

    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Start a request.
    pub fn prompt(&self, prompt: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone()).prompt(prompt)
    }

    // ── resolution ──

    /// Merge, validate, substitute, and fingerprint a builder's request.
    pub fn resolve(&self, builder: &RequestBuilder) -> Result<ResolvedRequest> {
        let explicit = builder.fields();

        let preset = match builder.preset_name() {
            Some(name) => {
                let store = self
                    .presets
                    .as_ref()
                    .ok_or_else(|| Error::config(format!("preset '{name}' requested but no preset store is configured")))?;
                Some(
                    store
                        .get(name)?
                        .ok_or_else(|| Error::config(format!("unknown preset '{name}'")))?,
                )
            }
            None => None,
        };

        // Provider: explicit > inferred from an explicit model > preset > defaults.
        let provider_name = explicit
            .provider
            .clone()
            .or_else(|| {
                explicit
                    .model
                    .as_deref()
                    .and_then(|m| self.registry.provider_for_model(m))
                    .map(String::from)
            })
            .or_else(|| preset.as_ref().and_then(|p| p.provider.clone()))
            .unwrap_or_else(|| self.defaults.provider.clone());
        let provider = self.registry.resolve(&provider_name)?;

        let preset_model = preset
            .as_ref()
            .filter(|p| p.provider.as_deref().map_or(true, |pp| pp == provider.name()))
            .and_then(|p| p.model.clone());
        let default_model = Some(self.defaults.model.clone())
            .filter(|m| !m.is_empty() && self.defaults.provider == provider.name());
        let model = explicit
            .model
            .clone()
            .or(preset_model)
            .or(default_model)
            .unwrap_or_else(|| provider.spec.default_model.to_string());

        let mut options = Options::new();
        options.insert("temperature".to_string(), json!(self.defaults.temperature));
        options.insert("max_tokens".to_string(), json!(self.defaults.max_tokens));
        if let Some(ref p) = preset {
            options.extend(p.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        options.extend(explicit.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        options.retain(|_, v| !v.is_null());
        validate_options(&options)?;

        let system_prompt = explicit
            .system_prompt
            .clone()
            .or_else(|| preset.as_ref().and_then(|p| p.system_prompt.clone()))
            .filter(|s| !s.is_empty());

        if explicit.prompt.trim().is_empty() {
            return Err(Error::config("prompt is empty"));
        }

        let request = CanonicalRequest {
            prompt: substitute_vars(&explicit.prompt, &explicit.vars),
            system_prompt: system_prompt.map(|s| substitute_vars(&s, &explicit.vars)),
            model: Some(model),
            provider: Some(provider.name().to_string()),
            options,
            vars: explicit.vars.clone(),
            stream: explicit.stream,
        };

        debug!(
            provider = provider.name(),
            model = request.model.as_deref().unwrap_or(""),
            preset = builder.preset_name().unwrap_or("-"),
            "request resolved"
        );

        Ok(ResolvedRequest {
            fingerprint: fingerprint(&request),
            request,
            provider,
            timeout: builder
                .timeout_override()
                .unwrap_or_else(|| Duration::from_secs(self.defaults.timeout_secs)),
            use_cache: !builder.cache_bypassed(),
            stats: builder
                .stats_override()
                .cloned()
                .unwrap_or_else(|| Arc::clone(&self.stats)),
        })
    }

    // ── execution ──

    /// Run a resolved request.
    ///
    /// Provider and transport failures come back as `Err`. A 2xx answer
    /// that cannot be parsed comes back as a response with `error` set and
    /// is never cached.
    pub async fn execute(&self, resolved: ResolvedRequest) -> Result<CanonicalResponse> {
        let provider = resolved.provider_name();
        let model = resolved.model().to_string();

        if resolved.use_cache {
            if let Some(hit) = self.cache.get(&resolved.fingerprint) {
                debug!(provider, model = %model, "cache hit");
                let hit = hit.attributed(Some(provider), Some(&model));
                self.finish(&resolved, &hit);
                return Ok(hit);
            }
        }

        let prepared = resolved.provider.prepare(&resolved.request);
        debug!(provider, model = %model, request = ?prepared, "dispatching to vendor");

        let started = Instant::now();
        let outcome = send_checked(self.transport.as_ref(), provider, &prepared, resolved.timeout).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let payload = match outcome {
            Ok(payload) => payload,
            Err(e) => {
                error!(provider, model = %model, error = %e, "vendor request failed");
                resolved.stats.record_failure(provider);
                self.log(RequestLog::failure(
                    provider,
                    &model,
                    &resolved.request.prompt,
                    elapsed_ms,
                    &e.to_string(),
                ));
                return Err(e);
            }
        };

        let mut response = match payload {
            Payload::Json(raw) => resolved.provider.parse(&raw, &model, elapsed_ms),
            Payload::Malformed { raw, reason } => CanonicalResponse {
                meta: Value::String(raw),
                response_time_ms: elapsed_ms,
                error: Some(format!("malformed response body: {reason}")),
                ..Default::default()
            }
            .attributed(Some(provider), Some(&model)),
        };

        let estimate = self.costs.calculate(Some(provider), &model, &response.usage);
        response.cost = estimate.cost;
        if estimate.unpriced {
            resolved.stats.record_unpriced(&model);
        }

        match response.error {
            Some(ref err) => warn!(provider, model = %model, error = %err, "degraded response, not cached"),
            None if resolved.use_cache => self.cache.put(
                &resolved.fingerprint,
                &response,
                self.cache_ttl,
                &[provider, model.as_str()],
            ),
            None => {}
        }

        self.finish(&resolved, &response);
        Ok(response)
    }

    fn finish(&self, resolved: &ResolvedRequest, response: &CanonicalResponse) {
        let provider = resolved.provider_name();
        resolved.stats.record_response(provider, response);
        self.log(RequestLog::from_response(
            provider,
            resolved.model(),
            &resolved.request.prompt,
            response,
        ));
    }

    fn log(&self, record: RequestLog) {
        if let Err(e) = self.log_sink.record(&record) {
            warn!(error = %e, "failed to write request log");
        }
    }

    /// Model repository path, for status output.
    pub fn models_path(&self) -> &Path {
        self.models().path()
    }
}

fn validate_options(options: &Options) -> Result<()> {
    if let Some(value) = options.get("temperature") {
        match value.as_f64() {
            Some(t) if TEMPERATURE_RANGE.contains(&t) => {}
            _ => {
                return Err(Error::config(format!(
                    "temperature must be a number between 0 and 2, got {value}"
                )))
            }
        }
    }
    if let Some(value) = options.get("max_tokens") {
        match value.as_u64() {
            Some(n) if n > 0 => {}
            _ => {
                return Err(Error::config(format!(
                    "max_tokens must be a positive integer, got {value}"
                )))
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
