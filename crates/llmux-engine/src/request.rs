//! Immutable request builder.
//!
//! Every setter takes `&self` and returns a new builder, so a partially
//! configured builder can be kept and branched:
//!
//! ```ignore
//! let base = orchestrator.prompt("Summarize: {{text}}").temperature(0.2);
//! let short = base.max_tokens(100);
//! let long = base.max_tokens(2000);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Number, Value};

use llmux_core::types::{CanonicalRequest, CanonicalResponse, Options, Vars};
use llmux_core::{Error, Result};

use crate::orchestrator::{Orchestrator, ResolvedRequest};
use crate::stats::UsageStats;

#[derive(Clone, Debug)]
pub struct RequestBuilder {
    orchestrator: Orchestrator,
    request: CanonicalRequest,
    preset: Option<String>,
    timeout: Option<Duration>,
    no_cache: bool,
    stats: Option<Arc<UsageStats>>,
}

impl RequestBuilder {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            request: CanonicalRequest::default(),
            preset: None,
            timeout: None,
            no_cache: false,
            stats: None,
        }
    }

    fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    // ── setters ──

    pub fn prompt(&self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.with(|b| b.request.prompt = prompt)
    }

    pub fn system_prompt(&self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.with(|b| b.request.system_prompt = Some(system_prompt))
    }

    pub fn model(&self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.with(|b| b.request.model = Some(model))
    }

    pub fn provider(&self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        self.with(|b| b.request.provider = Some(provider))
    }

    pub fn preset(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with(|b| b.preset = Some(name))
    }

    /// Merge `options` over the current ones, key by key.
    pub fn options(&self, options: Options) -> Self {
        self.with(|b| b.request.options.extend(options))
    }

    /// Set one option. `Value::Null` unsets a preset or default value.
    pub fn option(&self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        self.with(|b| {
            b.request.options.insert(key, value);
        })
    }

    /// Merge `vars` over the current ones.
    pub fn vars(&self, vars: Vars) -> Self {
        self.with(|b| b.request.vars.extend(vars))
    }

    pub fn var(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.with(|b| {
            b.request.vars.insert(name, value);
        })
    }

    pub fn stream(&self, stream: bool) -> Self {
        self.with(|b| b.request.stream = stream)
    }

    /// A non-finite value is kept as text so `resolve` rejects it.
    pub fn temperature(&self, temperature: f64) -> Self {
        let value = Number::from_f64(temperature)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(temperature.to_string()));
        self.option("temperature", value)
    }

    pub fn max_tokens(&self, max_tokens: u32) -> Self {
        self.option("max_tokens", json!(max_tokens))
    }

    /// Per-request network timeout, overriding `defaults.timeoutSecs`.
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.with(|b| b.timeout = Some(timeout))
    }

    /// Skip the cache lookup and the cache write for this request.
    pub fn no_cache(&self) -> Self {
        self.with(|b| b.no_cache = true)
    }

    /// Tally this request in `stats` instead of the orchestrator's collector.
    pub fn stats(&self, stats: Arc<UsageStats>) -> Self {
        self.with(|b| b.stats = Some(stats))
    }

    // ── accessors ──

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Explicit values set on this builder (before presets and defaults).
    pub fn fields(&self) -> &CanonicalRequest {
        &self.request
    }

    pub fn preset_name(&self) -> Option<&str> {
        self.preset.as_deref()
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cache_bypassed(&self) -> bool {
        self.no_cache
    }

    pub fn stats_override(&self) -> Option<&Arc<UsageStats>> {
        self.stats.as_ref()
    }

    // ── terminals ──

    pub fn resolve(&self) -> Result<ResolvedRequest> {
        self.orchestrator.resolve(self)
    }

    pub async fn request(&self) -> Result<CanonicalResponse> {
        let resolved = self.resolve()?;
        self.orchestrator.execute(resolved).await
    }

    /// Content only. A response carrying an `error` annotation becomes
    /// [`Error::InvalidResponse`].
    pub async fn ask(&self) -> Result<String> {
        let response = self.request().await?;
        match response.error {
            Some(message) => Err(Error::InvalidResponse {
                provider: response.provider.unwrap_or_default(),
                message,
            }),
            None => Ok(response.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeTransport};
    use std::collections::HashMap;

    #[test]
    fn test_setters_do_not_mutate_the_original() {
        let orch = testing::orchestrator(FakeTransport::openai_ok("x"));
        let base = orch.prompt("p").temperature(0.2);
        let short = base.max_tokens(10);
        let long = base.max_tokens(2000);

        assert!(base.fields().max_tokens().is_none());
        assert_eq!(short.fields().max_tokens(), Some(10));
        assert_eq!(long.fields().max_tokens(), Some(2000));
        assert_eq!(long.fields().temperature(), Some(0.2));
    }

    #[test]
    fn test_options_and_vars_merge() {
        let orch = testing::orchestrator(FakeTransport::openai_ok("x"));
        let mut opts = HashMap::new();
        opts.insert("top_p".to_string(), json!(0.9));
        opts.insert("temperature".to_string(), json!(1.0));
        let b = orch.prompt("p").temperature(0.3).option("seed", json!(7)).options(opts);
        assert_eq!(b.fields().options.len(), 3);
        assert_eq!(b.fields().temperature(), Some(1.0));

        let mut vars = HashMap::new();
        vars.insert("b".to_string(), "2".to_string());
        let b = b.var("a", "1").vars(vars);
        assert_eq!(b.fields().vars.len(), 2);
    }

    #[test]
    fn test_flags() {
        let orch = testing::orchestrator(FakeTransport::openai_ok("x"));
        let stats = Arc::new(UsageStats::new());
        let b = orch
            .prompt("p")
            .stream(true)
            .no_cache()
            .timeout(Duration::from_secs(3))
            .stats(stats.clone())
            .preset("p1")
            .system_prompt("s")
            .provider("grok")
            .model("grok-3");
        assert!(b.fields().stream);
        assert!(b.cache_bypassed());
        assert_eq!(b.timeout_override(), Some(Duration::from_secs(3)));
        assert!(Arc::ptr_eq(b.stats_override().unwrap(), &stats));
        assert_eq!(b.preset_name(), Some("p1"));
        assert_eq!(b.fields().provider.as_deref(), Some("grok"));
    }

    #[tokio::test]
    async fn test_ask_returns_content() {
        let orch = testing::orchestrator(FakeTransport::openai_ok("forty-two"));
        assert_eq!(orch.prompt("meaning?").ask().await.unwrap(), "forty-two");
    }

    #[tokio::test]
    async fn test_ask_surfaces_annotated_error() {
        let transport = FakeTransport::new(|_| {
            Ok(llmux_providers::TransportResponse::new(
                200,
                r#"{"choices": [{"message": {"content": null, "refusal": "no"}}]}"#,
            ))
        });
        let orch = testing::orchestrator(transport);
        let err = orch.prompt("x").ask().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { ref provider, .. } if provider == "openai"));
    }

    #[tokio::test]
    async fn test_builder_stats_override() {
        let orch = testing::orchestrator(FakeTransport::openai_ok("x"));
        let batch = Arc::new(UsageStats::new());
        orch.prompt("a").stats(batch.clone()).request().await.unwrap();
        assert_eq!(batch.snapshot().requests, 1);
        assert_eq!(orch.stats().snapshot().requests, 0);
    }
}
