//! Scripted transport and fixtures shared by the engine tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use llmux_core::config::Config;
use llmux_core::store::{FileStore, MemoryFileStore};
use llmux_providers::{PreparedRequest, Transport, TransportError, TransportResponse};

use crate::models::ModelRepository;
use crate::orchestrator::Orchestrator;
use crate::presets::PresetStore;

type Handler =
    Box<dyn Fn(&PreparedRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

pub(crate) struct FakeTransport {
    handler: Handler,
    calls: AtomicUsize,
    seen: Mutex<Vec<PreparedRequest>>,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&PreparedRequest) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with a successful completion in the vendor's shape.
    pub(crate) fn openai_ok(content: &str) -> Arc<Self> {
        let content = content.to_string();
        Self::new(move |req| Ok(TransportResponse::new(200, success_body(req, &content))))
    }

    pub(crate) fn status(status: u16, body: &str) -> Arc<Self> {
        let body = body.to_string();
        Self::new(move |_| Ok(TransportResponse::new(status, body.clone())))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<PreparedRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        (self.handler)(request)
    }
}

/// Vendor-shaped success body: 1000 input tokens, 500 output tokens.
pub(crate) fn success_body(req: &PreparedRequest, content: &str) -> String {
    let body = if req.url.contains("/messages") {
        json!({
            "content": [{"type": "text", "text": content}],
            "usage": {"input_tokens": 1000, "output_tokens": 500}
        })
    } else if req.url.contains(":generateContent") {
        json!({
            "candidates": [{"content": {"parts": [{"text": content}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1000, "candidatesTokenCount": 500}
        })
    } else {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 1000, "completion_tokens": 500}
        })
    };
    body.to_string()
}

/// Last user message of a prepared chat request.
pub(crate) fn prompt_of(req: &PreparedRequest) -> String {
    req.payload
        .as_ref()
        .and_then(|p| {
            p.get("messages")
                .and_then(|m| m.as_array())
                .and_then(|m| m.last())
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .map(String::from)
        })
        .unwrap_or_default()
}

/// openai, claude and grok configured; gemini left without a key.
pub(crate) fn config() -> Config {
    let mut config = Config::default();
    config.providers.openai.api_key = "sk-openai".into();
    config.providers.claude.api_key = "sk-ant".into();
    config.providers.grok.api_key = "xai".into();
    config
}

const MODELS: &str = r#"
providers:
  openai:
    - id: gpt-4o-mini
      pricing: { input: 0.15, output: 0.60, cachedInput: 0.075 }
  claude:
    - id: claude-3-5-haiku-20241022
      pricing: { input: 0.80, output: 4.00 }
  grok:
    - id: grok-3-mini
      pricing: { input: 0.30, output: 0.50 }
"#;

/// In-memory orchestrator with priced models and a preset store.
pub(crate) fn orchestrator(transport: Arc<FakeTransport>) -> Orchestrator {
    let files = Arc::new(MemoryFileStore::new());
    files
        .write(Path::new("/llmux/models.yaml"), MODELS)
        .expect("seed models");
    let models = ModelRepository::new(files.clone(), "/llmux/models.yaml", Duration::from_secs(300));
    Orchestrator::new(&config(), transport)
        .with_models(Arc::new(models))
        .with_presets(PresetStore::new(files, "/llmux/presets"))
}
