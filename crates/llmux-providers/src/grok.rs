//! xAI Grok adapter.
//!
//! The API is OpenAI-compatible (`/chat/completions`, bearer auth), but the
//! reasoning models reject the penalty and stop parameters, so those are
//! stripped for them before the payload leaves.

use serde_json::Value;
use tracing::debug;

use llmux_core::config::ProviderConfig;
use llmux_core::types::{CanonicalRequest, CanonicalResponse, ModelInfo};

use crate::adapter::{api_base, AuthScheme, PreparedRequest};
use crate::openai;

pub const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-3-mini";
pub const AUTH: AuthScheme = AuthScheme::Bearer;

/// Model substrings identifying reasoning models.
const REASONING_MODELS: &[&str] = &["grok-3-mini", "grok-4"];
/// Options reasoning models refuse.
const REASONING_UNSUPPORTED: &[&str] = &["presence_penalty", "frequency_penalty", "stop"];

fn is_reasoning_model(model: &str) -> bool {
    let lower = model.to_lowercase();
    REASONING_MODELS.iter().any(|m| lower.contains(m))
}

pub fn prepare(request: &CanonicalRequest, config: &ProviderConfig) -> PreparedRequest {
    let url = format!("{}/chat/completions", api_base(config, DEFAULT_API_BASE));
    let mut payload = openai::chat_payload(request, DEFAULT_MODEL);

    let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if is_reasoning_model(model) {
        if let Value::Object(ref mut body) = payload {
            for key in REASONING_UNSUPPORTED {
                if body.remove(*key).is_some() {
                    debug!(option = key, model, "option not supported by grok reasoning model, dropped");
                }
            }
        }
    }

    PreparedRequest::post(url, payload).with_extra_headers(config)
}

pub fn parse(raw: &Value, model: &str, elapsed_ms: u64) -> CanonicalResponse {
    openai::parse_chat_completion("grok", raw, model, elapsed_ms)
}

pub fn list_models(config: &ProviderConfig) -> PreparedRequest {
    PreparedRequest::get(format!("{}/models", api_base(config, DEFAULT_API_BASE)))
        .with_extra_headers(config)
}

pub fn parse_models(raw: &Value) -> Vec<ModelInfo> {
    openai::parse_model_data("grok", raw)
}
