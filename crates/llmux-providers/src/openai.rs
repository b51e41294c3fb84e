//! OpenAI chat-completions adapter.
//!
//! Wire format: `POST {base}/chat/completions`, bearer auth, the system prompt
//! travels as the first entry of `messages`. Options pass through verbatim so
//! newer vendor parameters need no code change.

use serde_json::{json, Map, Value};
use tracing::debug;

use llmux_core::config::ProviderConfig;
use llmux_core::types::{CanonicalRequest, CanonicalResponse, ModelInfo, Usage};

use crate::adapter::{
    api_base, base_response, count_at, sorted_options, vendor_error, AuthScheme, PreparedRequest,
};
use crate::heuristics;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const AUTH: AuthScheme = AuthScheme::Bearer;

/// Keys the adapter owns; an option with one of these names is ignored.
const RESERVED_KEYS: &[&str] = &["model", "messages", "stream"];

pub fn prepare(request: &CanonicalRequest, config: &ProviderConfig) -> PreparedRequest {
    let url = format!("{}/chat/completions", api_base(config, DEFAULT_API_BASE));
    let payload = chat_payload(request, DEFAULT_MODEL);

    PreparedRequest::post(url, payload).with_extra_headers(config)
}

pub fn parse(raw: &Value, model: &str, elapsed_ms: u64) -> CanonicalResponse {
    parse_chat_completion("openai", raw, model, elapsed_ms)
}

/// Build an OpenAI-style `/chat/completions` body.
///
/// Shared with OpenAI-compatible vendors.
pub(crate) fn chat_payload(request: &CanonicalRequest, default_model: &str) -> Value {
    let model = request.model.as_deref().unwrap_or(default_model);

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("messages".to_string(), Value::Array(messages));

    for (key, value) in sorted_options(&request.options) {
        if RESERVED_KEYS.contains(&key.as_str()) {
            debug!(option = %key, "ignoring reserved option");
            continue;
        }
        if !value.is_null() {
            body.insert(key.clone(), value.clone());
        }
    }

    Value::Object(body)
}

/// Parse an OpenAI-style chat completion. Never fails; anomalies land in `error`.
pub(crate) fn parse_chat_completion(
    provider: &str,
    raw: &Value,
    model: &str,
    elapsed_ms: u64,
) -> CanonicalResponse {
    let mut response = base_response(provider, raw, model, elapsed_ms);

    if let Some(err) = vendor_error(raw) {
        response.error = Some(err);
        return response;
    }

    let message = raw.pointer("/choices/0/message");
    match message.and_then(|m| m.get("content")).and_then(Value::as_str) {
        Some(text) => response.content = text.to_string(),
        None => {
            let refusal = message
                .and_then(|m| m.get("refusal"))
                .and_then(Value::as_str);
            response.error = Some(match refusal {
                Some(reason) => format!("model refused: {reason}"),
                None => "response has no choices[0].message.content".to_string(),
            });
        }
    }

    response.usage = Usage::new(
        count_at(raw, "/usage/prompt_tokens"),
        count_at(raw, "/usage/completion_tokens"),
        count_at(raw, "/usage/prompt_tokens_details/cached_tokens"),
    );
    response
}

// ─────────────────────────────────────────────
// Model listing
// ─────────────────────────────────────────────

pub fn list_models(config: &ProviderConfig) -> PreparedRequest {
    PreparedRequest::get(format!("{}/models", api_base(config, DEFAULT_API_BASE)))
        .with_extra_headers(config)
}

pub fn parse_models(raw: &Value) -> Vec<ModelInfo> {
    parse_model_data("openai", raw)
}

/// Parse `{"data": [{"id", "created", ...}]}` listings.
pub(crate) fn parse_model_data(provider: &str, raw: &Value) -> Vec<ModelInfo> {
    let Some(items) = raw.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            let mut model = ModelInfo::new(provider, id);
            model.created_at = item
                .get("created")
                .and_then(Value::as_i64)
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));
            model.model_type = heuristics::infer_model_type(id).to_string();
            Some(model)
        })
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
