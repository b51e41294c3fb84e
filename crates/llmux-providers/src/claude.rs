//! Anthropic Messages API adapter.
//!
//! Differences from the OpenAI shape:
//! - auth goes in `x-api-key` ([`AUTH`]), plus a mandatory `anthropic-version` header
//! - the system prompt is a top-level `system` field, not a message
//! - `max_tokens` is required
//! - `usage.input_tokens` excludes prompt-cache reads; we add them back so
//!   `input_tokens` always counts the whole prompt

use serde_json::{json, Map, Value};
use tracing::debug;

use llmux_core::config::ProviderConfig;
use llmux_core::types::{CanonicalRequest, CanonicalResponse, ModelInfo, Usage};

use crate::adapter::{
    api_base, base_response, count_at, insert_some, sorted_options, stop_sequences, vendor_error,
    AuthScheme, PreparedRequest,
};
use crate::heuristics;

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const AUTH: AuthScheme = AuthScheme::Header("x-api-key");
/// Used when neither the request nor its preset sets `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

fn version_headers(request: PreparedRequest, config: &ProviderConfig) -> PreparedRequest {
    let version = config
        .api_version
        .as_deref()
        .unwrap_or(DEFAULT_API_VERSION);
    request
        .with_header("anthropic-version", version)
        .with_extra_headers(config)
}

pub fn prepare(request: &CanonicalRequest, config: &ProviderConfig) -> PreparedRequest {
    let url = format!("{}/messages", api_base(config, DEFAULT_API_BASE));
    let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "max_tokens".to_string(),
        json!(request.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body.insert("system".to_string(), Value::String(system.to_string()));
    }
    body.insert(
        "messages".to_string(),
        json!([{"role": "user", "content": request.prompt}]),
    );

    for (key, value) in sorted_options(&request.options) {
        match key.as_str() {
            "max_tokens" => {}
            "temperature" | "top_p" | "top_k" | "metadata" | "thinking" => {
                insert_some(&mut body, key, Some(value.clone()))
            }
            "stop" | "stop_sequences" => insert_some(&mut body, "stop_sequences", stop_sequences(value)),
            _ => debug!(option = %key, "option not supported by claude, dropped"),
        }
    }

    version_headers(PreparedRequest::post(url, Value::Object(body)), config)
}

pub fn parse(raw: &Value, model: &str, elapsed_ms: u64) -> CanonicalResponse {
    let mut response = base_response("claude", raw, model, elapsed_ms);

    if let Some(err) = vendor_error(raw) {
        response.error = Some(err);
        return response;
    }

    let text: Vec<&str> = raw
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        response.error = Some("response has no text content blocks".to_string());
    } else {
        response.content = text.concat();
    }

    let cache_read = count_at(raw, "/usage/cache_read_input_tokens");
    let cache_write = count_at(raw, "/usage/cache_creation_input_tokens");
    let input = count_at(raw, "/usage/input_tokens") + cache_read + cache_write;
    response.usage = Usage::new(input, count_at(raw, "/usage/output_tokens"), cache_read);
    response
}

// ─────────────────────────────────────────────
// Model listing
// ─────────────────────────────────────────────

pub fn list_models(config: &ProviderConfig) -> PreparedRequest {
    version_headers(
        PreparedRequest::get(format!("{}/models?limit=1000", api_base(config, DEFAULT_API_BASE))),
        config,
    )
}

pub fn parse_models(raw: &Value) -> Vec<ModelInfo> {
    let Some(items) = raw.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Value::as_str)?;
            let mut model = ModelInfo::new("claude", id);
            if let Some(name) = item.get("display_name").and_then(Value::as_str) {
                model.name = name.to_string();
            }
            model.created_at = item
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));
            model.model_type = heuristics::infer_model_type(id).to_string();
            Some(model)
        })
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: "sk-ant-test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_headers() {
        let prepared = prepare(&CanonicalRequest::new("hi"), &config());
        assert_eq!(prepared.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(prepared.header("anthropic-version"), Some(DEFAULT_API_VERSION));
        assert!(prepared.header("x-api-key").is_none());
    }

    #[test]
    fn test_prepare_api_version_override() {
        let mut cfg = config();
        cfg.api_version = Some("2024-01-01".into());
        let prepared = prepare(&CanonicalRequest::new("hi"), &cfg);
        assert_eq!(prepared.header("anthropic-version"), Some("2024-01-01"));
    }

    #[test]
    fn test_prepare_system_is_top_level() {
        let mut req = CanonicalRequest::new("Summarize this.");
        req.system_prompt = Some("You are terse.".into());
        let body = prepare(&req, &config()).payload.unwrap();
        assert_eq!(body["system"], "You are terse.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_prepare_maps_options() {
        let mut req = CanonicalRequest::new("x");
        req.options.insert("max_tokens".into(), json!(100));
        req.options.insert("temperature".into(), json!(0.5));
        req.options.insert("stop".into(), json!("###"));
        req.options.insert("frequency_penalty".into(), json!(1.0));
        let body = prepare(&req, &config()).payload.unwrap();
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["stop_sequences"], json!(["###"]));
        assert!(body.get("frequency_penalty").is_none());
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_parse_text_blocks() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Hello, "},
                {"type": "text", "text": "world."}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4, "cache_read_input_tokens": 90}
        });
        let resp = parse(&raw, "claude-sonnet-4-20250514", 300);
        assert_eq!(resp.content, "Hello, world.");
        assert_eq!(resp.usage.input_tokens, 100);
        assert_eq!(resp.usage.cached_tokens, 90);
        assert_eq!(resp.usage.output_tokens, 4);
        assert_eq!(resp.provider.as_deref(), Some("claude"));
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_parse_no_text_degrades() {
        let raw = json!({"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}});
        let resp = parse(&raw, "claude-3-haiku", 1);
        assert!(resp.content.is_empty());
        assert!(resp.error.is_some());
    }

    #[test]
    fn test_parse_error_envelope() {
        let raw = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        let resp = parse(&raw, "claude-3-haiku", 1);
        assert_eq!(resp.error.as_deref(), Some("vendor error: Overloaded"));
    }

    #[test]
    fn test_parse_models_listing() {
        let raw = json!({"data": [
            {"type": "model", "id": "claude-sonnet-4-20250514", "display_name": "Claude Sonnet 4", "created_at": "2025-05-22T00:00:00Z"}
        ], "has_more": false});
        let models = parse_models(&raw);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "Claude Sonnet 4");
        assert_eq!(models[0].provider, "claude");
        assert!(models[0].created_at.is_some());
    }
}
