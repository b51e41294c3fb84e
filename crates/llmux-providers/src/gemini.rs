//! Google Gemini `generateContent` adapter.
//!
//! The model lives in the URL path, the key in the `key` query parameter, and
//! sampling options under `generationConfig` with camelCase names. Thinking
//! tokens are billed as output, so they are folded into `output_tokens`.

use serde_json::{json, Map, Value};
use tracing::debug;

use llmux_core::config::ProviderConfig;
use llmux_core::types::{CanonicalRequest, CanonicalResponse, ModelInfo, Usage};

use crate::adapter::{
    api_base, base_response, count_at, endpoint, insert_some, sorted_options, stop_sequences,
    vendor_error, AuthScheme, PreparedRequest,
};
use crate::heuristics;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const AUTH: AuthScheme = AuthScheme::Query("key");

/// Gemini model names may arrive as `models/<id>`.
fn bare_model_id(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

pub fn prepare(request: &CanonicalRequest, config: &ProviderConfig) -> PreparedRequest {
    let model = bare_model_id(request.model.as_deref().unwrap_or(DEFAULT_MODEL));
    let url = endpoint(
        api_base(config, DEFAULT_API_BASE),
        &["models", &format!("{model}:generateContent")],
    );

    let mut body = Map::new();
    body.insert(
        "contents".to_string(),
        json!([{"role": "user", "parts": [{"text": request.prompt}]}]),
    );
    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        body.insert(
            "systemInstruction".to_string(),
            json!({"parts": [{"text": system}]}),
        );
    }

    let mut generation = Map::new();
    for (key, value) in sorted_options(&request.options) {
        match key.as_str() {
            "temperature" | "candidateCount" | "responseMimeType" => {
                insert_some(&mut generation, key, Some(value.clone()))
            }
            "max_tokens" | "maxOutputTokens" => {
                insert_some(&mut generation, "maxOutputTokens", Some(value.clone()))
            }
            "top_p" | "topP" => insert_some(&mut generation, "topP", Some(value.clone())),
            "top_k" | "topK" => insert_some(&mut generation, "topK", Some(value.clone())),
            "stop" | "stopSequences" => {
                insert_some(&mut generation, "stopSequences", stop_sequences(value))
            }
            _ => debug!(option = %key, "option not supported by gemini, dropped"),
        }
    }
    if !generation.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(generation));
    }

    PreparedRequest::post(url, Value::Object(body)).with_extra_headers(config)
}

pub fn parse(raw: &Value, model: &str, elapsed_ms: u64) -> CanonicalResponse {
    let mut response = base_response("gemini", raw, model, elapsed_ms);

    if let Some(err) = vendor_error(raw) {
        response.error = Some(err);
        return response;
    }

    let parts = raw
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    let text: Vec<&str> = parts
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("thought").and_then(Value::as_bool) != Some(true))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let block_reason = raw
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str);
        let finish_reason = raw
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str);
        response.error = Some(match (block_reason, finish_reason) {
            (Some(reason), _) => format!("prompt blocked: {reason}"),
            (None, Some(reason)) if reason != "STOP" => format!("no content, finish reason {reason}"),
            _ => "response has no candidate text".to_string(),
        });
    } else {
        response.content = text.concat();
    }

    let output = count_at(raw, "/usageMetadata/candidatesTokenCount")
        + count_at(raw, "/usageMetadata/thoughtsTokenCount");
    response.usage = Usage::new(
        count_at(raw, "/usageMetadata/promptTokenCount"),
        output,
        count_at(raw, "/usageMetadata/cachedContentTokenCount"),
    );
    response
}

// ─────────────────────────────────────────────
// Model listing
// ─────────────────────────────────────────────

pub fn list_models(config: &ProviderConfig) -> PreparedRequest {
    PreparedRequest::get(endpoint(api_base(config, DEFAULT_API_BASE), &["models"]))
        .with_query("pageSize", "1000")
        .with_extra_headers(config)
}

pub fn parse_models(raw: &Value) -> Vec<ModelInfo> {
    let Some(items) = raw.get("models").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = bare_model_id(item.get("name").and_then(Value::as_str)?);
            let mut model = ModelInfo::new("gemini", id);
            if let Some(name) = item.get("displayName").and_then(Value::as_str) {
                model.name = name.to_string();
            }
            model.base_model_id = item
                .get("baseModelId")
                .and_then(Value::as_str)
                .map(String::from);
            model.version = item.get("version").and_then(Value::as_str).map(String::from);
            model.context_window = item.get("inputTokenLimit").and_then(Value::as_u64);
            model.max_tokens = item.get("outputTokenLimit").and_then(Value::as_u64);
            model.supported_methods = item
                .get("supportedGenerationMethods")
                .and_then(Value::as_array)
                .map(|methods| {
                    methods
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            model.model_type = if model.supported_methods.iter().any(|m| m == "embedContent") {
                "embedding".to_string()
            } else {
                heuristics::infer_model_type(id).to_string()
            };
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
            api_key: "g-key".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_url_carries_model() {
        let mut req = CanonicalRequest::new("hi");
        req.model = Some("models/gemini-1.5-pro".into());
        let prepared = prepare(&req, &config());
        assert_eq!(
            prepared.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
        assert!(!prepared.url.contains("g-key"));
    }

    #[test]
    fn test_prepare_encodes_model_segment() {
        let mut req = CanonicalRequest::new("hi");
        req.model = Some("tuned/../x?y".into());
        let prepared = prepare(&req, &config());
        assert_eq!(
            prepared.url,
            "https://generativelanguage.googleapis.com/v1beta/models/tuned%2F..%2Fx%3Fy:generateContent"
        );
    }

    #[test]
    fn test_list_models_url() {
        let prepared = list_models(&config());
        assert_eq!(
            prepared.url,
            "https://generativelanguage.googleapis.com/v1beta/models?pageSize=1000"
        );
    }

    #[test]
    fn test_prepare_envelope() {
        let mut req = CanonicalRequest::new("Translate: hola");
        req.system_prompt = Some("You translate to English.".into());
        req.options.insert("max_tokens".into(), json!(50));
        req.options.insert("top_p".into(), json!(0.9));
        req.options.insert("stop".into(), json!(["\n\n"]));
        let body = prepare(&req, &config()).payload.unwrap();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "Translate: hola");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You translate to English."
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 50);
        assert_eq!(body["generationConfig"]["topP"], 0.9);
        assert_eq!(body["generationConfig"]["stopSequences"], json!(["\n\n"]));
    }

    #[test]
    fn test_prepare_without_options_omits_generation_config() {
        let body = prepare(&CanonicalRequest::new("hi"), &config()).payload.unwrap();
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_parse_success_skips_thoughts() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Hello!"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "thoughtsTokenCount": 7, "cachedContentTokenCount": 4}
        });
        let resp = parse(&raw, "gemini-2.5-flash", 80);
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.usage, Usage::new(12, 10, 4));
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}, "usageMetadata": {"promptTokenCount": 5}});
        let resp = parse(&raw, "gemini-2.0-flash", 10);
        assert!(resp.content.is_empty());
        assert_eq!(resp.error.as_deref(), Some("prompt blocked: SAFETY"));
        assert_eq!(resp.usage.input_tokens, 5);
    }

    #[test]
    fn test_parse_finish_reason_without_text() {
        let raw = json!({"candidates": [{"finishReason": "MAX_TOKENS", "content": {"parts": []}}]});
        let resp = parse(&raw, "gemini-2.0-flash", 10);
        assert_eq!(resp.error.as_deref(), Some("no content, finish reason MAX_TOKENS"));
    }

    #[test]
    fn test_parse_models_listing() {
        let raw = json!({"models": [
            {
                "name": "models/gemini-1.5-pro-002",
                "baseModelId": "gemini-1.5-pro",
                "version": "002",
                "displayName": "Gemini 1.5 Pro 002",
                "inputTokenLimit": 2000000,
                "outputTokenLimit": 8192,
                "supportedGenerationMethods": ["generateContent", "countTokens"]
            },
            {
                "name": "models/text-embedding-004",
                "supportedGenerationMethods": ["embedContent"]
            }
        ]});
        let models = parse_models(&raw);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "gemini-1.5-pro-002");
        assert_eq!(models[0].base_model_id.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(models[0].context_window, Some(2_000_000));
        assert_eq!(models[0].max_tokens, Some(8192));
        assert_eq!(models[1].model_type, "embedding");
    }
}
