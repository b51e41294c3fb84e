//! Substring heuristics for model metadata vendors leave out.
//!
//! Listing endpoints rarely report token limits or capabilities (Gemini is
//! the exception). These tables fill the gaps from the model id. Order
//! matters: the first matching pattern wins, so specific ids come before
//! family prefixes.

use llmux_core::types::ModelInfo;

/// `(pattern, context window)`.
static CONTEXT_WINDOWS: &[(&str, u64)] = &[
    ("gpt-4.1", 1_047_576),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5", 16_385),
    ("o1-mini", 128_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4", 200_000),
    ("claude", 200_000),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini", 1_048_576),
    ("grok-4", 256_000),
    ("grok-2-vision", 32_768),
    ("grok", 131_072),
];

/// `(pattern, max output tokens)`.
static MAX_TOKENS: &[(&str, u64)] = &[
    ("gpt-4.1", 32_768),
    ("gpt-4o", 16_384),
    ("gpt-4-turbo", 4_096),
    ("gpt-4", 8_192),
    ("gpt-3.5", 4_096),
    ("o1-mini", 65_536),
    ("o1", 100_000),
    ("o3", 100_000),
    ("o4", 100_000),
    ("claude-opus-4", 32_000),
    ("claude-sonnet-4", 64_000),
    ("claude-3-7", 64_000),
    ("claude-3-5", 8_192),
    ("claude", 4_096),
    ("gemini-2.5", 65_536),
    ("gemini", 8_192),
    ("grok", 131_072),
];

/// `(pattern, feature)`; every matching row contributes.
static FEATURES: &[(&str, &str)] = &[
    ("gpt-4o", "vision"),
    ("gpt-4.1", "vision"),
    ("gpt-4-turbo", "vision"),
    ("claude-3", "vision"),
    ("claude-sonnet-4", "vision"),
    ("claude-opus-4", "vision"),
    ("gemini", "vision"),
    ("grok-2-vision", "vision"),
    ("grok-4", "vision"),
    ("o1", "reasoning"),
    ("o3", "reasoning"),
    ("o4", "reasoning"),
    ("claude-3-7", "reasoning"),
    ("claude-sonnet-4", "reasoning"),
    ("claude-opus-4", "reasoning"),
    ("gemini-2.5", "reasoning"),
    ("grok-3-mini", "reasoning"),
    ("grok-4", "reasoning"),
    ("gpt", "tools"),
    ("claude", "tools"),
    ("gemini", "tools"),
    ("grok", "tools"),
];

fn first_match(table: &[(&str, u64)], id: &str) -> Option<u64> {
    let lower = id.to_lowercase();
    table
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, value)| *value)
}

pub fn infer_context_window(id: &str) -> Option<u64> {
    first_match(CONTEXT_WINDOWS, id)
}

pub fn infer_max_tokens(id: &str) -> Option<u64> {
    first_match(MAX_TOKENS, id)
}

pub fn infer_features(id: &str) -> Vec<&'static str> {
    let lower = id.to_lowercase();
    if infer_model_type(&lower) != "chat" {
        return Vec::new();
    }
    let mut features: Vec<&'static str> = FEATURES
        .iter()
        .filter(|(pattern, _)| lower.contains(pattern))
        .map(|(_, feature)| *feature)
        .collect();
    features.sort_unstable();
    features.dedup();
    features
}

/// Coarse model type from the id: `embedding`, `image`, `audio`, `moderation`, or `chat`.
pub fn infer_model_type(id: &str) -> &'static str {
    let lower = id.to_lowercase();
    if lower.contains("embed") {
        "embedding"
    } else if lower.contains("dall-e") || lower.contains("imagen") || lower.contains("image") {
        "image"
    } else if lower.contains("whisper")
        || lower.contains("tts")
        || lower.contains("audio")
        || lower.contains("transcribe")
    {
        "audio"
    } else if lower.contains("moderation") {
        "moderation"
    } else {
        "chat"
    }
}

/// Fill fields the vendor did not report. Reported values are never overwritten.
pub fn enrich(model: &mut ModelInfo) {
    if model.model_type.is_empty() {
        model.model_type = infer_model_type(&model.id).to_string();
    }
    if model.model_type != "chat" {
        return;
    }
    if model.context_window.is_none() {
        model.context_window = infer_context_window(&model.id);
    }
    if model.max_tokens.is_none() {
        model.max_tokens = infer_max_tokens(&model.id);
    }
    if model.features.is_empty() {
        model.features = infer_features(&model.id)
            .into_iter()
            .map(String::from)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_patterns_win() {
        assert_eq!(infer_context_window("gpt-4.1-mini"), Some(1_047_576));
        assert_eq!(infer_context_window("gpt-4o-mini"), Some(128_000));
        assert_eq!(infer_context_window("gpt-4-0613"), Some(8_192));
        assert_eq!(infer_context_window("gemini-1.5-pro-002"), Some(2_097_152));
        assert_eq!(infer_context_window("gemini-2.0-flash"), Some(1_048_576));
    }

    #[test]
    fn test_unknown_model_has_no_guess() {
        assert_eq!(infer_context_window("mystery-model"), None);
        assert_eq!(infer_max_tokens("mystery-model"), None);
        assert!(infer_features("mystery-model").is_empty());
    }

    #[test]
    fn test_features() {
        assert_eq!(infer_features("claude-sonnet-4-20250514"), vec!["reasoning", "tools", "vision"]);
        assert_eq!(infer_features("grok-3-mini"), vec!["reasoning", "tools"]);
        assert!(infer_features("text-embedding-3-large").is_empty());
    }

    #[test]
    fn test_model_types() {
        assert_eq!(infer_model_type("text-embedding-3-small"), "embedding");
        assert_eq!(infer_model_type("dall-e-3"), "image");
        assert_eq!(infer_model_type("whisper-1"), "audio");
        assert_eq!(infer_model_type("omni-moderation-latest"), "moderation");
        assert_eq!(infer_model_type("gpt-4o"), "chat");
    }

    #[test]
    fn test_enrich_keeps_reported_values() {
        let mut model = ModelInfo::new("gemini", "gemini-1.5-pro");
        model.context_window = Some(1_000);
        enrich(&mut model);
        assert_eq!(model.context_window, Some(1_000));
        assert_eq!(model.max_tokens, Some(8_192));
        assert!(model.has_feature("vision"));
    }

    #[test]
    fn test_enrich_skips_non_chat_models() {
        let mut model = ModelInfo::new("openai", "text-embedding-3-small");
        model.model_type = infer_model_type(&model.id).to_string();
        enrich(&mut model);
        assert!(model.context_window.is_none());
        assert!(model.features.is_empty());
    }
}
