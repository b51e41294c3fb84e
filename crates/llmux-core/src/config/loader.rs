//! Config loader: reads `~/.llmux/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. `Config::default()`
//! 2. JSON file (default `~/.llmux/config.json`)
//! 3. Vendor key variables (`OPENAI_API_KEY`, …), only where no key is set
//! 4. `LLMUX_<SECTION>__<FIELD>` variables, which win over everything

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig};
use crate::store::write_atomic;
use crate::Result;

/// Vendor credential variables, consulted when the file has no key.
const VENDOR_KEYS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("claude", "ANTHROPIC_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
    ("grok", "XAI_API_KEY"),
];

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) plus env vars.
///
/// Never fails: a missing or unreadable file yields the defaults, with a
/// warning when the file exists but is broken.
pub fn load_config(path: Option<&Path>) -> Config {
    let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(read_config_file(&path).unwrap_or_default())
}

fn read_config_file(path: &Path) -> Option<Config> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file, using defaults");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file unreadable, using defaults");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(config) => {
            debug!(path = %path.display(), "config loaded");
            Some(config)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file is not valid JSON, using defaults");
            None
        }
    }
}

/// Write `config` as pretty camelCase JSON, replacing the file atomically.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(&path, &json)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name` into `target`, ignoring (with a warning) values that don't parse.
fn env_parse<T: FromStr>(name: &str, target: &mut T) {
    if let Some(raw) = env(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(var = name, value = %raw, "ignoring unparseable env override"),
        }
    }
}

fn env_string(name: &str, target: &mut String) {
    if let Some(value) = env(name) {
        *target = value;
    }
}

/// Apply environment overrides on top of a loaded config.
///
/// Format: `LLMUX_<SECTION>__<FIELD>` with a double underscore delimiter,
/// e.g. `LLMUX_DEFAULTS__PROVIDER`, `LLMUX_PROVIDERS__CLAUDE__API_KEY`,
/// `LLMUX_CACHE__TTL_SECS`, `LLMUX_STORAGE__MODELS_PATH`.
fn apply_env_overrides(mut config: Config) -> Config {
    let defaults = &mut config.defaults;
    env_string("LLMUX_DEFAULTS__PROVIDER", &mut defaults.provider);
    env_string("LLMUX_DEFAULTS__MODEL", &mut defaults.model);
    env_parse("LLMUX_DEFAULTS__TEMPERATURE", &mut defaults.temperature);
    env_parse("LLMUX_DEFAULTS__MAX_TOKENS", &mut defaults.max_tokens);
    env_parse("LLMUX_DEFAULTS__TIMEOUT_SECS", &mut defaults.timeout_secs);

    for (name, vendor_var) in VENDOR_KEYS {
        if let Some(provider) = config.providers.get_by_name_mut(name) {
            apply_provider_env(provider, name, vendor_var);
        }
    }

    if let Some(raw) = env("LLMUX_CACHE__ENABLED") {
        config.cache.enabled = matches!(raw.trim(), "1" | "true" | "yes" | "on");
    }
    env_parse("LLMUX_CACHE__TTL_SECS", &mut config.cache.ttl_secs);
    if let Some(dir) = env("LLMUX_CACHE__DIR") {
        config.cache.dir = Some(dir);
    }

    env_string("LLMUX_PRICING__CURRENCY", &mut config.pricing.currency);
    env_parse("LLMUX_PRICING__MULTIPLIER", &mut config.pricing.multiplier);

    env_string("LLMUX_STORAGE__MODELS_PATH", &mut config.storage.models_path);
    env_string("LLMUX_STORAGE__PRESETS_DIR", &mut config.storage.presets_dir);
    env_string("LLMUX_STORAGE__LOG_PATH", &mut config.storage.log_path);

    env_parse("LLMUX_MODELS__CACHE_TTL_SECS", &mut config.models.cache_ttl_secs);

    config
}

fn apply_provider_env(provider: &mut ProviderConfig, name: &str, vendor_var: &str) {
    if !provider.is_configured() {
        if let Some(key) = env(vendor_var) {
            debug!(provider = name, var = vendor_var, "using vendor key from environment");
            provider.api_key = key;
        }
    }
    let prefix = format!("LLMUX_PROVIDERS__{}", name.to_ascii_uppercase());
    env_string(&format!("{prefix}__API_KEY"), &mut provider.api_key);
    if let Some(base) = env(&format!("{prefix}__API_BASE")) {
        provider.api_base = Some(base);
    }
    if let Some(version) = env(&format!("{prefix}__API_VERSION")) {
        provider.api_version = Some(version);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
