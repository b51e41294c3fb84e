//! Shared adapter plumbing: the prepared HTTP request and helpers used by
//! every vendor module.
//!
//! An adapter is a pair of pure functions, `prepare` and `parse`. Neither
//! does I/O; the orchestrator owns the network call in between. Adapters do
//! not place credentials: the registry applies each vendor's [`AuthScheme`].

use reqwest::Url;
use serde_json::{Map, Value};
use tracing::warn;

use llmux_core::config::ProviderConfig;
use llmux_core::types::CanonicalResponse;

/// HTTP method for a prepared request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Where the credential travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// A named header carrying the raw key (`x-api-key`).
    Header(&'static str),
    /// A query parameter (`?key=`).
    Query(&'static str),
}

/// A vendor request ready for the transport: URL, headers, JSON payload.
#[derive(Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Header pairs in insertion order.
    pub headers: Vec<(String, String)>,
    /// JSON body. `None` for GET requests.
    pub payload: Option<Value>,
}

/// Header names whose values must never reach logs.
const SECRET_HEADERS: &[&str] = &["authorization", "x-api-key", "x-goog-api-key"];

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if SECRET_HEADERS.contains(&k.to_ascii_lowercase().as_str()) {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        let url = match self.url.split_once("key=") {
            Some((head, _)) => format!("{head}key=<redacted>"),
            None => self.url.clone(),
        };
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &url)
            .field("headers", &headers)
            .field("payload", &self.payload)
            .finish()
    }
}

impl PreparedRequest {
    pub fn post(url: impl Into<String>, payload: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            payload: Some(payload),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            payload: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach `key` the way `scheme` says.
    pub fn with_auth(self, scheme: AuthScheme, key: &str) -> Self {
        match scheme {
            AuthScheme::Bearer => self.with_header("Authorization", format!("Bearer {key}")),
            AuthScheme::Header(name) => self.with_header(name, key),
            AuthScheme::Query(name) => self.with_query(name, key),
        }
    }

    /// Append a percent-encoded query pair.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair(name, value);
                self.url = url.into();
            }
            Err(e) => warn!(error = %e, "cannot add query parameter to unparseable URL"),
        }
        self
    }

    /// Append the provider's configured extra headers.
    pub fn with_extra_headers(mut self, config: &ProviderConfig) -> Self {
        if let Some(ref extra) = config.extra_headers {
            let mut pairs: Vec<(&String, &String)> = extra.iter().collect();
            pairs.sort();
            for (name, value) in pairs {
                self.headers.push((name.clone(), value.clone()));
            }
        }
        self
    }

    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Resolve the API base: config override first, then the vendor default.
pub fn api_base<'a>(config: &'a ProviderConfig, default_base: &'a str) -> &'a str {
    config
        .api_base
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(default_base)
        .trim_end_matches('/')
}

/// Join `segments` onto `base`, percent-encoding each one.
///
/// Falls back to plain concatenation when `base` is not an absolute URL.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> String {
    let joined = || format!("{base}/{}", segments.join("/"));
    let Ok(mut url) = Url::parse(base) else {
        return joined();
    };
    match url.path_segments_mut() {
        Ok(mut path) => {
            path.pop_if_empty().extend(segments);
        }
        Err(()) => return joined(),
    }
    url.into()
}

/// Read an unsigned counter at a JSON pointer, defaulting to 0.
pub(crate) fn count_at(raw: &Value, pointer: &str) -> u64 {
    raw.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}

/// Normalize a `stop` option (string or array) into a list of strings.
pub(crate) fn stop_sequences(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::Array(vec![Value::String(s.clone())])),
        Value::Array(items) => Some(Value::Array(
            items.iter().filter(|v| v.is_string()).cloned().collect(),
        )),
        _ => None,
    }
}

/// Pull the vendor's error message out of an `{"error": ...}` envelope.
pub(crate) fn vendor_error(raw: &Value) -> Option<String> {
    let error = raw.get("error")?;
    if error.is_null() {
        return None;
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| error.as_str().map(String::from))
        .unwrap_or_else(|| error.to_string());
    Some(format!("vendor error: {message}"))
}

/// Start a response for `provider`/`model` with the raw payload attached.
pub(crate) fn base_response(
    provider: &str,
    raw: &Value,
    model: &str,
    elapsed_ms: u64,
) -> CanonicalResponse {
    CanonicalResponse {
        meta: raw.clone(),
        response_time_ms: elapsed_ms,
        provider: Some(provider.to_string()),
        model: Some(model.to_string()),
        ..Default::default()
    }
}

/// Sorted view of a request's options, so payloads are deterministic.
pub(crate) fn sorted_options(
    options: &std::collections::HashMap<String, Value>,
) -> Vec<(&String, &Value)> {
    let mut pairs: Vec<(&String, &Value)> = options.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
}

/// Insert `value` under `key` unless it is null.
pub(crate) fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(v) = value.filter(|v| !v.is_null()) {
        map.insert(key.to_string(), v);
    }
}
