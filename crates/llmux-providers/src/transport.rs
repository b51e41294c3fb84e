//! HTTP transport: the single place llmux touches the network.
//!
//! The [`Transport`] trait is the seam tests use to swap in scripted
//! responses; [`ReqwestTransport`] is the production client. Transports do
//! not interpret status codes. [`send_checked`] does that, mapping non-2xx
//! answers onto the provider error taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use llmux_core::{Error, Result};

use crate::adapter::{HttpMethod, PreparedRequest};

/// Raw answer from the vendor: status, body text, and the parsed
/// `retry-after` header when present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub retry_after_secs: Option<u64>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any status line arrived.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Convert a reqwest error, dropping the URL: it may carry a `key=` credential.
    fn from_reqwest(e: reqwest::Error) -> Self {
        let timed_out = e.is_timeout();
        let e = e.without_url();
        let message = match std::error::Error::source(&e) {
            Some(source) => format!("{e}: {source}"),
            None => e.to_string(),
        };
        Self { message, timed_out }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one prepared request, bounded by `timeout`.
    async fn send(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

// ─────────────────────────────────────────────
// ReqwestTransport
// ─────────────────────────────────────────────

/// Production transport over a shared, connection-pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn header_map(request: &PreparedRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (key, value) in &request.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(val)) => {
                    headers.append(name, val);
                }
                _ => warn!(header = %key, "skipping invalid header"),
            }
        }
        headers
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let mut builder = builder
            .headers(Self::header_map(request))
            .timeout(timeout);
        if let Some(ref payload) = request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(|e| {
            let mut err = TransportError::from_reqwest(e);
            err.message = format!("failed to read response body: {}", err.message);
            err
        })?;

        Ok(TransportResponse {
            status,
            body,
            retry_after_secs,
        })
    }
}

// ─────────────────────────────────────────────
// Status mapping
// ─────────────────────────────────────────────

/// A 2xx body: parsed JSON, or the raw text when it is not JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Malformed { raw: String, reason: String },
}

/// Send `request` and map the outcome onto llmux errors.
///
/// Transport failures become [`Error::Transport`], non-2xx answers become
/// [`Error::Provider`] or [`Error::RateLimited`]. A 2xx body that is not
/// JSON is returned as [`Payload::Malformed`] so the caller can degrade.
pub async fn send_checked(
    transport: &dyn Transport,
    provider: &str,
    request: &PreparedRequest,
    timeout: Duration,
) -> Result<Payload> {
    debug!(provider, url = %request_url_for_log(request), "sending vendor request");

    let response = transport
        .send(request, timeout)
        .await
        .map_err(|e| {
            warn!(provider, timed_out = e.timed_out, error = %e, "transport failure");
            Error::Transport {
                provider: provider.to_string(),
                message: if e.timed_out {
                    format!("timed out after {}s: {}", timeout.as_secs(), e.message)
                } else {
                    e.message
                },
            }
        })?;

    if !response.is_success() {
        warn!(provider, status = response.status, "vendor returned error status");
        return Err(Error::from_status(
            provider,
            response.status,
            response.body,
            response.retry_after_secs,
        ));
    }

    Ok(match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => Payload::Json(value),
        Err(e) => {
            warn!(provider, error = %e, "vendor returned non-JSON body");
            Payload::Malformed {
                raw: response.body,
                reason: e.to_string(),
            }
        }
    })
}

/// URL with any `key=` query value masked.
fn request_url_for_log(request: &PreparedRequest) -> String {
    match request.url.split_once("key=") {
        Some((head, _)) => format!("{head}key=<redacted>"),
        None => request.url.clone(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_reqwest_post_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer k"))
            .and(body_partial_json(json!({"model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post(
            format!("{}/chat/completions", server.uri()),
            json!({"model": "gpt-4o"}),
        )
        .with_header("Authorization", "Bearer k");

        let payload = send_checked(&transport, "openai", &req, TIMEOUT).await.unwrap();
        assert_eq!(payload, Payload::Json(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_reqwest_get_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("key", "g"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::get(format!("{}/models?key=g", server.uri()));
        let resp = transport.send(&req, TIMEOUT).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_non_2xx_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post(server.uri(), json!({}));
        let err = send_checked(&transport, "claude", &req, TIMEOUT).await.unwrap_err();
        match err {
            Error::Provider { provider, status, body } => {
                assert_eq!(provider, "claude");
                assert_eq!(status, 401);
                assert_eq!(body, "invalid key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "17")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post(server.uri(), json!({}));
        let err = send_checked(&transport, "grok", &req, TIMEOUT).await.unwrap_err();
        assert!(err.is_rate_limited());
        match err {
            Error::RateLimited { retry_after_secs, .. } => assert_eq!(retry_after_secs, Some(17)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post(server.uri(), json!({}));
        let payload = send_checked(&transport, "openai", &req, TIMEOUT).await.unwrap();
        assert!(matches!(payload, Payload::Malformed { ref raw, .. } if raw.contains("gateway")));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post(server.uri(), json!({}));
        let err = send_checked(&transport, "gemini", &req, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = ReqwestTransport::new().unwrap();
        let req = PreparedRequest::post("http://127.0.0.1:9/unreachable", json!({}));
        let err = send_checked(&transport, "openai", &req, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_connection_failure_does_not_leak_query_key() {
        let config = llmux_core::config::ProviderConfig {
            api_key: "SUPERSECRETKEY".into(),
            api_base: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        };
        let spec = crate::registry::find_by_name("gemini").unwrap();
        let req = spec.prepare_request(&llmux_core::types::CanonicalRequest::new("hi"), &config);
        assert!(req.url.contains("SUPERSECRETKEY"));

        let transport = ReqwestTransport::new().unwrap();
        let err = send_checked(&transport, "gemini", &req, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert!(!err.to_string().contains("SUPERSECRETKEY"), "{err}");
        assert!(!format!("{err:?}").contains("SUPERSECRETKEY"));
    }

    #[test]
    fn test_log_url_masks_key() {
        let req = PreparedRequest::get("https://g/v1beta/models?pageSize=10&key=secret");
        assert_eq!(request_url_for_log(&req), "https://g/v1beta/models?pageSize=10&key=<redacted>");
    }
}
