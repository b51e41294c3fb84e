//! Error taxonomy shared by every llmux crate.
//!
//! Three families matter to callers:
//!
//! - **Configuration** errors fail fast, before any network attempt, and are
//!   never worth retrying.
//! - **Provider** errors (`Provider`, `RateLimited`, `Transport`) carry the
//!   vendor status/body verbatim. Nothing in llmux retries them; backoff is
//!   the caller's call.
//! - **Store** errors come from cache or file collaborators. The request path
//!   downgrades them to warnings; only the CRUD surfaces return them.
//!
//! Malformed vendor payloads are *not* errors: adapters annotate the
//! response's `error` field instead. Only `ask()`, which has nowhere to put
//! the annotation, turns it into `InvalidResponse`.

use thiserror::Error;

/// Result alias used across llmux.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown provider, missing credential, invalid preset or option value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The vendor answered with a non-2xx status.
    #[error("provider {provider} returned HTTP {status}: {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    /// The vendor is throttling us (HTTP 429).
    #[error("rate limited by {provider}: {body}")]
    RateLimited {
        provider: String,
        body: String,
        /// Seconds from the `retry-after` header, when the vendor sent one.
        retry_after_secs: Option<u64>,
    },

    /// Connection failure or timeout before a status line arrived.
    #[error("transport error calling {provider}: {message}")]
    Transport { provider: String, message: String },

    /// A 2xx answer whose content could not be used (returned only by
    /// callers that need text, such as `ask`).
    #[error("unusable response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Cache or file store I/O failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Build the provider-side error for a non-2xx answer.
    ///
    /// 429 maps to [`Error::RateLimited`]; everything else to [`Error::Provider`].
    pub fn from_status(
        provider: &str,
        status: u16,
        body: impl Into<String>,
        retry_after_secs: Option<u64>,
    ) -> Self {
        if status == 429 {
            Error::RateLimited {
                provider: provider.to_string(),
                body: body.into(),
                retry_after_secs,
            }
        } else {
            Error::Provider {
                provider: provider.to_string(),
                status,
                body: body.into(),
            }
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// True for every vendor-side failure, rate limits included.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Error::Provider { .. }
                | Error::RateLimited { .. }
                | Error::Transport { .. }
                | Error::InvalidResponse { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// HTTP status attached to the error, if the vendor produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Provider { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_rate_limited() {
        let err = Error::from_status("openai", 429, "slow down", Some(12));
        assert!(err.is_rate_limited());
        assert!(err.is_provider_error());
        assert_eq!(err.status(), Some(429));
        match err {
            Error::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(12)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_server_error() {
        let err = Error::from_status("claude", 503, "overloaded", None);
        assert!(!err.is_rate_limited());
        assert!(err.is_provider_error());
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_config_is_not_provider_error() {
        let err = Error::config("unknown provider 'foo'");
        assert!(err.is_config());
        assert!(!err.is_provider_error());
        assert_eq!(err.status(), None);
    }
}
