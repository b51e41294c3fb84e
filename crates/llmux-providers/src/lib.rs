//! Vendor layer for llmux.
//!
//! # Architecture
//!
//! - [`adapter`]: the prepared HTTP request and shared parsing helpers
//! - [`openai`], [`claude`], [`gemini`], [`grok`]: pure `prepare`/`parse`
//!   function pairs, one module per vendor
//! - [`registry`]: static specs for the four vendors plus name/model lookup
//! - [`transport`]: the [`Transport`] seam and the `reqwest` default
//! - [`fetcher`]: live model listings, enriched by [`heuristics`]

pub mod adapter;
pub mod claude;
pub mod fetcher;
pub mod gemini;
pub mod grok;
pub mod heuristics;
pub mod openai;
pub mod registry;
pub mod transport;

pub use adapter::{AuthScheme, HttpMethod, PreparedRequest};
pub use fetcher::ModelFetcher;
pub use registry::{
    find_by_model, find_by_name, ProviderRegistry, ProviderSpec, ResolvedProvider, PROVIDERS,
};
pub use transport::{send_checked, Payload, ReqwestTransport, Transport, TransportError, TransportResponse};
