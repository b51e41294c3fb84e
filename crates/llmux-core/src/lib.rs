//! llmux core: canonical types, configuration, errors, and store interfaces.
//!
//! This crate contains:
//! - **types**: canonical request/response, model metadata, cache entries, presets
//! - **error**: the shared error taxonomy
//! - **config**: JSON configuration schema and loader
//! - **store**: file-store and cache-store collaborator traits with default implementations
//! - **utils**: path and string helpers

pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use types::{
    CacheEntry, CanonicalRequest, CanonicalResponse, ModelInfo, Options, Preset, Pricing, Usage,
    Vars,
};
