//! Orchestration layer for llmux.
//!
//! # Architecture
//!
//! - [`orchestrator`]: resolves builders against presets and defaults, then
//!   runs cache lookup, vendor dispatch, cost, and logging
//! - [`request`]: the immutable [`RequestBuilder`]
//! - [`dispatcher`]: concurrent batches and cross-provider comparison
//! - [`cache`]: request fingerprints and the TTL/tag-aware [`CacheManager`]
//! - [`models`]: the YAML model catalog with TTL snapshots and live sync
//! - [`cost`]: pricing lookups and per-request cost
//! - [`presets`]: versioned request presets on a file store
//! - [`stats`], [`logging`]: usage counters and the request log

pub mod cache;
pub mod cost;
pub mod dispatcher;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod presets;
pub mod request;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{fingerprint, CacheManager};
pub use cost::{CostCalculator, CostEstimate};
pub use dispatcher::{compare, dispatch, dispatch_resolved, parse_target};
pub use logging::{JsonlLogSink, LogSink, MemoryLogSink, NullLogSink, RequestLog, RequestStatus};
pub use models::{Catalog, ModelRepository, SyncReport, ValidationReport};
pub use orchestrator::{substitute_vars, Orchestrator, ResolvedRequest};
pub use presets::PresetStore;
pub use request::RequestBuilder;
pub use stats::{ProviderUsage, StatsSnapshot, UsageStats};
