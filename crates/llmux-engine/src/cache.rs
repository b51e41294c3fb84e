//! Response cache keyed by request fingerprint.
//!
//! The manager sits in front of a [`CacheStore`]. It owns expiry, tagging,
//! and failure policy:
//!
//! - store errors never fail a request; they are logged and read as a miss
//!   or a skipped write
//! - a disabled cache always misses and drops writes
//! - when the store cannot delete by tag, the manager keeps its own
//!   tag → fingerprint index (process-local)
//! - expired entries that are never read again are purged by a sweep that
//!   runs from `put`, at most once per sweep interval

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use llmux_core::store::CacheStore;
use llmux_core::types::{CacheEntry, CanonicalRequest, CanonicalResponse};
use llmux_core::utils::now_millis;

// ─────────────────────────────────────────────
// Fingerprint
// ─────────────────────────────────────────────

/// SHA-256 hex digest identifying a resolved request.
///
/// Covers provider, model, prompt, system prompt, options and vars. Map keys
/// are sorted at every depth, so insertion order never changes the result.
pub fn fingerprint(request: &CanonicalRequest) -> String {
    let subject = json!({
        "provider": request.provider,
        "model": request.model,
        "prompt": request.prompt,
        "systemPrompt": request.system_prompt,
        "options": request.options,
        "vars": request.vars,
    });
    let mut canonical = String::new();
    write_canonical(&subject, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serialize `value` with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ─────────────────────────────────────────────
// CacheManager
// ─────────────────────────────────────────────

pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    enabled: bool,
    /// tag → fingerprints, used only when the store lacks tag deletion.
    tag_index: RwLock<HashMap<String, HashSet<String>>>,
    sweep_interval_ms: i64,
    last_sweep_ms: AtomicI64,
}

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("enabled", &self.enabled)
            .field("native_tags", &self.store.supports_tags())
            .finish()
    }
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, enabled: bool) -> Self {
        Self {
            store,
            enabled,
            tag_index: RwLock::new(HashMap::new()),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as i64,
            last_sweep_ms: AtomicI64::new(now_millis()),
        }
    }

    /// How often `put` purges expired entries. Zero sweeps on every write.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// A manager that never hits and never stores.
    pub fn disabled() -> Self {
        Self::new(Arc::new(llmux_core::store::MemoryCacheStore::new()), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a fingerprint. Hits come back with `cached = true`.
    pub fn get(&self, fingerprint: &str) -> Option<CanonicalResponse> {
        if !self.enabled {
            return None;
        }

        let entry = match self.store.get(fingerprint) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(fingerprint, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        if entry.is_expired(now_millis()) {
            debug!(fingerprint, "cache entry expired");
            if let Err(e) = self.store.delete(fingerprint) {
                warn!(fingerprint, error = %e, "failed to drop expired cache entry");
            }
            self.unindex(fingerprint);
            return None;
        }

        let mut response = entry.value;
        response.cached = true;
        Some(response)
    }

    /// Store a response. `ttl = None` (or zero) never expires.
    pub fn put(
        &self,
        fingerprint: &str,
        response: &CanonicalResponse,
        ttl: Option<Duration>,
        tags: &[&str],
    ) {
        if !self.enabled {
            return;
        }

        let mut value = response.clone();
        value.cached = false;
        let expires_at_ms = ttl
            .filter(|t| !t.is_zero())
            .map(|t| now_millis().saturating_add(i64::try_from(t.as_millis()).unwrap_or(i64::MAX)));
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            value,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            expires_at_ms,
        };

        self.maybe_sweep();
        if let Err(e) = self.store.put(entry) {
            warn!(fingerprint, error = %e, "cache write failed, skipping");
            return;
        }

        if !self.store.supports_tags() {
            let mut index = self.tag_index.write();
            for tag in tags {
                index
                    .entry(tag.to_string())
                    .or_default()
                    .insert(fingerprint.to_string());
            }
        }
        debug!(fingerprint, ?tags, "cached response");
    }

    /// Remove every entry tagged `tag`. Returns how many were removed.
    pub fn invalidate(&self, tag: &str) -> usize {
        let removed = if self.store.supports_tags() {
            match self.store.delete_by_tag(tag) {
                Ok(n) => n,
                Err(e) => {
                    warn!(tag, error = %e, "cache invalidation failed");
                    0
                }
            }
        } else {
            let fingerprints = self.tag_index.write().remove(tag).unwrap_or_default();
            let mut removed = 0;
            for fp in &fingerprints {
                match self.store.delete(fp) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(fingerprint = %fp, error = %e, "failed to delete cache entry"),
                }
                self.unindex(fp);
            }
            removed
        };
        info!(tag, removed, "cache invalidated");
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "cache clear failed");
        }
        self.tag_index.write().clear();
        info!("cache cleared");
    }

    /// Purge expired entries now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let purged = match self.store.purge_expired(now_millis()) {
            Ok(purged) => purged,
            Err(e) => {
                warn!(error = %e, "cache sweep failed");
                return 0;
            }
        };
        if !purged.is_empty() {
            let purged: HashSet<&str> = purged.iter().map(String::as_str).collect();
            self.tag_index.write().retain(|_, fps| {
                fps.retain(|fp| !purged.contains(fp.as_str()));
                !fps.is_empty()
            });
            debug!(removed = purged.len(), "swept expired cache entries");
        }
        purged.len()
    }

    fn maybe_sweep(&self) {
        let now = now_millis();
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.sweep_interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep();
        }
    }

    fn unindex(&self, fingerprint: &str) {
        let mut index = self.tag_index.write();
        index.retain(|_, fps| {
            fps.remove(fingerprint);
            !fps.is_empty()
        });
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
