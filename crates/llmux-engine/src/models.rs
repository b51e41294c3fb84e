//! Model repository: curated model metadata backed by a YAML file.
//!
//! File format:
//!
//! ```yaml
//! providers:
//!   openai:
//!     - id: gpt-4o-mini
//!       name: GPT-4o mini
//!       type: chat
//!       contextWindow: 128000
//!       pricing: { input: 0.15, output: 0.60, cachedInput: 0.075 }
//! ```
//!
//! The file is loaded into an immutable snapshot that is reused until its
//! TTL runs out. Writers take a lock, re-read the file, apply the change,
//! persist the whole store through the [`FileStore`] (atomic replace), and
//! publish a new snapshot by swapping an `Arc`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use tracing::{debug, info, warn};

use llmux_core::store::FileStore;
use llmux_core::types::ModelInfo;
use llmux_core::{Error, Result};
use llmux_providers::ModelFetcher;

/// Provider name → models, as stored on disk.
pub type Catalog = BTreeMap<String, Vec<ModelInfo>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModelsFile {
    #[serde(default)]
    providers: Catalog,
}

struct Snapshot {
    catalog: Arc<Catalog>,
    loaded_at: Instant,
}

/// Outcome of [`ModelRepository::validate_yaml`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Outcome of [`ModelRepository::sync`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub provider: String,
    pub added: Vec<String>,
    pub kept: usize,
}

pub struct ModelRepository {
    store: Arc<dyn FileStore>,
    path: PathBuf,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for ModelRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRepository")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ModelRepository {
    pub fn new(store: Arc<dyn FileStore>, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            store,
            path: path.into(),
            ttl,
            snapshot: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current catalog, reloaded from the store once the TTL has passed.
    ///
    /// If a reload fails and an older snapshot exists, the older snapshot is
    /// served with a warning.
    pub fn catalog(&self) -> Result<Arc<Catalog>> {
        if let Some(ref snap) = *self.snapshot.read() {
            if snap.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&snap.catalog));
            }
        }

        match self.load() {
            Ok(catalog) => Ok(self.publish(catalog)),
            Err(e) => {
                if let Some(ref snap) = *self.snapshot.read() {
                    warn!(path = %self.path.display(), error = %e, "model reload failed, serving stale snapshot");
                    return Ok(Arc::clone(&snap.catalog));
                }
                Err(e)
            }
        }
    }

    /// Models for one provider, or every model when `provider` is `None`.
    pub fn list(&self, provider: Option<&str>) -> Result<Vec<ModelInfo>> {
        let catalog = self.catalog()?;
        Ok(match provider {
            Some(name) => catalog.get(name).cloned().unwrap_or_default(),
            None => catalog.values().flatten().cloned().collect(),
        })
    }

    pub fn get(&self, provider: &str, id: &str) -> Result<Option<ModelInfo>> {
        let catalog = self.catalog()?;
        Ok(catalog
            .get(provider)
            .and_then(|models| models.iter().find(|m| m.id == id))
            .cloned())
    }

    /// First model with `id` under any provider.
    pub fn find(&self, id: &str) -> Result<Option<ModelInfo>> {
        let catalog = self.catalog()?;
        Ok(catalog.values().flatten().find(|m| m.id == id).cloned())
    }

    /// Add a model. Fails with [`Error::Conflict`] when `(provider, id)`
    /// already exists, leaving the store untouched.
    pub fn add_model(&self, model: ModelInfo) -> Result<()> {
        let problems = validate_model(&model);
        if !problems.is_empty() {
            return Err(Error::config(format!("invalid model: {}", problems.join("; "))));
        }

        let _guard = self.write_lock.lock();
        let mut catalog = self.load()?;
        let models = catalog.entry(model.provider.clone()).or_default();
        if models.iter().any(|m| m.id == model.id) {
            return Err(Error::Conflict(format!(
                "model '{}' already exists for provider '{}'",
                model.id, model.provider
            )));
        }
        let (provider, id) = (model.provider.clone(), model.id.clone());
        models.push(model);
        self.persist(catalog)?;
        info!(provider = %provider, model = %id, "model added");
        Ok(())
    }

    /// Remove a model, returning the removed record.
    pub fn remove_model(&self, provider: &str, id: &str) -> Result<ModelInfo> {
        let _guard = self.write_lock.lock();
        let mut catalog = self.load()?;
        let models = catalog
            .get_mut(provider)
            .ok_or_else(|| Error::NotFound(format!("model '{id}' for provider '{provider}'")))?;
        let index = models
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("model '{id}' for provider '{provider}'")))?;
        let removed = models.remove(index);
        if models.is_empty() {
            catalog.remove(provider);
        }
        self.persist(catalog)?;
        info!(provider, model = id, "model removed");
        Ok(removed)
    }

    /// Merge a live listing into the store.
    ///
    /// Ids already present keep their curated record; new ids are appended.
    pub async fn sync(&self, fetcher: &ModelFetcher) -> Result<SyncReport> {
        let fetched = fetcher.fetch().await?;
        let provider = fetcher.provider().to_string();

        let _guard = self.write_lock.lock();
        let mut catalog = self.load()?;
        let models = catalog.entry(provider.clone()).or_default();
        let mut report = SyncReport {
            provider: provider.clone(),
            ..Default::default()
        };
        for mut model in fetched {
            if models.iter().any(|m| m.id == model.id) {
                report.kept += 1;
                continue;
            }
            model.provider = provider.clone();
            report.added.push(model.id.clone());
            models.push(model);
        }
        models.sort_by(|a, b| a.id.cmp(&b.id));
        self.persist(catalog)?;
        info!(provider = %provider, added = report.added.len(), kept = report.kept, "models synced");
        Ok(report)
    }

    /// Check a models YAML document without touching the store.
    pub fn validate_yaml(text: &str) -> ValidationReport {
        let mut errors = Vec::new();

        let doc: YamlValue = match serde_yaml::from_str(text) {
            Ok(doc) => doc,
            Err(e) => {
                return ValidationReport {
                    valid: false,
                    errors: vec![format!("invalid YAML: {e}")],
                }
            }
        };

        match doc.get("providers") {
            None => errors.push("missing top-level 'providers' mapping".to_string()),
            Some(YamlValue::Mapping(providers)) => {
                for (key, models) in providers {
                    let Some(provider) = key.as_str().filter(|k| !k.trim().is_empty()) else {
                        errors.push(format!("provider key must be a non-empty string, got {key:?}"));
                        continue;
                    };
                    let Some(items) = models.as_sequence() else {
                        errors.push(format!("providers.{provider}: expected a list of models"));
                        continue;
                    };
                    let mut seen = std::collections::BTreeSet::new();
                    for (i, item) in items.iter().enumerate() {
                        let at = format!("providers.{provider}[{i}]");
                        validate_yaml_model(&at, provider, item, &mut errors);
                        if let Some(id) = item.get("id").and_then(YamlValue::as_str) {
                            if !seen.insert(id.to_string()) {
                                errors.push(format!("{at}: duplicate id '{id}'"));
                            }
                        }
                    }
                }
            }
            Some(_) => errors.push("'providers' must be a mapping".to_string()),
        }

        if errors.is_empty() {
            if let Err(e) = serde_yaml::from_value::<ModelsFile>(doc) {
                errors.push(format!("schema error: {e}"));
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    // ── internals ──

    fn load(&self) -> Result<Catalog> {
        let Some(text) = self.store.read(&self.path)? else {
            debug!(path = %self.path.display(), "models file missing, starting empty");
            return Ok(Catalog::new());
        };
        let file: ModelsFile = serde_yaml::from_str(&text)?;
        let mut catalog = file.providers;
        for (provider, models) in catalog.iter_mut() {
            for model in models.iter_mut() {
                if model.provider.is_empty() {
                    model.provider = provider.clone();
                }
                if model.name.is_empty() {
                    model.name = model.id.clone();
                }
            }
        }
        Ok(catalog)
    }

    fn persist(&self, catalog: Catalog) -> Result<Arc<Catalog>> {
        let file = ModelsFile { providers: catalog };
        let text = serde_yaml::to_string(&file)?;
        self.store.write(&self.path, &text)?;
        Ok(self.publish(file.providers))
    }

    fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let catalog = Arc::new(catalog);
        *self.snapshot.write() = Some(Snapshot {
            catalog: Arc::clone(&catalog),
            loaded_at: Instant::now(),
        });
        catalog
    }
}

fn validate_model(model: &ModelInfo) -> Vec<String> {
    let mut errors = Vec::new();
    if model.provider.trim().is_empty() {
        errors.push("provider is required".to_string());
    }
    if model.id.trim().is_empty() {
        errors.push("id is required".to_string());
    }
    if let Some(ref pricing) = model.pricing {
        let rates = [
            ("input", Some(pricing.input)),
            ("output", Some(pricing.output)),
            ("cachedInput", pricing.cached_input),
        ];
        for (field, rate) in rates {
            if rate.is_some_and(|r| !r.is_finite() || r < 0.0) {
                errors.push(format!("pricing.{field} must be a non-negative number"));
            }
        }
    }
    errors
}

fn validate_yaml_model(at: &str, provider: &str, item: &YamlValue, errors: &mut Vec<String>) {
    if !item.is_mapping() {
        errors.push(format!("{at}: expected a mapping"));
        return;
    }

    match item.get("id").and_then(YamlValue::as_str) {
        Some(id) if !id.trim().is_empty() => {}
        _ => errors.push(format!("{at}: 'id' is required")),
    }
    if let Some(declared) = item.get("provider") {
        if declared.as_str() != Some(provider) {
            errors.push(format!("{at}: provider field does not match '{provider}'"));
        }
    }

    for field in ["maxTokens", "contextWindow"] {
        if let Some(value) = item.get(field) {
            if value.as_u64().is_none() {
                errors.push(format!("{at}.{field}: must be a non-negative integer"));
            }
        }
    }

    if let Some(limits) = item.get("limits") {
        match limits.as_mapping() {
            Some(map) => {
                for (name, value) in map {
                    if value.as_u64().is_none() {
                        errors.push(format!(
                            "{at}.limits.{}: must be a non-negative integer",
                            name.as_str().unwrap_or("?")
                        ));
                    }
                }
            }
            None => errors.push(format!("{at}.limits: expected a mapping")),
        }
    }

    if let Some(pricing) = item.get("pricing") {
        for field in ["input", "output", "cachedInput"] {
            match pricing.get(field) {
                None if field == "cachedInput" => {}
                None => errors.push(format!("{at}.pricing.{field}: required")),
                Some(value) => {
                    if !value.as_f64().is_some_and(|v| v.is_finite() && v >= 0.0) {
                        errors.push(format!("{at}.pricing.{field}: must be a non-negative number"));
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
