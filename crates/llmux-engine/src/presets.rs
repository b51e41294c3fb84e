//! Preset store: named, versioned request bundles kept as YAML files.
//!
//! Layout: `<presets_dir>/<safe name>.yaml`, one preset per file.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use llmux_core::store::FileStore;
use llmux_core::types::Preset;
use llmux_core::utils::safe_filename;
use llmux_core::{Error, Result};

pub struct PresetStore {
    store: Arc<dyn FileStore>,
    dir: PathBuf,
}

impl std::fmt::Debug for PresetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetStore").field("dir", &self.dir).finish()
    }
}

impl PresetStore {
    pub fn new(store: Arc<dyn FileStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", safe_filename(name)))
    }

    pub fn get(&self, name: &str) -> Result<Option<Preset>> {
        let Some(text) = self.store.read(&self.path_for(name))? else {
            return Ok(None);
        };
        let preset: Preset = serde_yaml::from_str(&text)
            .map_err(|e| Error::config(format!("invalid preset '{name}': {e}")))?;
        Ok(Some(preset))
    }

    /// Every readable preset, sorted by name. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<Preset>> {
        let mut presets = Vec::new();
        for path in self.store.list(&self.dir)? {
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Some(text) = self.store.read(&path)? else {
                continue;
            };
            match serde_yaml::from_str::<Preset>(&text) {
                Ok(preset) => presets.push(preset),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid preset file"),
            }
        }
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(presets)
    }

    /// Create a new preset at version 1. Fails if the name is taken.
    pub fn store(&self, mut preset: Preset) -> Result<Preset> {
        if preset.name.trim().is_empty() {
            return Err(Error::config("preset name is required"));
        }
        let path = self.path_for(&preset.name);
        if self.store.exists(&path) {
            return Err(Error::Conflict(format!("preset '{}' already exists", preset.name)));
        }
        let now = Utc::now();
        preset.version = 1;
        preset.created_at = Some(now);
        preset.updated_at = Some(now);
        self.store.write(&path, &serde_yaml::to_string(&preset)?)?;
        info!(preset = %preset.name, "preset stored");
        Ok(preset)
    }

    /// Replace an existing preset, bumping its version.
    pub fn update(&self, mut preset: Preset) -> Result<Preset> {
        let existing = self
            .get(&preset.name)?
            .ok_or_else(|| Error::NotFound(format!("preset '{}'", preset.name)))?;
        preset.version = existing.version + 1;
        preset.created_at = existing.created_at;
        preset.updated_at = Some(Utc::now());
        self.store
            .write(&self.path_for(&preset.name), &serde_yaml::to_string(&preset)?)?;
        info!(preset = %preset.name, version = preset.version, "preset updated");
        Ok(preset)
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        let deleted = self.store.delete(&self.path_for(name))?;
        if deleted {
            info!(preset = name, "preset deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmux_core::store::{LocalFileStore, MemoryFileStore};
    use serde_json::json;
    use std::path::Path;

    fn store() -> PresetStore {
        PresetStore::new(Arc::new(MemoryFileStore::new()), "/presets")
    }

    fn summarizer() -> Preset {
        let mut p = Preset::new("summarizer");
        p.provider = Some("claude".into());
        p.system_prompt = Some("Summarize in three bullets.".into());
        p.options.insert("temperature".into(), json!(0.2));
        p
    }

    #[test]
    fn test_store_and_get() {
        let presets = store();
        let stored = presets.store(summarizer()).unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.created_at.is_some());

        let loaded = presets.get("summarizer").unwrap().unwrap();
        assert_eq!(loaded.provider.as_deref(), Some("claude"));
        assert_eq!(loaded.options["temperature"], json!(0.2));
        assert!(presets.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_store_duplicate_conflicts() {
        let presets = store();
        presets.store(summarizer()).unwrap();
        assert!(matches!(presets.store(summarizer()), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_update_bumps_version() {
        let presets = store();
        let first = presets.store(summarizer()).unwrap();
        let mut changed = summarizer();
        changed.model = Some("claude-3-5-haiku-20241022".into());
        let second = presets.update(changed).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(presets.update(summarizer()).unwrap().version, 3);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        assert!(matches!(store().update(summarizer()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_and_delete() {
        let presets = store();
        presets.store(summarizer()).unwrap();
        presets.store(Preset::new("coder")).unwrap();
        let names: Vec<String> = presets.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["coder", "summarizer"]);

        assert!(presets.delete("coder").unwrap());
        assert!(!presets.delete("coder").unwrap());
        assert_eq!(presets.list().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_file_is_config_error_and_skipped_in_list() {
        let files = Arc::new(MemoryFileStore::new());
        files
            .write(Path::new("/presets/broken.yaml"), "name: [unterminated")
            .unwrap();
        let presets = PresetStore::new(files, "/presets");
        assert!(presets.get("broken").unwrap_err().is_config());
        assert!(presets.list().unwrap().is_empty());
    }

    #[test]
    fn test_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let presets = PresetStore::new(Arc::new(LocalFileStore::new()), dir.path());
        presets.store(Preset::new("a/b")).unwrap();
        assert!(dir.path().join("a_b.yaml").exists());
        assert_eq!(presets.get("a/b").unwrap().unwrap().name, "a/b");
    }
}
