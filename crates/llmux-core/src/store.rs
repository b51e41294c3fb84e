//! Storage collaborators: structured-file store and response-cache store.
//!
//! The engine only talks to the [`FileStore`] and [`CacheStore`] traits.
//! Default implementations live here so the workspace works out of the box:
//!
//! - [`LocalFileStore`]: plain files, writes go through a temp file + rename
//! - [`MemoryFileStore`]: in-process map, used by tests and ephemeral setups
//! - [`MemoryCacheStore`]: in-process map without tag deletion
//! - [`DirCacheStore`]: one JSON file per fingerprint, with tag deletion

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::CacheEntry;

// ─────────────────────────────────────────────
// File store
// ─────────────────────────────────────────────

/// Read/write access to structured text files (model and preset definitions).
pub trait FileStore: Send + Sync {
    /// Read a whole file. `Ok(None)` when it does not exist.
    fn read(&self, path: &Path) -> Result<Option<String>>;

    /// Replace a whole file. Readers never observe a partial write.
    fn write(&self, path: &Path, content: &str) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Delete a file. Returns whether it existed.
    fn delete(&self, path: &Path) -> Result<bool>;

    /// Files directly inside `dir`, sorted. Empty when `dir` is missing.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// [`FileStore`] over the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

/// Write `content` to `path` via a sibling temp file and an atomic rename.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)
}

impl FileStore for LocalFileStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        write_atomic(path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// [`FileStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.read().get(path).cloned())
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.files
            .write()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        Ok(self.files.write().remove(path).is_some())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .files
            .read()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        files.sort();
        Ok(files)
    }
}

// ─────────────────────────────────────────────
// Cache store
// ─────────────────────────────────────────────

/// Key-value backing store for cached responses.
///
/// Implementations only store and return entries; the cache manager decides
/// when entries expire and keeps tag bookkeeping.
pub trait CacheStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite (last write wins).
    fn put(&self, entry: CacheEntry) -> Result<()>;

    fn delete(&self, fingerprint: &str) -> Result<bool>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;

    /// Remove entries expired at `now_ms`, returning their fingerprints.
    fn purge_expired(&self, now_ms: i64) -> Result<Vec<String>>;

    /// Whether [`CacheStore::delete_by_tag`] is implemented natively.
    fn supports_tags(&self) -> bool {
        false
    }

    /// Remove every entry carrying `tag`, returning how many were removed.
    fn delete_by_tag(&self, _tag: &str) -> Result<usize> {
        Err(Error::store("tag deletion not supported by this cache store"))
    }
}

/// In-memory [`CacheStore`]. No native tag deletion.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        self.entries
            .write()
            .insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    fn delete(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.entries.write().remove(fingerprint).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn purge_expired(&self, now_ms: i64) -> Result<Vec<String>> {
        let mut purged = Vec::new();
        self.entries.write().retain(|fingerprint, entry| {
            let keep = !entry.is_expired(now_ms);
            if !keep {
                purged.push(fingerprint.clone());
            }
            keep
        });
        Ok(purged)
    }
}

/// Directory-backed [`CacheStore`]: `<dir>/<fingerprint>.json`.
///
/// Survives process restarts, so the binary uses it when `cache.dir` is set.
#[derive(Debug, Clone)]
pub struct DirCacheStore {
    dir: PathBuf,
}

impl DirCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", crate::utils::safe_filename(fingerprint)))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Every readable entry with its file; broken files are skipped.
    fn entries(&self) -> Result<Vec<(PathBuf, CacheEntry)>> {
        let mut entries = Vec::new();
        for path in self.entry_files()? {
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable cache file");
                    continue;
                }
            };
            match serde_json::from_str::<CacheEntry>(&content) {
                Ok(entry) => entries.push((path, entry)),
                Err(_) => warn!(path = %path.display(), "skipping corrupt cache file"),
            }
        }
        Ok(entries)
    }
}

impl CacheStore for DirCacheStore {
    fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(fingerprint);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let json = serde_json::to_string(&entry)?;
        write_atomic(&self.entry_path(&entry.fingerprint), &json)?;
        Ok(())
    }

    fn delete(&self, fingerprint: &str) -> Result<bool> {
        match std::fs::remove_file(self.entry_path(fingerprint)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        for path in self.entry_files()? {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn purge_expired(&self, now_ms: i64) -> Result<Vec<String>> {
        let mut purged = Vec::new();
        for (path, entry) in self.entries()? {
            if entry.is_expired(now_ms) {
                std::fs::remove_file(&path)?;
                purged.push(entry.fingerprint);
            }
        }
        Ok(purged)
    }

    fn supports_tags(&self) -> bool {
        true
    }

    fn delete_by_tag(&self, tag: &str) -> Result<usize> {
        let mut removed = 0;
        for (path, entry) in self.entries()? {
            if entry.has_tag(tag) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanonicalResponse;
    use std::collections::BTreeSet;

    fn entry(fp: &str, tags: &[&str]) -> CacheEntry {
        CacheEntry {
            fingerprint: fp.to_string(),
            value: CanonicalResponse {
                content: format!("content for {fp}"),
                ..Default::default()
            },
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            expires_at_ms: None,
        }
    }

    // ── LocalFileStore ──

    #[test]
    fn test_local_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("models.yaml");
        let store = LocalFileStore::new();

        assert_eq!(store.read(&path).unwrap(), None);
        assert!(!store.exists(&path));

        store.write(&path, "providers: {}\n").unwrap();
        assert!(store.exists(&path));
        assert_eq!(store.read(&path).unwrap().as_deref(), Some("providers: {}\n"));

        // No temp file left behind
        assert!(!dir.path().join("nested").join("models.yaml.tmp").exists());

        assert!(store.delete(&path).unwrap());
        assert!(!store.delete(&path).unwrap());
    }

    #[test]
    fn test_local_store_list_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        store.write(&dir.path().join("b.yaml"), "b").unwrap();
        store.write(&dir.path().join("a.yaml"), "a").unwrap();

        let files = store.list(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.yaml"));

        let missing = store.list(&dir.path().join("nope")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_memory_file_store_list_is_shallow() {
        let store = MemoryFileStore::new();
        store.write(Path::new("/p/a.yaml"), "a").unwrap();
        store.write(Path::new("/p/sub/b.yaml"), "b").unwrap();
        let files = store.list(Path::new("/p")).unwrap();
        assert_eq!(files, vec![PathBuf::from("/p/a.yaml")]);
    }

    // ── MemoryCacheStore ──

    #[test]
    fn test_memory_cache_store_last_write_wins() {
        let store = MemoryCacheStore::new();
        store.put(entry("fp1", &["openai"])).unwrap();
        let mut newer = entry("fp1", &["openai"]);
        newer.value.content = "newer".into();
        store.put(newer).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("fp1").unwrap().unwrap().value.content, "newer");
    }

    #[test]
    fn test_memory_cache_store_has_no_tag_delete() {
        let store = MemoryCacheStore::new();
        assert!(!store.supports_tags());
        assert!(store.delete_by_tag("openai").is_err());
    }

    // ── DirCacheStore ──

    #[test]
    fn test_dir_cache_store_delete_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCacheStore::new(dir.path()).unwrap();
        store.put(entry("a", &["openai", "gpt-4o"])).unwrap();
        store.put(entry("b", &["openai", "gpt-4o-mini"])).unwrap();
        store.put(entry("c", &["claude", "claude-sonnet-4"])).unwrap();

        assert!(store.supports_tags());
        assert_eq!(store.delete_by_tag("openai").unwrap(), 2);
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.get("c").unwrap().unwrap().value.content, "content for c");
    }

    #[test]
    fn test_purge_expired() {
        let mut stale = entry("stale", &[]);
        stale.expires_at_ms = Some(1_000);
        let mut fresh = entry("fresh", &[]);
        fresh.expires_at_ms = Some(5_000);

        let memory = MemoryCacheStore::new();
        let dir = tempfile::tempdir().unwrap();
        let on_disk = DirCacheStore::new(dir.path()).unwrap();
        let stores: [&dyn CacheStore; 2] = [&memory, &on_disk];
        for store in stores {
            store.put(stale.clone()).unwrap();
            store.put(fresh.clone()).unwrap();
            store.put(entry("forever", &[])).unwrap();
            assert_eq!(store.purge_expired(2_000).unwrap(), vec!["stale".to_string()]);
            assert!(store.get("stale").unwrap().is_none());
            assert!(store.get("fresh").unwrap().is_some());
            assert!(store.get("forever").unwrap().is_some());
        }
    }

    #[test]
    fn test_dir_cache_store_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCacheStore::new(dir.path()).unwrap();
        store.put(entry("a", &[])).unwrap();
        store.put(entry("b", &[])).unwrap();
        store.clear().unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(!store.delete("b").unwrap());
    }
}
