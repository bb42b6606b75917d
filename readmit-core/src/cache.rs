//! Durable extraction cache.
//!
//! One JSON blob maps extractor name to the fingerprint and output of its last
//! execution. The blob is read once when the Databuilder is built and written
//! wholesale at the end of every successful run; single writer only.

use crate::error::Result;
use crate::extractor::Fingerprint;
use crate::persistence::{atomic_write_json, load_json};
use crate::store::ExtractorOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Bumped when the blob layout changes; older blobs are discarded.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// The stored result of one extractor execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    pub fingerprint: Fingerprint,
    /// When the extractor last ran.
    pub created_at: DateTime<Utc>,
    pub output: ExtractorOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCache {
    format_version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache blob at `path`.
    ///
    /// A missing blob yields an empty cache. An unreadable, corrupt or
    /// outdated blob is logged and also yields an empty cache, so every
    /// extractor simply runs fresh.
    pub fn load(path: &Path) -> Self {
        match load_json::<Self>(path) {
            Ok(Some(cache)) if cache.format_version == CACHE_FORMAT_VERSION => {
                debug!(path = %path.display(), entries = cache.len(), "loaded extraction cache");
                cache
            }
            Ok(Some(cache)) => {
                warn!(
                    path = %path.display(),
                    found = cache.format_version,
                    expected = CACHE_FORMAT_VERSION,
                    "cache format is outdated, starting with an empty cache"
                );
                Self::new()
            }
            Ok(None) => Self::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read cache, starting with an empty cache");
                Self::new()
            }
        }
    }

    /// Write the whole cache atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)?;
        debug!(path = %path.display(), entries = self.len(), "saved extraction cache");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    /// The cached output for `name`, only if it was produced by an extractor
    /// with the same fingerprint.
    pub fn lookup(&self, name: &str, fingerprint: &Fingerprint) -> Option<&ExtractorOutput> {
        self.entries
            .get(name)
            .filter(|entry| &entry.fingerprint == fingerprint)
            .map(|entry| &entry.output)
    }

    /// Create or overwrite the entry for `name`.
    pub fn insert(&mut self, name: &str, fingerprint: Fingerprint, output: ExtractorOutput) {
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                name: name.to_string(),
                fingerprint,
                created_at: Utc::now(),
                output,
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> Option<CacheEntry> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FeatureValue;
    use tempfile::TempDir;

    fn output() -> ExtractorOutput {
        let mut out = ExtractorOutput::default();
        out.records.insert("1", "A__x", FeatureValue::Int(5));
        out
    }

    #[test]
    fn test_lookup_requires_matching_fingerprint() {
        let mut cache = ExtractionCache::new();
        let fp = Fingerprint::compute("A", "A", 1, "");
        cache.insert("A", fp.clone(), output());

        assert!(cache.lookup("A", &fp).is_some());
        assert!(cache.lookup("A", &Fingerprint::compute("A", "A", 2, "")).is_none());
        assert!(cache.lookup("B", &fp).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("databuilder-cache.json");
        let mut cache = ExtractionCache::new();
        cache.insert("A", Fingerprint::compute("A", "A", 1, ""), output());
        cache.save(&path).unwrap();

        let loaded = ExtractionCache::load(&path);
        assert_eq!(loaded, cache);
    }

    #[test]
    fn test_corrupt_blob_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("databuilder-cache.json");
        std::fs::write(&path, b"\x00\x01 definitely not json").unwrap();
        assert!(ExtractionCache::load(&path).is_empty());
    }

    #[test]
    fn test_outdated_format_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("databuilder-cache.json");
        std::fs::write(&path, br#"{"format_version":0,"entries":{}}"#).unwrap();
        assert!(ExtractionCache::load(&path).is_empty());
    }

    #[test]
    fn test_missing_blob_loads_empty() {
        assert!(ExtractionCache::load(Path::new("/nonexistent/cache.json")).is_empty());
    }
}
