//! Processed-id cache persisted between runs.
//!
//! The [`ResultCache`] owns a JSON file holding a flat list of paper ids that
//! earlier runs already summarized. It is read once when a run starts and
//! written once when the run finishes.
//!
//! **Durability rules:**
//! - A missing, unreadable or malformed file loads as an empty set (logged, never fatal)
//! - Saving goes through a sibling temp file and an atomic rename, so a crash
//!   mid-write can only lose the new state, never truncate the old one

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use paperdigest_shared::{PaperDigestError, Result};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// ProcessedIdSet
// ---------------------------------------------------------------------------

/// Set of paper ids that must never be summarized or appended again.
///
/// Ordered so the persisted list is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedIdSet {
    ids: BTreeSet<String>,
}

impl ProcessedIdSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` was processed by an earlier (or the current) run.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as processed. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ProcessedIdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultCache
// ---------------------------------------------------------------------------

/// Handle to the processed-id cache file.
#[derive(Debug, Clone)]
pub struct ResultCache {
    path: PathBuf,
}

impl ResultCache {
    /// Create a cache handle for `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the persisted cache.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted id set, failing soft to an empty set.
    pub fn load(&self) -> ProcessedIdSet {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache file yet, starting empty");
                return ProcessedIdSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache unreadable, starting empty");
                return ProcessedIdSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(ids) => {
                let set: ProcessedIdSet = ids.into_iter().collect();
                debug!(path = %self.path.display(), count = set.len(), "cache loaded");
                set
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache corrupt, resetting");
                ProcessedIdSet::new()
            }
        }
    }

    /// Persist `ids`, replacing the prior state atomically.
    pub fn save(&self, ids: &ProcessedIdSet) -> Result<()> {
        let dir = parent_dir(&self.path);
        std::fs::create_dir_all(&dir).map_err(|e| PaperDigestError::io(&dir, e))?;

        let list: Vec<&str> = ids.iter().collect();
        let json = serde_json::to_string_pretty(&list)
            .map_err(|e| PaperDigestError::Storage(format!("failed to serialize cache: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| PaperDigestError::io(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PaperDigestError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| PaperDigestError::io(&self.path, e.error))?;

        info!(path = %self.path.display(), count = ids.len(), "cache saved");
        Ok(())
    }

    /// Delete the persisted state. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PaperDigestError::io(&self.path, e)),
        }
    }
}

/// Directory holding `path`; a bare file name resolves to the working directory.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// A cache file path inside a fresh temp directory.
    fn test_cache() -> ResultCache {
        let dir = std::env::temp_dir().join(format!("pd_cache_{}", Uuid::now_v7()));
        ResultCache::new(dir.join("summarized_papers.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let cache = test_cache();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn roundtrip_preserves_ids() {
        let cache = test_cache();
        let ids: ProcessedIdSet = ["http://arxiv.org/pdf/1", "http://arxiv.org/pdf/2"]
            .into_iter()
            .collect();

        cache.save(&ids).expect("save");
        assert_eq!(cache.load(), ids);
    }

    #[test]
    fn roundtrip_empty_set() {
        let cache = test_cache();
        cache.save(&ProcessedIdSet::new()).expect("save");
        assert!(cache.path().exists());
        assert!(cache.load().is_empty());
    }

    #[test]
    fn corrupt_file_resets_to_empty() {
        let cache = test_cache();
        std::fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        std::fs::write(cache.path(), "{ not a list").unwrap();
        assert!(cache.load().is_empty());

        std::fs::write(cache.path(), r#"{"ids": ["a"]}"#).unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let cache = test_cache();
        cache
            .save(&["a", "b", "c"].into_iter().collect())
            .expect("first save");
        cache.save(&["z"].into_iter().collect()).expect("second save");

        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("z"));
        assert!(!loaded.contains("a"));
    }

    #[test]
    fn persisted_form_is_a_flat_sorted_list() {
        let cache = test_cache();
        cache.save(&["b", "a"].into_iter().collect()).expect("save");
        let raw = std::fs::read_to_string(cache.path()).unwrap();
        let list: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn clear_is_idempotent() {
        let cache = test_cache();
        cache.save(&["a"].into_iter().collect()).expect("save");
        cache.clear().expect("first clear");
        cache.clear().expect("second clear");
        assert!(cache.load().is_empty());
    }

    #[test]
    fn insert_reports_novelty() {
        let mut ids = ProcessedIdSet::new();
        assert!(ids.insert("a"));
        assert!(!ids.insert("a"));
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn bare_file_name_uses_working_dir() {
        assert_eq!(parent_dir(Path::new("cache.json")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/tmp/x/cache.json")), PathBuf::from("/tmp/x"));
    }
}
