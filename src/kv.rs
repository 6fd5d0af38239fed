//! Key-value slots backing the persistence layer
//!
//! The persistence layer never touches files directly; it reads and writes
//! named string slots through [`KeyValueStore`]. Two implementations exist:
//!
//! - [`FileStore`]: one `<key>.json` file per slot under the data directory,
//!   written atomically, with a byte quota shared by all slots.
//! - [`MemoryStore`]: shared in-process slots. Every handle created with
//!   [`MemoryStore::connect`] sees the same data and is told about writes
//!   made through the other handles, which is how several windows over one
//!   store are exercised in tests.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Browser-like default quota
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

const SLOT_EXTENSION: &str = "json";

/// Space accounting for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreUsage {
    pub used_bytes: usize,
    pub quota_bytes: usize,
    pub slots: usize,
}

impl StoreUsage {
    pub fn percent_used(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 * 100.0 / self.quota_bytes as f64
    }
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite a slot; fails with [`StoreError::QuotaExceeded`] when the
    /// new value does not fit.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn usage(&self) -> Result<StoreUsage, StoreError>;

    /// Slots changed by someone other than this handle since the last call
    fn take_external_changes(&mut self) -> Vec<String>;
}

fn slot_size(key: &str, value_len: usize) -> usize {
    key.len() + value_len
}

fn check_quota(
    key: &str,
    value: &str,
    used: usize,
    previous: usize,
    quota: usize,
) -> Result<(), StoreError> {
    let needed = slot_size(key, value.len());
    let base = used.saturating_sub(previous);
    if base + needed > quota {
        return Err(StoreError::QuotaExceeded {
            key: key.to_string(),
            needed,
            available: quota.saturating_sub(base),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

/// Slots stored as files in a directory
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: usize,
    known: HashMap<String, Fingerprint>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>, quota_bytes: usize) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut store = Self {
            dir,
            quota_bytes,
            known: HashMap::new(),
        };
        store.known = store.scan()?;
        debug!(dir = %store.dir.display(), slots = store.known.len(), "File store opened");
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.{}", safe, SLOT_EXTENSION))
    }

    fn fingerprint(path: &Path) -> Option<Fingerprint> {
        let meta = fs::metadata(path).ok()?;
        Some(Fingerprint {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }

    fn scan(&self) -> Result<HashMap<String, Fingerprint>, StoreError> {
        let mut found = HashMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            if let (Some(key), Some(fp)) = (
                path.file_stem().and_then(|s| s.to_str()),
                Self::fingerprint(&path),
            ) {
                found.insert(key.to_string(), fp);
            }
        }
        Ok(found)
    }

    fn used_bytes(&self) -> Result<usize, StoreError> {
        Ok(self
            .scan()?
            .iter()
            .map(|(key, fp)| slot_size(key, fp.len as usize))
            .sum())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.slot_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        let previous = Self::fingerprint(&path)
            .map(|fp| slot_size(key, fp.len as usize))
            .unwrap_or(0);
        check_quota(key, value, self.used_bytes()?, previous, self.quota_bytes)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        if let (Some(stem), Some(fp)) = (
            path.file_stem().and_then(|s| s.to_str()),
            Self::fingerprint(&path),
        ) {
            self.known.insert(stem.to_string(), fp);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.slot_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            self.known.remove(stem);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.scan()?.into_keys().collect();
        keys.sort();
        Ok(keys)
    }

    fn usage(&self) -> Result<StoreUsage, StoreError> {
        let slots = self.scan()?;
        Ok(StoreUsage {
            used_bytes: slots
                .iter()
                .map(|(key, fp)| slot_size(key, fp.len as usize))
                .sum(),
            quota_bytes: self.quota_bytes,
            slots: slots.len(),
        })
    }

    fn take_external_changes(&mut self) -> Vec<String> {
        let current = match self.scan() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Could not scan store directory for changes");
                return Vec::new();
            }
        };

        let mut changed: Vec<String> = current
            .iter()
            .filter(|(key, fp)| self.known.get(*key) != Some(fp))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(
            self.known
                .keys()
                .filter(|key| !current.contains_key(*key))
                .cloned(),
        );
        changed.sort();

        self.known = current;
        changed
    }
}

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct SharedSlots {
    entries: BTreeMap<String, String>,
    pending: HashMap<u64, Vec<String>>,
}

/// In-process slots shared by every connected handle
#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Mutex<SharedSlots>>,
    origin: u64,
    quota_bytes: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES)
    }
}

impl MemoryStore {
    pub fn new(quota_bytes: usize) -> Self {
        let shared = Arc::new(Mutex::new(SharedSlots::default()));
        Self::attach(shared, quota_bytes)
    }

    /// Another handle over the same slots, with its own change feed
    pub fn connect(&self) -> Self {
        Self::attach(Arc::clone(&self.shared), self.quota_bytes)
    }

    fn attach(shared: Arc<Mutex<SharedSlots>>, quota_bytes: usize) -> Self {
        let origin = NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed);
        shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .insert(origin, Vec::new());
        Self {
            shared,
            origin,
            quota_bytes,
        }
    }

    fn slots(&self) -> MutexGuard<'_, SharedSlots> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(slots: &mut SharedSlots, origin: u64, key: &str) {
        for (handle, queue) in slots.pending.iter_mut() {
            if *handle != origin && !queue.iter().any(|k| k == key) {
                queue.push(key.to_string());
            }
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let origin = self.origin;
        self.slots().pending.remove(&origin);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.slots().entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let quota = self.quota_bytes;
        let origin = self.origin;
        let mut slots = self.slots();

        let used = slots
            .entries
            .iter()
            .map(|(k, v)| slot_size(k, v.len()))
            .sum();
        let previous = slots
            .entries
            .get(key)
            .map(|v| slot_size(key, v.len()))
            .unwrap_or(0);
        check_quota(key, value, used, previous, quota)?;

        slots.entries.insert(key.to_string(), value.to_string());
        Self::broadcast(&mut slots, origin, key);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let origin = self.origin;
        let mut slots = self.slots();
        if slots.entries.remove(key).is_some() {
            Self::broadcast(&mut slots, origin, key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.slots().entries.keys().cloned().collect())
    }

    fn usage(&self) -> Result<StoreUsage, StoreError> {
        let slots = self.slots();
        Ok(StoreUsage {
            used_bytes: slots
                .entries
                .iter()
                .map(|(k, v)| slot_size(k, v.len()))
                .sum(),
            quota_bytes: self.quota_bytes,
            slots: slots.entries.len(),
        })
    }

    fn take_external_changes(&mut self) -> Vec<String> {
        let origin = self.origin;
        self.slots()
            .pending
            .get_mut(&origin)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::default();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_store_quota() {
        let mut store = MemoryStore::new(10);
        store.set("k", "12345").unwrap();

        let err = store.set("j", "123456").unwrap_err();
        assert!(err.is_quota());

        // Replacing an existing slot only counts the difference
        store.set("k", "123456789").unwrap();
        assert_eq!(store.usage().unwrap().used_bytes, 10);
    }

    #[test]
    fn test_memory_store_reports_changes_from_other_handles() {
        let mut first = MemoryStore::default();
        let mut second = first.connect();

        first.set("slot", "value").unwrap();
        assert!(first.take_external_changes().is_empty());
        assert_eq!(second.take_external_changes(), vec!["slot".to_string()]);
        assert!(second.take_external_changes().is_empty());
        assert_eq!(second.get("slot").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path(), DEFAULT_QUOTA_BYTES).unwrap();

        store.set("prompt_manager_prompts", "[]").unwrap();
        assert_eq!(
            store.get("prompt_manager_prompts").unwrap().as_deref(),
            Some("[]")
        );
        assert!(dir.path().join("prompt_manager_prompts.json").exists());

        let usage = store.usage().unwrap();
        assert_eq!(usage.slots, 1);
        assert_eq!(usage.used_bytes, "prompt_manager_prompts".len() + 2);
    }

    #[test]
    fn test_file_store_quota() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path(), 16).unwrap();

        store.set("a", "0123456789").unwrap();
        assert!(store.set("b", "0123456789").unwrap_err().is_quota());
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_file_store_detects_external_writes() {
        let dir = TempDir::new().unwrap();
        let mut mine = FileStore::open(dir.path(), DEFAULT_QUOTA_BYTES).unwrap();
        let mut theirs = FileStore::open(dir.path(), DEFAULT_QUOTA_BYTES).unwrap();

        mine.set("slot", "one").unwrap();
        assert!(mine.take_external_changes().is_empty());
        assert_eq!(theirs.take_external_changes(), vec!["slot".to_string()]);

        theirs.set("slot", "a longer value").unwrap();
        assert_eq!(mine.take_external_changes(), vec!["slot".to_string()]);

        theirs.remove("slot").unwrap();
        assert_eq!(mine.take_external_changes(), vec!["slot".to_string()]);
    }
}
