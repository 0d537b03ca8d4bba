//! Cached snapshots: the desired state last pushed per account and target
//!
//! Reconciliation reads the snapshot once at pass start to tell constructs it
//! created from operator-managed ones, and writes it once at pass end.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::descriptor::ConstructDescriptor;
use crate::template::sanitize_identifier;
use crate::{Error, Result};

const SNAPSHOT_VERSION: &str = "1.0";

/// On-disk snapshot document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot {
    /// Format version for forward compatibility
    pub version: String,
    pub account: String,
    pub target: String,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<ConstructDescriptor>,
}

impl CachedSnapshot {
    pub fn new(account: &str, target: &str, entries: Vec<ConstructDescriptor>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            account: account.to_string(),
            target: target.to_string(),
            updated: Utc::now(),
            entries,
        }
    }
}

/// Persistence of cached snapshots
pub trait SnapshotStore {
    /// Entries of the last snapshot; empty when none was written yet
    fn load(&self, account: &str, target: &str) -> Result<Vec<ConstructDescriptor>>;

    /// Replace the snapshot
    fn save(&self, account: &str, target: &str, entries: &[ConstructDescriptor]) -> Result<()>;
}

/// JSON snapshots below `<state_dir>/snapshots/<account>/<target>.json`
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Store rooted at a state directory
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("snapshots"),
        }
    }

    pub fn path(&self, account: &str, target: &str) -> PathBuf {
        self.root
            .join(sanitize_identifier(account))
            .join(format!("{}.json", sanitize_identifier(target)))
    }

    fn snapshot_error(path: &Path, message: impl Into<String>) -> Error {
        Error::Snapshot {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    /// Read with a shared lock
    fn load(&self, account: &str, target: &str) -> Result<Vec<ConstructDescriptor>> {
        let path = self.path(account, target);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        FileExt::lock_shared(&file)?;

        // Read through the locked handle
        let mut content = String::new();
        (&file).read_to_string(&mut content)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let snapshot: CachedSnapshot = serde_json::from_str(&content)
            .map_err(|e| Self::snapshot_error(&path, e.to_string()))?;
        if snapshot.account != account || snapshot.target != target {
            return Err(Self::snapshot_error(
                &path,
                format!(
                    "belongs to {}/{}, expected {account}/{target}",
                    snapshot.account, snapshot.target
                ),
            ));
        }
        Ok(snapshot.entries)
    }

    /// Write atomically under an exclusive lock
    fn save(&self, account: &str, target: &str, entries: &[ConstructDescriptor]) -> Result<()> {
        let path = self.path(account, target);
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let snapshot = CachedSnapshot::new(account, target, entries.to_vec());
        let content = serde_json::to_string_pretty(&snapshot)?;

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        FileExt::lock_exclusive(&lock_file)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "Snapshot written");
        Ok(())
    }
}

/// In-process snapshot store
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<(String, String), Vec<ConstructDescriptor>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot, as if a previous run had written it
    pub fn with_entries(self, account: &str, target: &str, entries: Vec<ConstructDescriptor>) -> Self {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert((account.to_string(), target.to_string()), entries);
        }
        self
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, account: &str, target: &str) -> Result<Vec<ConstructDescriptor>> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| Error::Snapshot {
                path: PathBuf::from(target),
                message: e.to_string(),
            })?;
        Ok(snapshots
            .get(&(account.to_string(), target.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, account: &str, target: &str, entries: &[ConstructDescriptor]) -> Result<()> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| Error::Snapshot {
                path: PathBuf::from(target),
                message: e.to_string(),
            })?;
        snapshots.insert((account.to_string(), target.to_string()), entries.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn entries() -> Vec<ConstructDescriptor> {
        vec![
            ConstructDescriptor::named("linux", "Linux"),
            ConstructDescriptor::keyed("os", json!({"id": "os", "tags": []})),
        ]
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.load("acc", "groups").unwrap().is_empty());
    }

    #[test]
    fn test_save_is_atomic_and_roundtrips() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save("acc", "groups", &entries()).unwrap();

        let path = store.path("acc", "groups");
        assert_eq!(path, dir.path().join("snapshots/acc/groups.json"));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.load("acc", "groups").unwrap(), entries());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"version\": \"1.0\""));
        assert!(raw.contains("\"target\": \"groups\""));
    }

    #[test]
    fn test_names_are_sanitised_into_paths() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let path = store.path("acc/../x", "rules:filesystem");
        assert!(path.starts_with(dir.path().join("snapshots")));
        assert_eq!(path.file_name().unwrap(), "rules_filesystem.json");
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let path = store.path("acc", "groups");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(store.load("acc", "groups"), Err(Error::Snapshot { .. })));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new().with_entries("acc", "groups", entries());
        assert_eq!(store.load("acc", "groups").unwrap(), entries());
        assert!(store.load("other", "groups").unwrap().is_empty());
        store.save("acc", "groups", &[]).unwrap();
        assert!(store.load("acc", "groups").unwrap().is_empty());
    }
}
