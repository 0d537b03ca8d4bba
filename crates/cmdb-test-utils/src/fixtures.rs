//! Host, store and configuration fixtures.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use cmdb_core::{AccountConfig, ConstructKind, SyncConfig, Target};
use cmdb_hosts::{Host, HostPolicy, MemoryHostStore};
use tempfile::TempDir;

/// An available, freshly imported host with default normalisation
pub fn host(name: &str, labels: &[(&str, &str)]) -> Host {
    let policy = HostPolicy::default();
    let mut host = Host::new(name, &policy);
    host.set_labels(labels.iter().copied(), &policy);
    host.set_import_sync(Utc::now());
    host
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn store(hosts: impl IntoIterator<Item = Host>) -> MemoryHostStore {
    hosts.into_iter().collect()
}

/// A temporary state directory with a matching [`SyncConfig`]
///
/// # Example
///
/// ```rust
/// use cmdb_core::ConstructKind;
/// use cmdb_test_utils::TestState;
///
/// let state = TestState::new().with_target("host_groups", ConstructKind::Named);
/// assert_eq!(state.config().targets.len(), 1);
/// assert!(state.config().state_dir.as_deref() == Some(state.root()));
/// ```
pub struct TestState {
    temp_dir: TempDir,
    config: SyncConfig,
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

impl TestState {
    /// Empty state directory, account `test`, no targets
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("TestState::new: failed to create temp dir");
        let mut config = SyncConfig::new(AccountConfig {
            id: "test".to_string(),
            name: "Test Account".to_string(),
        });
        config.state_dir = Some(temp_dir.path().to_path_buf());
        Self { temp_dir, config }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn with_target(mut self, name: &str, kind: ConstructKind) -> Self {
        self.config.targets.push(Target::new(name, kind));
        self
    }

    pub fn with_folder_target(mut self, name: &str) -> Self {
        self.config.folder_target = Some(name.to_string());
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SyncConfig {
        &mut self.config
    }

    pub fn target(&self, name: &str) -> Target {
        self.config
            .target(name)
            .cloned()
            .unwrap_or_else(|| panic!("TestState::target: '{name}' is not configured"))
    }

    /// Path of the snapshot file for a target
    pub fn snapshot_path(&self, target: &str) -> std::path::PathBuf {
        self.root()
            .join("snapshots")
            .join(&self.config.account.id)
            .join(format!("{target}.json"))
    }
}
