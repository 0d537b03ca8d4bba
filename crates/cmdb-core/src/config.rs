//! Sync configuration and its layered resolution
//!
//! # Example TOML
//!
//! ```toml
//! folder_target = "folders"
//!
//! [account]
//! id = "cmk-prod"
//! name = "Checkmk Production"
//!
//! [host_policy]
//! lowercase_hostnames = true
//!
//! [[targets]]
//! name = "folders"
//! kind = "named"
//!
//! [[targets]]
//! name = "checkgroup_parameters:filesystem"
//! kind = "content_addressed"
//!
//! [attributes.label_prefixes]
//! export = ["cmk/", "site"]
//!
//! [rules]
//! actions = "rules/actions.toml"
//! constructs = "rules/constructs.yaml"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use cmdb_hosts::HostPolicy;
use cmdb_rules::{Condition, RuleFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{ConstructKind, Target};
use crate::{Error, Result};

/// Directory name used below the platform config and data directories
pub const APP_DIR: &str = "cmdb-sync";

/// Identity of the account a sync runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub name: String,
}

/// How host attributes are exposed to consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Label key prefixes eligible for export, per purpose. A purpose with
    /// no entry exports every label.
    #[serde(default)]
    pub label_prefixes: BTreeMap<String, Vec<String>>,

    /// Hosts matching any of these conditions are excluded entirely
    #[serde(default)]
    pub exclude: Vec<Condition>,
}

/// Rule documents, relative paths resolve against the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructs: Option<PathBuf>,
}

/// Complete configuration of one sync account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub account: AccountConfig,

    #[serde(default)]
    pub host_policy: HostPolicy,

    /// Where snapshots and run locks live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Targets in pass order
    #[serde(default)]
    pub targets: Vec<Target>,

    /// Target receiving folder constructs derived from action rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_target: Option<String>,

    #[serde(default)]
    pub attributes: AttributeConfig,

    #[serde(default)]
    pub rules: RuleFiles,
}

impl SyncConfig {
    pub fn new(account: AccountConfig) -> Self {
        Self {
            account,
            host_policy: HostPolicy::default(),
            state_dir: None,
            targets: Vec::new(),
            folder_target: None,
            attributes: AttributeConfig::default(),
            rules: RuleFiles::default(),
        }
    }

    /// Effective state directory
    ///
    /// Falls back to `<data_dir>/cmdb-sync`, or `.cmdb-sync` when the
    /// platform has no data directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
    }

    /// Anchor relative state and rule paths at `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let paths = [
            &mut self.state_dir,
            &mut self.rules.actions,
            &mut self.rules.constructs,
        ];
        for path in paths.into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.account.id.trim().is_empty() {
            return Err("account.id must not be empty".to_string());
        }

        let mut seen = BTreeSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err("target names must not be empty".to_string());
            }
            if !seen.insert(target.name.as_str()) {
                return Err(format!("duplicate target '{}'", target.name));
            }
        }

        if let Some(name) = &self.folder_target {
            match self.target(name) {
                Some(t) if t.kind == ConstructKind::Named => {}
                Some(_) => return Err(format!("folder_target '{name}' must be a named target")),
                None => return Err(format!("folder_target '{name}' is not a configured target")),
            }
        }
        Ok(())
    }
}

/// Read a configuration layer into a generic document
///
/// Layers share the rule files' formats, detected from the extension.
fn load_layer(path: &Path) -> Result<Value> {
    let format = RuleFormat::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let content = fs::read_to_string(path)?;
    let invalid = |message: String| Error::InvalidConfig {
        path: path.to_path_buf(),
        message,
    };

    match format.parse(&content).map_err(invalid)? {
        value @ Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(invalid("top level must be a table".to_string())),
    }
}

/// Recursively merge `other` into `base`; tables merge, everything else is replaced
fn deep_merge_value(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Object(base_map), Value::Object(other_map)) => {
            for (key, other_val) in other_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge_value(base_val, other_val);
                } else {
                    base_map.insert(key.clone(), other_val.clone());
                }
            }
        }
        (base, other) => {
            *base = other.clone();
        }
    }
}

/// Resolves a [`SyncConfig`] by merging layered sources
///
/// Layers, later overriding earlier:
/// 1. Global defaults (`<config_dir>/cmdb-sync/config.toml`)
/// 2. The given configuration file
/// 3. Local overrides next to it (`<stem>.local.<ext>`)
pub struct ConfigResolver {
    path: PathBuf,

    /// Override for the global config directory (used for testing).
    /// When `None`, `dirs::config_dir()` is used.
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            global_config_dir_override: None,
        }
    }

    /// Create a resolver with a custom global config directory
    pub fn with_global_config_dir(path: impl Into<PathBuf>, global_config_dir: PathBuf) -> Self {
        Self {
            path: path.into(),
            global_config_dir_override: Some(global_config_dir),
        }
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    /// Path of the local override layer, e.g. `sync.local.toml` for `sync.toml`
    pub fn local_override_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{stem}.local.{}", ext.to_string_lossy()),
            None => format!("{stem}.local"),
        };
        self.path.with_file_name(name)
    }

    /// Merge all layers and validate the result
    ///
    /// The main file must exist; the global and local layers are optional.
    pub fn resolve(&self) -> Result<SyncConfig> {
        if !self.path.is_file() {
            return Err(Error::ConfigNotFound {
                path: self.path.clone(),
            });
        }

        let mut merged = Value::Object(Map::new());

        // Layer 1 - Global defaults
        if let Some(global_dir) = self.global_config_dir() {
            let global_config_path = global_dir.join("config.toml");
            if global_config_path.is_file() {
                tracing::debug!(?global_config_path, "Loading global config (layer 1)");
                deep_merge_value(&mut merged, &load_layer(&global_config_path)?);
            } else {
                tracing::debug!(?global_config_path, "No global config found (layer 1), skipping");
            }
        }

        // Layer 2 - The configuration file itself
        tracing::debug!(path = ?self.path, "Loading config (layer 2)");
        deep_merge_value(&mut merged, &load_layer(&self.path)?);

        // Layer 3 - Local overrides
        let local_config_path = self.local_override_path();
        if local_config_path.is_file() {
            tracing::debug!(?local_config_path, "Loading local config (layer 3)");
            deep_merge_value(&mut merged, &load_layer(&local_config_path)?);
        }

        let mut config: SyncConfig =
            serde_json::from_value(merged).map_err(|e| Error::InvalidConfig {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        config.validate().map_err(|message| Error::InvalidConfig {
            path: self.path.clone(),
            message,
        })?;
        if let Some(base) = self.path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }
}
