//! The host record and its write paths

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::HostCache;
use crate::error::{Error, Result};
use crate::policy::HostPolicy;
use crate::Attributes;

/// Inventory key recording which account imported the host
pub const SYNCER_ACCOUNT_KEY: &str = "syncer_account";

/// Reference to the import account that owns a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
    /// Master accounts may take over hosts owned by other accounts
    #[serde(default)]
    pub is_master: bool,
    /// Hosts from this account are objects, not monitored hosts
    #[serde(default)]
    pub is_object: bool,
}

/// A host identified by hostname with labels, inventory and a derived-value cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    hostname: String,
    #[serde(default)]
    labels: Attributes,
    #[serde(default)]
    inventory: Attributes,
    #[serde(default)]
    cache: HostCache,
    /// Whether the host was present on its source during the last import
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub is_object: bool,
    #[serde(default)]
    source_account: Option<AccountRef>,
    /// Folder the host is pinned to, overriding rule-derived placement
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    last_import_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    last_import_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    log: Vec<String>,
}

impl Host {
    /// Create an empty host. The hostname is normalised by `policy`.
    pub fn new(hostname: &str, policy: &HostPolicy) -> Self {
        Self {
            hostname: policy.normalize_hostname(hostname),
            labels: Attributes::new(),
            inventory: Attributes::new(),
            cache: HostCache::new(),
            available: false,
            is_object: false,
            source_account: None,
            folder: None,
            last_import_seen: None,
            last_import_sync: None,
            log: Vec::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn labels(&self) -> &Attributes {
        &self.labels
    }

    pub fn inventory(&self) -> &Attributes {
        &self.inventory
    }

    pub fn cache(&self) -> &HostCache {
        &self.cache
    }

    /// Mutable cache access for memoisation. Invalidation stays with the write paths.
    pub fn cache_mut(&mut self) -> &mut HostCache {
        &mut self.cache
    }

    pub fn source_account(&self) -> Option<&AccountRef> {
        self.source_account.as_ref()
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    pub fn last_import_seen(&self) -> Option<DateTime<Utc>> {
        self.last_import_seen
    }

    pub fn last_import_sync(&self) -> Option<DateTime<Utc>> {
        self.last_import_sync
    }

    /// Change log, newest entry first
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Replace all labels
    ///
    /// Keys and values are normalised first. When the normalised set differs
    /// from the stored one the change is logged and the cache is cleared.
    /// Returns whether anything changed.
    pub fn set_labels<I, K, V>(&mut self, labels: I, policy: &HostPolicy) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let normalized = policy.normalize(labels);
        if normalized == self.labels {
            return false;
        }
        self.add_log(
            format!("Label change: {:?} to {:?}", self.labels, normalized),
            policy,
        );
        tracing::debug!(hostname = %self.hostname, "Labels changed, clearing host cache");
        self.labels = normalized;
        self.cache.invalidate();
        true
    }

    /// Set or overwrite a single label
    pub fn replace_label(&mut self, key: &str, value: &str, policy: &HostPolicy) -> bool {
        let mut labels = self.labels.clone();
        labels.insert(policy.fix_key(key), policy.fix_value(value));
        self.set_labels(labels, policy)
    }

    /// Replace the inventory namespace `<prefix>__*` with `data`
    ///
    /// Keys from other namespaces are kept. The cache is cleared only when the
    /// namespace content changed.
    pub fn update_inventory<I, K, V>(
        &mut self,
        prefix: &str,
        data: I,
        policy: &HostPolicy,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if prefix.trim().is_empty() {
            return Err(Error::EmptyInventoryKey);
        }
        let marker = format!("{prefix}__");

        let previous: Attributes = self.inventory_namespace(prefix);
        let updated: Attributes = policy
            .normalize(data)
            .into_iter()
            .map(|(k, v)| (format!("{marker}{k}"), v))
            .collect();

        if previous == updated {
            return Ok(false);
        }

        self.inventory.retain(|k, _| !k.starts_with(&marker));
        self.inventory.extend(updated);
        self.add_log(format!("Inventory change for {prefix}"), policy);
        self.cache.invalidate();
        Ok(true)
    }

    /// All inventory entries in the `<prefix>__*` namespace
    pub fn inventory_namespace(&self, prefix: &str) -> Attributes {
        let marker = format!("{prefix}__");
        self.inventory
            .iter()
            .filter(|(k, _)| k.starts_with(&marker))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Import entry point: replace labels and record the import
    ///
    /// A label change counts as a full sync, otherwise the host is only
    /// marked as seen. Returns whether the labels changed.
    pub fn update_host<I, K, V>(&mut self, labels: I, policy: &HostPolicy) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let now = Utc::now();
        let changed = self.set_labels(labels, policy);
        if changed {
            self.set_import_sync(now);
        } else {
            self.set_import_seen(now);
        }
        changed
    }

    /// Record a full import of this host
    pub fn set_import_sync(&mut self, at: DateTime<Utc>) {
        self.available = true;
        self.last_import_sync = Some(at);
        self.last_import_seen = Some(at);
    }

    /// Record that the source still lists this host
    pub fn set_import_seen(&mut self, at: DateTime<Utc>) {
        self.available = true;
        self.last_import_seen = Some(at);
    }

    /// Record that the source no longer lists this host
    pub fn set_source_not_found(&mut self, policy: &HostPolicy) {
        if self.available {
            self.add_log("Not found on source anymore", policy);
        }
        self.available = false;
    }

    /// Whether the host should be fully re-imported
    ///
    /// True when it is unavailable, was never synced, or the last sync is
    /// older than `max_age_hours`.
    pub fn need_import_sync(&self, max_age_hours: i64, now: DateTime<Utc>) -> bool {
        if !self.available {
            return true;
        }
        match self.last_import_sync {
            None => true,
            Some(last) => (now - last).num_hours() >= max_age_hours,
        }
    }

    /// Claim this host for `account`
    ///
    /// Unowned hosts and hosts already owned by the same account are always
    /// claimed. A host owned by another account is only taken over by a
    /// master account. Returns whether the claim succeeded.
    pub fn claim_for(&mut self, account: &AccountRef, policy: &HostPolicy) -> bool {
        let foreign_owner = self
            .source_account
            .as_ref()
            .filter(|owner| owner.id != account.id)
            .map(|owner| owner.name.clone());

        if let Some(owner) = foreign_owner {
            if !account.is_master {
                tracing::debug!(
                    hostname = %self.hostname,
                    owner = %owner,
                    account = %account.name,
                    "Host owned by another account"
                );
                return false;
            }
            self.add_log(
                format!("Taken over by master {} from {owner}", account.name),
                policy,
            );
        }

        self.source_account = Some(account.clone());
        self.is_object = account.is_object;
        if self.inventory.get(SYNCER_ACCOUNT_KEY) != Some(&account.name) {
            self.inventory
                .insert(SYNCER_ACCOUNT_KEY.to_string(), account.name.clone());
            self.cache.invalidate();
        }
        true
    }

    /// Pin the host to a folder, or release the pin with `None`
    pub fn lock_to_folder(&mut self, folder: Option<&str>, policy: &HostPolicy) {
        let folder = folder.map(str::to_string);
        if folder == self.folder {
            return;
        }
        match &folder {
            Some(path) => self.add_log(format!("Locked to folder {path}"), policy),
            None => self.add_log("Folder lock removed", policy),
        }
        self.folder = folder;
    }

    /// Prepend a timestamped entry to the change log, trimming to `log_length`
    pub fn add_log(&mut self, entry: impl AsRef<str>, policy: &HostPolicy) {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        self.log.insert(0, format!("{stamp} {}", entry.as_ref()));
        self.log.truncate(policy.log_length);
    }

    /// Hosts are exported only while available and not marked as objects
    pub fn is_exportable(&self) -> bool {
        self.available && !self.is_object
    }

    /// Labels merged with inventory; inventory wins on key collisions
    pub fn merged_attributes(&self) -> BTreeMap<String, String> {
        let mut all = self.labels.clone();
        all.extend(self.inventory.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }
}
