//! Per-host memoisation of derived values
//!
//! Values are stored as JSON so the cache persists with the host record.
//! The cache only ever shrinks through [`Host`](crate::Host) write paths or
//! an explicit [`HostCache::remove_prefix`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keyed store of memoised results derived from a host's labels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostCache {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl HostCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    ///
    /// A stored entry that no longer decodes as `V` counts as a miss and is
    /// overwritten. Errors from `compute` propagate and leave the cache as it
    /// was.
    pub fn get_or_compute<V, E, F>(&mut self, key: &str, compute: F) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get::<V>(key) {
            tracing::trace!(key, "Host cache hit");
            return Ok(value);
        }

        let value = compute()?;
        match serde_json::to_value(&value) {
            Ok(encoded) => {
                self.entries.insert(key.to_string(), encoded);
                self.dirty = true;
            }
            Err(e) => tracing::warn!(key, error = %e, "Computed value is not cacheable"),
        }
        Ok(value)
    }

    /// Decode the entry stored under `key`
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let raw = self.entries.get(key)?;
        match serde_json::from_value(raw.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "Ignoring undecodable cache entry");
                None
            }
        }
    }

    /// Raw JSON view of an entry
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose key starts with `prefix`
    ///
    /// Returns the number of removed entries.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Whether entries were added or removed since the last [`Self::mark_clean`]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reset the dirty flag, typically after the owning host was persisted
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Drop all entries. Only host write paths may invalidate.
    pub(crate) fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }
}
