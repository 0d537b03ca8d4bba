//! Write-time normalisation of hostnames, keys and values

use serde::{Deserialize, Serialize};

use crate::Attributes;

fn default_true() -> bool {
    true
}

fn default_log_length() -> usize {
    30
}

/// How host data is normalised before it is stored
///
/// # Example TOML
///
/// ```toml
/// lowercase_hostnames = true
/// lowercase_keys = true
/// replacers = [["/", "_"], [".", "_"]]
/// log_length = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPolicy {
    /// Lower-case hostnames on lookup and creation
    #[serde(default)]
    pub lowercase_hostnames: bool,

    /// Lower-case label and inventory keys
    #[serde(default = "default_true")]
    pub lowercase_keys: bool,

    /// Ordered `(needle, replacement)` pairs applied to keys
    #[serde(default)]
    pub replacers: Vec<(String, String)>,

    /// Maximum number of entries kept in a host's change log
    #[serde(default = "default_log_length")]
    pub log_length: usize,
}

impl Default for HostPolicy {
    fn default() -> Self {
        Self {
            lowercase_hostnames: false,
            lowercase_keys: default_true(),
            replacers: Vec::new(),
            log_length: default_log_length(),
        }
    }
}

impl HostPolicy {
    /// Normalise a label or inventory key
    ///
    /// Lower-cases (if configured), applies the replacers in order, trims
    /// surrounding whitespace and turns inner spaces into underscores.
    pub fn fix_key(&self, key: &str) -> String {
        let mut key = if self.lowercase_keys {
            key.to_lowercase()
        } else {
            key.to_string()
        };
        for (needle, replacement) in &self.replacers {
            if !needle.is_empty() {
                key = key.replace(needle.as_str(), replacement);
            }
        }
        key.trim().replace(' ', "_")
    }

    /// Normalise an attribute value
    pub fn fix_value(&self, value: &str) -> String {
        value.trim().to_string()
    }

    /// Normalise a hostname
    pub fn normalize_hostname(&self, hostname: &str) -> String {
        let hostname = hostname.trim();
        if self.lowercase_hostnames {
            hostname.to_lowercase()
        } else {
            hostname.to_string()
        }
    }

    /// Normalise a whole attribute bag
    ///
    /// Keys that collapse to the same normalised key keep the value that
    /// comes last in iteration order.
    pub fn normalize<I, K, V>(&self, entries: I) -> Attributes
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        entries
            .into_iter()
            .map(|(k, v)| (self.fix_key(k.as_ref()), self.fix_value(v.as_ref())))
            .collect()
    }
}
