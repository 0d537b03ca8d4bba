//! Materialised host attributes per export purpose

use std::collections::BTreeMap;

use cmdb_hosts::Host;

use crate::config::AttributeConfig;

/// Purpose used when building desired state and exporting labels
pub const EXPORT_PURPOSE: &str = "export";

/// Attributes of one host for one purpose
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttributes {
    /// Labels and inventory merged
    pub all: BTreeMap<String, String>,
    /// Labels eligible for export to the purpose
    pub filtered: BTreeMap<String, String>,
}

/// Supplies a host's attribute set, or `None` when the host is excluded
pub trait AttributeResolver {
    fn resolve(&self, host: &Host, purpose: &str) -> Option<ResolvedAttributes>;
}

/// Resolver driven by [`AttributeConfig`]
///
/// Excludes hosts that are not exportable or match an exclusion
/// condition; filters labels by the purpose's key prefixes.
#[derive(Debug, Clone, Default)]
pub struct StandardResolver {
    config: AttributeConfig,
}

impl StandardResolver {
    pub fn new(config: AttributeConfig) -> Self {
        Self { config }
    }
}

impl AttributeResolver for StandardResolver {
    fn resolve(&self, host: &Host, purpose: &str) -> Option<ResolvedAttributes> {
        if !host.is_exportable() {
            tracing::trace!(hostname = %host.hostname(), "Host not exportable");
            return None;
        }
        if self
            .config
            .exclude
            .iter()
            .any(|c| c.matches(host.hostname(), host.labels()))
        {
            tracing::debug!(hostname = %host.hostname(), purpose, "Host excluded by filter");
            return None;
        }

        let filtered = match self.config.label_prefixes.get(purpose) {
            Some(prefixes) => host
                .labels()
                .iter()
                .filter(|(k, _)| prefixes.iter().any(|p| k.starts_with(p.as_str())))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => host.labels().clone(),
        };

        Some(ResolvedAttributes {
            all: host.merged_attributes(),
            filtered,
        })
    }
}
