//! Host persistence seam

use std::collections::BTreeMap;

use crate::error::Result;
use crate::host::Host;
use crate::policy::HostPolicy;

/// Storage of host records keyed by hostname
pub trait HostStore {
    /// All hosts, ordered by hostname
    fn all(&self) -> Result<Vec<Host>>;

    fn get(&self, hostname: &str) -> Result<Option<Host>>;

    /// Insert or replace a host
    fn save(&mut self, host: &Host) -> Result<()>;

    /// Hosts that may be exported to the target
    fn exportable(&self) -> Result<Vec<Host>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(Host::is_exportable)
            .collect())
    }
}

/// In-memory [`HostStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryHostStore {
    hosts: BTreeMap<String, Host>,
}

impl MemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a host by normalised hostname, or create an empty one
    pub fn get_or_new(&self, hostname: &str, policy: &HostPolicy) -> Host {
        let hostname = policy.normalize_hostname(hostname);
        self.hosts
            .get(&hostname)
            .cloned()
            .unwrap_or_else(|| Host::new(&hostname, policy))
    }

    pub fn remove(&mut self, hostname: &str) -> Option<Host> {
        self.hosts.remove(hostname)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl HostStore for MemoryHostStore {
    fn all(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.values().cloned().collect())
    }

    fn get(&self, hostname: &str) -> Result<Option<Host>> {
        Ok(self.hosts.get(hostname).cloned())
    }

    fn save(&mut self, host: &Host) -> Result<()> {
        self.hosts.insert(host.hostname().to_string(), host.clone());
        Ok(())
    }
}

impl FromIterator<Host> for MemoryHostStore {
    fn from_iter<T: IntoIterator<Item = Host>>(iter: T) -> Self {
        Self {
            hosts: iter
                .into_iter()
                .map(|h| (h.hostname().to_string(), h))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_get_or_new_normalizes() {
        let policy = HostPolicy {
            lowercase_hostnames: true,
            ..HostPolicy::default()
        };
        let mut store = MemoryHostStore::new();
        let mut host = store.get_or_new("WEB01", &policy);
        host.set_import_sync(Utc::now());
        store.save(&host).unwrap();

        let again = store.get_or_new("Web01", &policy);
        assert!(again.available);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_exportable_filters() {
        let policy = HostPolicy::default();
        let mut live = Host::new("a", &policy);
        live.set_import_sync(Utc::now());
        let gone = Host::new("b", &policy);
        let mut object = Host::new("c", &policy);
        object.set_import_sync(Utc::now());
        object.is_object = true;

        let store: MemoryHostStore = [live, gone, object].into_iter().collect();
        let names: Vec<String> = store
            .exportable()
            .unwrap()
            .iter()
            .map(|h| h.hostname().to_string())
            .collect();
        assert_eq!(names, vec!["a"]);
    }
}
