//! Host records for the inventory synchronizer
//!
//! A host is identified by its hostname and carries two open attribute bags:
//!
//! - **labels**: key/value pairs written by import sources
//! - **inventory**: key/value pairs namespaced as `<source>__<key>`
//!
//! Both bags are normalised on every write according to a [`HostPolicy`].
//! Each host also owns a [`HostCache`] of memoised derived values which is
//! cleared by exactly the write paths that change labels or inventory.

pub mod cache;
pub mod error;
pub mod host;
pub mod policy;
pub mod store;

pub use cache::HostCache;
pub use error::{Error, Result};
pub use host::{AccountRef, Host};
pub use policy::HostPolicy;
pub use store::{HostStore, MemoryHostStore};

/// Ordered string attribute bag used for labels and inventory.
pub type Attributes = std::collections::BTreeMap<String, String>;
