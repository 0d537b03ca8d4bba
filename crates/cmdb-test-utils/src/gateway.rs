//! [`MockGateway`]: an in-memory target system.
//!
//! Mutations are applied to per-target record lists so a second run sees
//! the effect of the first. Every call is recorded.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use cmdb_core::descriptor::content_id;
use cmdb_core::{ApiGateway, BatchOutcome, ConstructKind, GatewayError, RemoteRecord, Target};
use serde_json::Value;

/// A recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch { target: String },
    CreateBatch { target: String, keys: Vec<String> },
    UpdateBatch { target: String, remote_ids: Vec<String> },
    Delete { target: String, remote_id: String },
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Fetch { .. })
    }
}

#[derive(Debug, Default)]
struct MockState {
    records: BTreeMap<String, Vec<RemoteRecord>>,
    calls: Vec<Call>,
    fetch_failures: BTreeMap<String, GatewayError>,
    call_failures: BTreeMap<String, GatewayError>,
    item_failures: BTreeMap<(String, String), GatewayError>,
    next_id: usize,
}

/// In-memory [`ApiGateway`]
///
/// # Example
///
/// ```rust
/// use cmdb_core::{ApiGateway, ConstructKind, GatewayError, RemoteRecord, Target};
/// use cmdb_test_utils::MockGateway;
///
/// let target = Target::new("host_groups", ConstructKind::Named);
/// let gateway = MockGateway::new()
///     .with_records("host_groups", vec![RemoteRecord::named("linux", "Linux")]);
/// gateway.fail_item("host_groups", "linux", GatewayError::Rejected("in use".into()));
///
/// assert!(gateway.delete(&target, "linux").is_err());
/// assert_eq!(gateway.records("host_groups").len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed live records of a target
    pub fn with_records(self, target: &str, records: Vec<RemoteRecord>) -> Self {
        self.lock().records.insert(target.to_string(), records);
        self
    }

    /// Current live records of a target
    pub fn records(&self, target: &str) -> Vec<RemoteRecord> {
        self.lock().records.get(target).cloned().unwrap_or_default()
    }

    /// Remote ids of a target, sorted
    pub fn remote_ids(&self, target: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records(target)
            .into_iter()
            .map(|r| r.remote_id)
            .collect();
        ids.sort();
        ids
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make every fetch of `target` fail
    pub fn fail_fetch(&self, target: &str, error: GatewayError) {
        self.lock().fetch_failures.insert(target.to_string(), error);
    }

    /// Make every create, update and delete call on `target` fail as a whole
    pub fn fail_calls(&self, target: &str, error: GatewayError) {
        self.lock().call_failures.insert(target.to_string(), error);
    }

    /// Refuse one item
    ///
    /// `key` is the created name or id (the content id for payloads
    /// without one), or the remote id for updates and deletes.
    pub fn fail_item(&self, target: &str, key: &str, error: GatewayError) {
        self.lock()
            .item_failures
            .insert((target.to_string(), key.to_string()), error);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fetch_failures.clear();
        state.call_failures.clear();
        state.item_failures.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Key a created payload is known by
fn create_key(payload: &Value) -> String {
    payload
        .get("name")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| content_id(payload))
}

impl ApiGateway for MockGateway {
    fn fetch(&self, target: &Target) -> Result<Vec<RemoteRecord>, GatewayError> {
        let mut state = self.lock();
        state.calls.push(Call::Fetch {
            target: target.name.clone(),
        });
        if let Some(error) = state.fetch_failures.get(&target.name) {
            return Err(error.clone());
        }
        Ok(state.records.get(&target.name).cloned().unwrap_or_default())
    }

    fn create_batch(
        &self,
        target: &Target,
        payloads: &[Value],
    ) -> Result<BatchOutcome, GatewayError> {
        let mut state = self.lock();
        let keys: Vec<String> = payloads.iter().map(create_key).collect();
        state.calls.push(Call::CreateBatch {
            target: target.name.clone(),
            keys: keys.clone(),
        });
        if let Some(error) = state.call_failures.get(&target.name) {
            return Err(error.clone());
        }

        let mut outcome = BatchOutcome::ok();
        for (index, (payload, key)) in payloads.iter().zip(keys).enumerate() {
            if let Some(error) = state.item_failures.get(&(target.name.clone(), key.clone())) {
                outcome = outcome.with_failure(index, error.clone());
                continue;
            }
            let record = match target.kind {
                ConstructKind::Named => {
                    let alias = payload
                        .get("alias")
                        .and_then(Value::as_str)
                        .unwrap_or(&key)
                        .to_string();
                    RemoteRecord::named(key, alias)
                }
                ConstructKind::Keyed => RemoteRecord::with_payload(key, payload.clone()),
                ConstructKind::ContentAddressed => {
                    state.next_id += 1;
                    RemoteRecord::with_payload(format!("remote-{}", state.next_id), payload.clone())
                }
            };
            state
                .records
                .entry(target.name.clone())
                .or_default()
                .push(record);
        }
        Ok(outcome)
    }

    fn update_batch(
        &self,
        target: &Target,
        items: &[(String, Value)],
    ) -> Result<BatchOutcome, GatewayError> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateBatch {
            target: target.name.clone(),
            remote_ids: items.iter().map(|(id, _)| id.clone()).collect(),
        });
        if let Some(error) = state.call_failures.get(&target.name) {
            return Err(error.clone());
        }

        let mut outcome = BatchOutcome::ok();
        for (index, (remote_id, payload)) in items.iter().enumerate() {
            if let Some(error) = state
                .item_failures
                .get(&(target.name.clone(), remote_id.clone()))
            {
                outcome = outcome.with_failure(index, error.clone());
                continue;
            }
            let records = state.records.entry(target.name.clone()).or_default();
            let Some(record) = records.iter_mut().find(|r| &r.remote_id == remote_id) else {
                outcome = outcome.with_failure(
                    index,
                    GatewayError::Rejected(format!("no such object '{remote_id}'")),
                );
                continue;
            };
            match target.kind {
                ConstructKind::Named => {
                    record.title = payload
                        .get("alias")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                _ => record.payload = payload.clone(),
            }
        }
        Ok(outcome)
    }

    fn delete(&self, target: &Target, remote_id: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.calls.push(Call::Delete {
            target: target.name.clone(),
            remote_id: remote_id.to_string(),
        });
        if let Some(error) = state.call_failures.get(&target.name) {
            return Err(error.clone());
        }
        if let Some(error) = state
            .item_failures
            .get(&(target.name.clone(), remote_id.to_string()))
        {
            return Err(error.clone());
        }

        let records = state.records.entry(target.name.clone()).or_default();
        let before = records.len();
        records.retain(|r| r.remote_id != remote_id);
        if records.len() == before {
            return Err(GatewayError::Rejected(format!("no such object '{remote_id}'")));
        }
        Ok(())
    }
}
