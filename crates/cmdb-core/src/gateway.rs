//! Contract every external target system exposes to reconciliation
//!
//! Retries, pagination and authentication live in the implementations; the
//! reconciliation engine calls each method once and classifies failures.

use serde_json::Value;

use crate::descriptor::{RemoteRecord, Target};

/// Failure reported by a gateway
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Network or timeout failure; the item may succeed on a later run
    #[error("Transient gateway failure: {0}")]
    Transient(String),

    /// The remote system refused this item, e.g. deleting a referenced construct
    #[error("Rejected by target: {0}")]
    Rejected(String),

    /// Authentication or similar failure; nothing else in the pass can succeed
    #[error("Fatal gateway failure: {0}")]
    Fatal(String),
}

impl GatewayError {
    /// Whether the current pass must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Per-item result of a batch call
///
/// A batch call that returns `Ok` may still have refused individual items;
/// they are listed by their index in the submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub failures: Vec<(usize, GatewayError)>,
}

impl BatchOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, index: usize, error: GatewayError) -> Self {
        self.failures.push((index, error));
        self
    }

    pub fn failure_for(&self, index: usize) -> Option<&GatewayError> {
        self.failures
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, e)| e)
    }
}

/// Client for one external system
pub trait ApiGateway {
    /// Current constructs of `target`
    fn fetch(&self, target: &Target) -> Result<Vec<RemoteRecord>, GatewayError>;

    /// Create all payloads in one request
    fn create_batch(&self, target: &Target, payloads: &[Value])
    -> Result<BatchOutcome, GatewayError>;

    /// Update `(remote_id, payload)` pairs in one request
    fn update_batch(
        &self,
        target: &Target,
        items: &[(String, Value)],
    ) -> Result<BatchOutcome, GatewayError>;

    /// Delete a single construct
    fn delete(&self, target: &Target, remote_id: &str) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fatal_is_fatal() {
        assert!(GatewayError::Fatal("auth".into()).is_fatal());
        assert!(!GatewayError::Transient("timeout".into()).is_fatal());
        assert!(!GatewayError::Rejected("in use".into()).is_fatal());
    }

    #[test]
    fn test_failure_lookup() {
        let outcome = BatchOutcome::ok().with_failure(2, GatewayError::Rejected("dup".into()));
        assert!(outcome.failure_for(0).is_none());
        assert_eq!(outcome.failure_for(2), Some(&GatewayError::Rejected("dup".into())));
    }
}
