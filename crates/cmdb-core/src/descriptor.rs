//! Target constructs: what is desired, what is cached and what lives remotely

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// How a target identifies and compares its constructs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    /// Display name plus stable id, e.g. host or contact groups
    Named,
    /// Id-addressed payloads compared structurally, e.g. tag groups
    Keyed,
    /// Payloads identified by their own content hash, e.g. generated rules
    ContentAddressed,
}

/// A configured external target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub kind: ConstructKind,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: ConstructKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// One construct in desired or cached state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstructDescriptor {
    Named { id: String, title: String },
    Payload { id: String, payload: Value },
}

impl ConstructDescriptor {
    pub fn named(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::Named {
            id: id.into(),
            title: title.into(),
        }
    }

    pub fn keyed(id: impl Into<String>, payload: Value) -> Self {
        Self::Payload {
            id: id.into(),
            payload,
        }
    }

    /// Payload whose id is derived from its canonical form
    pub fn content_addressed(payload: Value) -> Self {
        Self::Payload {
            id: content_id(&payload),
            payload,
        }
    }

    /// Stable id used to correlate desired, cached and live entries
    pub fn id(&self) -> &str {
        match self {
            Self::Named { id, .. } | Self::Payload { id, .. } => id.as_str(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Named { title, .. } => Some(title.as_str()),
            Self::Payload { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Named { .. } => None,
            Self::Payload { payload, .. } => Some(payload),
        }
    }

    /// Body sent when creating the construct
    pub fn create_payload(&self) -> Value {
        match self {
            Self::Named { id, title } => json!({ "name": id, "alias": title }),
            Self::Payload { payload, .. } => payload.clone(),
        }
    }

    /// Body sent when updating the construct
    pub fn update_payload(&self) -> Value {
        match self {
            Self::Named { title, .. } => json!({ "alias": title }),
            Self::Payload { payload, .. } => payload.clone(),
        }
    }
}

/// SHA-256 of the canonical JSON form
///
/// Object keys serialise in sorted order, so equal payloads always hash
/// equally regardless of how they were built.
pub fn content_id(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A record as returned by a gateway fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Identifier used by the remote system for updates and deletes
    pub remote_id: String,
    /// Display name, for named constructs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl RemoteRecord {
    pub fn named(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            remote_id: id.into(),
            title: Some(title.into()),
            payload: Value::Null,
        }
    }

    pub fn with_payload(id: impl Into<String>, payload: Value) -> Self {
        Self {
            remote_id: id.into(),
            title: None,
            payload,
        }
    }
}

/// A live construct, normalised for comparison against desired state
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntry {
    pub descriptor: ConstructDescriptor,
    /// Id to address the remote object with; differs from the descriptor
    /// id for content-addressed targets
    pub remote_id: String,
}

impl LiveEntry {
    /// Interpret a fetched record according to the target's kind
    pub fn from_record(kind: ConstructKind, record: RemoteRecord) -> Self {
        let descriptor = match kind {
            ConstructKind::Named => {
                let title = record.title.unwrap_or_else(|| record.remote_id.clone());
                ConstructDescriptor::named(record.remote_id.clone(), title)
            }
            ConstructKind::Keyed => {
                ConstructDescriptor::keyed(record.remote_id.clone(), record.payload)
            }
            ConstructKind::ContentAddressed => ConstructDescriptor::content_addressed(record.payload),
        };
        Self {
            descriptor,
            remote_id: record.remote_id,
        }
    }

    pub fn id(&self) -> &str {
        self.descriptor.id()
    }
}

impl From<ConstructDescriptor> for LiveEntry {
    fn from(descriptor: ConstructDescriptor) -> Self {
        let remote_id = descriptor.id().to_string();
        Self {
            descriptor,
            remote_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_id_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": [1, 2]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": [1, 2], "b": 1}"#).unwrap();
        assert_eq!(content_id(&a), content_id(&b));
        assert_ne!(content_id(&a), content_id(&json!({"a": [2, 1], "b": 1})));
        assert_eq!(content_id(&a).len(), 64);
    }

    #[test]
    fn test_named_payloads() {
        let d = ConstructDescriptor::named("linux", "Linux Servers");
        assert_eq!(d.create_payload(), json!({"name": "linux", "alias": "Linux Servers"}));
        assert_eq!(d.update_payload(), json!({"alias": "Linux Servers"}));
        assert_eq!(d.payload(), None);
    }

    #[test]
    fn test_live_entry_from_records() {
        let named = LiveEntry::from_record(ConstructKind::Named, RemoteRecord::named("g1", "Group"));
        assert_eq!(named.descriptor, ConstructDescriptor::named("g1", "Group"));

        let payload = json!({"folder": "/", "value_raw": "1"});
        let hashed = LiveEntry::from_record(
            ConstructKind::ContentAddressed,
            RemoteRecord::with_payload("remote-7", payload.clone()),
        );
        assert_eq!(hashed.remote_id, "remote-7");
        assert_eq!(hashed.id(), content_id(&payload));
    }

    #[test]
    fn test_descriptor_serialization_is_tagged() {
        let d = ConstructDescriptor::named("a", "A");
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!({"type": "named", "id": "a", "title": "A"})
        );
    }
}
